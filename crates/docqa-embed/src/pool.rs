use anyhow::{ensure, Result};
use candle_core::{DType, Tensor};

/// Sentence vector taken from a token-level encoder output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pooling {
    /// Mean over unmasked tokens (sentence-transformers MiniLM).
    Mean,
    /// First (`[CLS]` / `<s>`) token (BGE family).
    Cls,
}

/// Pool `hidden` `[B,T,H]` with `pooling`, then L2-normalise each row.
pub fn pool_l2(hidden: &Tensor, attention_mask: &Tensor, pooling: Pooling) -> Result<Tensor> {
    match pooling {
        Pooling::Mean => masked_mean_l2(hidden, attention_mask),
        Pooling::Cls => cls_l2(hidden),
    }
}

/// Mean over the unmasked tokens of `hidden` `[B,T,H]`, then L2-normalised per row.
/// `attention_mask` is `[B,T]` in any numeric dtype.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (batch, _tokens, hidden_dim) = hidden.dims3()?;
    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    ensure!(
        mask.dims() == &hidden.dims()[..2],
        "mask shape {:?} does not match hidden {:?}",
        mask.dims(),
        hidden.dims()
    );

    let summed = hidden.broadcast_mul(&mask.unsqueeze(2)?)?.sum(1)?;
    // A fully masked row would divide by zero; clamp the token count at one.
    let counts = mask.sum_keepdim(1)?.clamp(1f64, f64::MAX)?;
    let mean = summed.broadcast_div(&counts)?;

    let out = l2_rows(&mean)?;
    ensure!(out.dims() == [batch, hidden_dim], "pooled shape {:?}", out.dims());
    Ok(out)
}

/// First token of every row of `hidden` `[B,T,H]`, L2-normalised.
pub fn cls_l2(hidden: &Tensor) -> Result<Tensor> {
    let (batch, tokens, hidden_dim) = hidden.dims3()?;
    ensure!(tokens > 0, "cannot pool an empty sequence");
    let first = hidden.narrow(1, 0, 1)?.squeeze(1)?;
    let out = l2_rows(&first)?;
    ensure!(out.dims() == [batch, hidden_dim], "pooled shape {:?}", out.dims());
    Ok(out)
}

fn l2_rows(rows: &Tensor) -> Result<Tensor> {
    let eps = match rows.dtype() {
        DType::F16 | DType::BF16 => 1e-6,
        _ => 1e-12,
    };
    let norm = (rows.sqr()?.sum_keepdim(1)?.sqrt()? + eps)?;
    Ok(rows.broadcast_div(&norm)?)
}
