//! Late-interaction (MaxSim) scoring: for every query vector take the best dot
//! product over the candidate's vectors, then sum.
use anyhow::{ensure, Result};
use candle_core::{Device, Tensor};

use docqa_core::types::MultiVector;

fn to_matrix(vectors: &MultiVector, device: &Device) -> Result<Tensor> {
    let rows = vectors.len();
    let dim = vectors.first().map_or(0, Vec::len);
    ensure!(rows > 0 && dim > 0, "empty multi-vector");
    ensure!(vectors.iter().all(|v| v.len() == dim), "ragged multi-vector");
    Ok(Tensor::from_iter(vectors.iter().flatten().copied(), device)?.reshape((rows, dim))?)
}

pub fn max_sim(query: &MultiVector, candidate: &MultiVector) -> Result<f32> {
    let device = Device::Cpu;
    let q = to_matrix(query, &device)?;
    let d = to_matrix(candidate, &device)?;
    ensure!(
        q.dim(1)? == d.dim(1)?,
        "dimension mismatch: query {} vs candidate {}",
        q.dim(1)?,
        d.dim(1)?
    );
    let sims = q.matmul(&d.t()?)?;
    Ok(sims.max(1)?.sum_all()?.to_scalar::<f32>()?)
}

/// Score `query` against each candidate, in order.
pub fn max_sim_all(query: &MultiVector, candidates: &[&MultiVector]) -> Result<Vec<f32>> {
    candidates.iter().map(|c| max_sim(query, c)).collect()
}
