use candle_core::{DType, Device, Tensor};
use docqa_core::config::TextRetriever;
use docqa_embed::{encoder_layout, masked_mean_l2, pool_l2, Architecture, Pooling};

#[test]
fn padded_tokens_do_not_contribute() {
    let dev = Device::Cpu;
    // Row 0 keeps only token 0, row 1 averages both tokens.
    let h = Tensor::from_slice(
        &[3.0f32, 4.0, 100.0, 100.0, 1.0, 0.0, 3.0, 0.0],
        (2, 2, 2),
        &dev,
    )
    .unwrap();
    let mask = Tensor::from_slice(&[1u32, 0, 1, 1], (2, 2), &dev).unwrap();
    let out: Vec<Vec<f32>> = masked_mean_l2(&h, &mask).unwrap().to_vec2().unwrap();
    let expected = [[0.6f32, 0.8], [1.0, 0.0]];
    for (row, want) in out.iter().zip(expected) {
        for (a, b) in row.iter().zip(want) {
            assert!((a - b).abs() < 1e-5, "a={a} b={b}");
        }
    }
}

#[test]
fn fully_masked_row_is_zero_not_nan() {
    let dev = Device::Cpu;
    let h = Tensor::ones((1, 3, 4), DType::F32, &dev).unwrap();
    let mask = Tensor::zeros((1, 3), DType::F32, &dev).unwrap();
    let out: Vec<Vec<f32>> = masked_mean_l2(&h, &mask).unwrap().to_vec2().unwrap();
    assert!(out[0].iter().all(|x| *x == 0.0));
}

#[test]
fn mismatched_mask_is_an_error() {
    let dev = Device::Cpu;
    let h = Tensor::ones((1, 3, 4), DType::F32, &dev).unwrap();
    let mask = Tensor::ones((1, 2), DType::F32, &dev).unwrap();
    assert!(masked_mean_l2(&h, &mask).is_err());
}

#[test]
fn cls_pooling_keeps_only_the_first_token() {
    let dev = Device::Cpu;
    // Later tokens and the mask must not move the vector.
    let h = Tensor::from_slice(
        &[0.0f32, 2.0, 9.0, 9.0, 5.0, 0.0, -7.0, 1.0],
        (2, 2, 2),
        &dev,
    )
    .unwrap();
    let mask = Tensor::from_slice(&[1u32, 1, 1, 0], (2, 2), &dev).unwrap();
    let out: Vec<Vec<f32>> = pool_l2(&h, &mask, Pooling::Cls)
        .unwrap()
        .to_vec2()
        .unwrap();
    assert_eq!(out, vec![vec![0.0, 1.0], vec![1.0, 0.0]]);

    let mean: Vec<Vec<f32>> = pool_l2(&h, &mask, Pooling::Mean)
        .unwrap()
        .to_vec2()
        .unwrap();
    assert_ne!(mean[0], out[0]);
}

#[test]
fn bge_family_pools_on_cls_and_minilm_on_the_mean() {
    assert_eq!(
        encoder_layout(TextRetriever::MiniLm).unwrap(),
        (Architecture::Bert, Pooling::Mean)
    );
    assert_eq!(
        encoder_layout(TextRetriever::Bge).unwrap(),
        (Architecture::Bert, Pooling::Cls)
    );
    assert_eq!(
        encoder_layout(TextRetriever::BgeM3).unwrap(),
        (Architecture::XlmRoberta, Pooling::Cls)
    );
    assert!(encoder_layout(TextRetriever::Bm25).is_err());
}
