//! Dense text encoders and multi-vector scoring.
pub mod device;
pub mod fake;
pub mod maxsim;
pub mod model;
pub mod pool;
pub mod tokenize;

use anyhow::{bail, Result};
use std::path::Path;
use tracing::info;

use docqa_core::config::TextRetriever;
use docqa_core::traits::Embedder;

pub use fake::FakeEmbedder;
pub use maxsim::{max_sim, max_sim_all};
pub use model::{Architecture, EmbeddingModel};
pub use pool::{cls_l2, masked_mean_l2, pool_l2, Pooling};

pub const FAKE_DIM: usize = 1024;

pub fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Encoder family and pooling used by each dense retriever.
/// BGE checkpoints are trained on the `[CLS]` vector; MiniLM on the token mean.
pub fn encoder_layout(retriever: TextRetriever) -> Result<(Architecture, Pooling)> {
    Ok(match retriever {
        TextRetriever::Bm25 => bail!("{} is a sparse retriever and has no encoder", retriever),
        TextRetriever::MiniLm => (Architecture::Bert, Pooling::Mean),
        TextRetriever::Bge => (Architecture::Bert, Pooling::Cls),
        TextRetriever::BgeM3 => (Architecture::XlmRoberta, Pooling::Cls),
    })
}

/// Encoder for a dense text retriever, loaded from `{models_dir}/{retriever}`.
/// `APP_USE_FAKE_EMBEDDINGS=1` swaps in [`FakeEmbedder`].
pub fn get_embedder(retriever: TextRetriever, models_dir: &Path) -> Result<Box<dyn Embedder>> {
    let (arch, pooling) = encoder_layout(retriever)?;
    if use_fake_embeddings() {
        info!("Using FakeEmbedder for {}", retriever);
        return Ok(Box::new(FakeEmbedder::new(FAKE_DIM)));
    }
    let model_dir = models_dir.join(retriever.as_str());
    Ok(Box::new(EmbeddingModel::load(&model_dir, arch, pooling)?))
}
