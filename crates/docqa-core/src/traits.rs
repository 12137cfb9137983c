//! Capability seams for the external collaborators. Each has one concrete
//! implementation elsewhere in the workspace and is injected at construction.

use std::path::Path;

use crate::types::{MultiVector, PageImage};

/// Per-page text extraction from a PDF. Empty strings mark pages without a text layer.
pub trait TextExtractor: Send + Sync {
    fn extract_pages(&self, pdf: &Path) -> anyhow::Result<Vec<String>>;
}

/// Optical character recognition over a rendered page.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, page: &PageImage) -> anyhow::Result<String>;
}

/// PDF page rasterization.
pub trait PageRasterizer: Send + Sync {
    fn page_count(&self, pdf: &Path) -> anyhow::Result<usize>;
    fn render_page(&self, pdf: &Path, page_index: usize) -> anyhow::Result<PageImage>;
}

/// Dense single-vector text embedding.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Late-interaction embedding of page images and questions.
pub trait VisualEmbedder: Send + Sync {
    fn embed_images(&self, images: &[PageImage]) -> anyhow::Result<Vec<MultiVector>>;
    fn embed_queries(&self, queries: &[String]) -> anyhow::Result<Vec<MultiVector>>;
    /// One score per candidate, higher is better.
    fn score(&self, query: &MultiVector, candidates: &[&MultiVector]) -> anyhow::Result<Vec<f32>>;
}

/// A global ranking model over a chunk corpus.
pub trait ChunkRanker {
    /// Identity used in logs and storage keys.
    fn name(&self) -> &str;
    fn fit(&mut self, chunks: &[String]) -> anyhow::Result<()>;
    /// Best-first `(chunk index, score)` pairs, at most `k`.
    fn rank(&self, query: &str, k: usize) -> anyhow::Result<Vec<(usize, f32)>>;
}

/// Sampling knobs passed through to the generation backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Sampling {
    pub const ANSWER: Sampling = Sampling {
        max_tokens: 3000,
        temperature: 0.7,
    };
    pub const FUSION: Sampling = Sampling {
        max_tokens: 1500,
        temperature: 0.3,
    };
}

/// A (multimodal) language model.
pub trait Generator {
    fn name(&self) -> &str;
    fn generate(
        &self,
        prompt: &str,
        images: &[PageImage],
        sampling: Sampling,
    ) -> anyhow::Result<String>;
    /// Hook to give back accelerator or buffer memory between calls.
    fn release_memory(&self) {}
}
