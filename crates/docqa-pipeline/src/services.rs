//! Concrete collaborators wired from configuration.
use anyhow::Result;
use tracing::info;

use docqa_core::config::{PipelineConfig, TextRetriever};
use docqa_core::traits::{
    ChunkRanker, Generator, OcrEngine, PageRasterizer, TextExtractor, VisualEmbedder,
};
use docqa_embed::get_embedder;
use docqa_text::Bm25Ranker;
use docqa_vector::LanceChunkStore;

use crate::generate::build_generator;
use crate::pdf::{PdfToText, PopplerRasterizer, TesseractOcr};
use crate::remote::RemoteVisualEmbedder;

pub struct Services {
    pub extractor: Box<dyn TextExtractor>,
    pub rasterizer: Box<dyn PageRasterizer>,
    pub ocr: Box<dyn OcrEngine>,
    pub visual: Box<dyn VisualEmbedder>,
    pub ranker: Box<dyn ChunkRanker>,
    pub generator: Box<dyn Generator>,
}

impl Services {
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let generator = build_generator(config)?;
        let visual = RemoteVisualEmbedder::new(
            &config.visual_endpoint,
            config.vision_retriever.model_name(),
            config.request_timeout_secs,
        )?;
        let ranker = build_ranker(config)?;
        info!(
            "Generator {} ({}), vision retriever {}, text retriever {}",
            config.generator,
            generator.name(),
            config.vision_retriever,
            config.text_retriever
        );
        Ok(Self {
            extractor: Box::new(PdfToText),
            rasterizer: Box::new(PopplerRasterizer::default()),
            ocr: Box::new(TesseractOcr::default()),
            visual: Box::new(visual),
            ranker,
            generator,
        })
    }
}

/// BM25 in memory, or a LanceDB table at `{retrieval_dir}/lancedb_{retriever}`
/// for dense retrievers.
pub fn build_ranker(config: &PipelineConfig) -> Result<Box<dyn ChunkRanker>> {
    let retriever = config.text_retriever;
    if retriever == TextRetriever::Bm25 {
        return Ok(Box::new(Bm25Ranker::new()?));
    }
    let embedder = get_embedder(retriever, &config.models_dir)?;
    let db_path = config.retrieval_dir().join(format!("lancedb_{retriever}"));
    let table = format!("chunks_{}", retriever.as_str().replace('-', "_"));
    Ok(Box::new(LanceChunkStore::new(&db_path, &table, embedder)?))
}
