//! Textual index: one global chunk ranking model queried once per question.
use tracing::{error, info};

use docqa_core::dataset::Dataset;
use docqa_core::traits::ChunkRanker;
use docqa_core::types::{AlignedChunk, TextRow};

pub struct TextualIndexBuilder<'a> {
    ranker: &'a mut dyn ChunkRanker,
    top_k: usize,
}

impl<'a> TextualIndexBuilder<'a> {
    pub fn new(ranker: &'a mut dyn ChunkRanker, top_k: usize) -> Self {
        Self { ranker, top_k }
    }

    /// Fit the ranker on `chunks`, then keep the best `2 × top_k` chunks per query.
    pub fn build(
        self,
        dataset: &Dataset,
        chunks: &[AlignedChunk],
    ) -> anyhow::Result<Vec<TextRow>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        self.ranker.fit(&texts)?;
        info!("Fitted {} ranker on {} chunks", self.ranker.name(), texts.len());

        let per_query = self.top_k * 2;
        let mut rows = Vec::new();
        for q_id in dataset.unique_ids() {
            let Some(query) = dataset.get(&q_id) else { continue };
            let hits = match self.ranker.rank(&query.question, per_query) {
                Ok(h) => h,
                Err(e) => {
                    error!("Ranking failed for query {}: {:#}", q_id, e);
                    continue;
                }
            };
            for (rank, (idx, score)) in hits.into_iter().enumerate() {
                let Some(chunk) = chunks.get(idx) else { continue };
                rows.push(TextRow {
                    q_id: q_id.clone(),
                    question: query.question.clone(),
                    chunk: chunk.text.clone(),
                    chunk_pdf_name: chunk.doc_id.clone(),
                    pdf_page_number: chunk.page,
                    rank: rank + 1,
                    score,
                });
            }
        }
        Ok(rows)
    }
}
