//! Visual index: late-interaction ranking of rendered pages per query.
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, error, info, warn};

use docqa_core::dataset::Dataset;
use docqa_core::traits::{PageRasterizer, VisualEmbedder};
use docqa_core::types::{page_id, MultiVector, VisualRow};

use crate::cache::resolve_pdf;

struct EmbeddedPage {
    page_id: String,
    doc_id: String,
    embedding: MultiVector,
}

pub struct VisualIndexBuilder<'a> {
    rasterizer: &'a dyn PageRasterizer,
    embedder: &'a dyn VisualEmbedder,
}

impl<'a> VisualIndexBuilder<'a> {
    pub fn new(rasterizer: &'a dyn PageRasterizer, embedder: &'a dyn VisualEmbedder) -> Self {
        Self {
            rasterizer,
            embedder,
        }
    }

    pub fn build(&self, dataset: &Dataset, docs_dir: &Path) -> anyhow::Result<Vec<VisualRow>> {
        let pages = self.embed_pages(dataset, docs_dir)?;
        info!("Embedded {} pages for the visual index", pages.len());

        let mut rows = Vec::new();
        for q_id in dataset.unique_ids() {
            let Some(query) = dataset.get(&q_id) else { continue };
            let question = std::slice::from_ref(&query.question);
            let embedding = match self.embedder.embed_queries(question) {
                Ok(mut v) if !v.is_empty() => v.swap_remove(0),
                Ok(_) => {
                    warn!("Empty query embedding for {}", q_id);
                    continue;
                }
                Err(e) => {
                    error!("Query embedding failed for {}: {:#}", q_id, e);
                    continue;
                }
            };
            let relevant: HashSet<&str> = query.documents.iter().map(String::as_str).collect();
            let candidates: Vec<&EmbeddedPage> = pages
                .iter()
                .filter(|p| relevant.is_empty() || relevant.contains(p.doc_id.as_str()))
                .collect();
            if candidates.is_empty() {
                warn!("No candidate pages for query {}", q_id);
                continue;
            }

            let vectors: Vec<&MultiVector> = candidates.iter().map(|p| &p.embedding).collect();
            let scores = match self.embedder.score(&embedding, &vectors) {
                Ok(s) => s,
                Err(e) => {
                    error!("Scoring failed for query {}: {:#}", q_id, e);
                    continue;
                }
            };
            let mut ranked: Vec<(&EmbeddedPage, f32)> =
                candidates.into_iter().zip(scores).collect();
            ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
            debug!("Ranked {} pages for query {}", ranked.len(), q_id);
            rows.extend(ranked.into_iter().map(|(page, score)| VisualRow {
                q_id: q_id.clone(),
                document_id: page.page_id.clone(),
                score,
                question: query.question.clone(),
            }));
        }
        Ok(rows)
    }

    fn embed_pages(
        &self,
        dataset: &Dataset,
        docs_dir: &Path,
    ) -> anyhow::Result<Vec<EmbeddedPage>> {
        let documents = dataset.referenced_documents();
        let pb = ProgressBar::new(documents.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents ({percent}%) {msg}",
                )?
                .progress_chars("#>-"),
        );
        let mut pages = Vec::new();
        for doc_id in documents {
            pb.set_message(doc_id.clone());
            pb.inc(1);
            let Some(pdf) = resolve_pdf(docs_dir, &doc_id) else {
                warn!("PDF not found for document {}", doc_id);
                continue;
            };
            let count = match self.rasterizer.page_count(&pdf) {
                Ok(n) => n,
                Err(e) => {
                    error!("Cannot rasterize {}: {:#}", pdf.display(), e);
                    continue;
                }
            };
            for index in 0..count {
                let embedded = self
                    .rasterizer
                    .render_page(&pdf, index)
                    .and_then(|image| self.embedder.embed_images(std::slice::from_ref(&image)));
                match embedded {
                    Ok(mut v) if !v.is_empty() => pages.push(EmbeddedPage {
                        page_id: page_id(&doc_id, index),
                        doc_id: doc_id.clone(),
                        embedding: v.swap_remove(0),
                    }),
                    Ok(_) => warn!("Empty embedding for page {} of {}", index, doc_id),
                    Err(e) => error!("Skipping page {} of {}: {:#}", index, doc_id, e),
                }
            }
        }
        pb.finish_and_clear();
        Ok(pages)
    }
}
