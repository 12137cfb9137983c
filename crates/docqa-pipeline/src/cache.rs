//! Document cache: per-page text for every document the dataset references.
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use docqa_core::align::DocumentPages;
use docqa_core::dataset::Dataset;
use docqa_core::traits::{OcrEngine, PageRasterizer, TextExtractor};

/// Locate the PDF backing `doc_id` under `docs_dir`. Candidates, in order: the
/// id itself, `{id}.pdf`, the id right-padded with `0` to ten characters, and
/// the id up to its first underscore.
pub fn resolve_pdf(docs_dir: &Path, doc_id: &str) -> Option<PathBuf> {
    let mut candidates = vec![doc_id.to_string(), format!("{doc_id}.pdf")];
    if doc_id.chars().count() < 10 {
        let padding = "0".repeat(10 - doc_id.chars().count());
        candidates.push(format!("{doc_id}{padding}.pdf"));
    }
    if let Some((prefix, _)) = doc_id.split_once('_') {
        candidates.push(format!("{prefix}.pdf"));
    }
    candidates
        .into_iter()
        .map(|name| docs_dir.join(name))
        .find(|p| p.is_file())
}

pub struct DocumentCacheBuilder<'a> {
    extractor: &'a dyn TextExtractor,
    rasterizer: &'a dyn PageRasterizer,
    ocr: &'a dyn OcrEngine,
}

impl<'a> DocumentCacheBuilder<'a> {
    pub fn new(
        extractor: &'a dyn TextExtractor,
        rasterizer: &'a dyn PageRasterizer,
        ocr: &'a dyn OcrEngine,
    ) -> Self {
        Self {
            extractor,
            rasterizer,
            ocr,
        }
    }

    pub fn build(&self, dataset: &Dataset, docs_dir: &Path) -> DocumentPages {
        let mut cache = DocumentPages::new();
        for doc_id in dataset.referenced_documents() {
            let Some(pdf) = resolve_pdf(docs_dir, &doc_id) else {
                warn!(
                    "No PDF found for document {} under {}",
                    doc_id,
                    docs_dir.display()
                );
                continue;
            };
            match self.extract(&pdf) {
                Ok(pages) => {
                    debug!("Cached {} pages for {}", pages.len(), doc_id);
                    cache.insert(doc_id, pages);
                }
                Err(e) => warn!("Skipping document {}: {:#}", doc_id, e),
            }
        }
        info!("Document cache holds {} documents", cache.len());
        cache
    }

    /// Text layer first; any blank page (or a failed extraction) sends the whole
    /// document through OCR instead.
    pub fn extract(&self, pdf: &Path) -> anyhow::Result<Vec<String>> {
        match self.extractor.extract_pages(pdf) {
            Ok(pages) if !pages.is_empty() && pages.iter().all(|p| !p.trim().is_empty()) => {
                return Ok(pages)
            }
            Ok(_) => info!("Blank text layer in {}, falling back to OCR", pdf.display()),
            Err(e) => warn!(
                "Text extraction failed for {}: {:#}; falling back to OCR",
                pdf.display(),
                e
            ),
        }
        self.ocr_document(pdf)
    }

    fn ocr_document(&self, pdf: &Path) -> anyhow::Result<Vec<String>> {
        let count = self.rasterizer.page_count(pdf)?;
        let mut pages = Vec::with_capacity(count);
        for index in 0..count {
            let image = self.rasterizer.render_page(pdf, index)?;
            let text = self.ocr.recognize(&image)?;
            pages.push(format!("--- Page {} ---\n{}\n", index + 1, text));
        }
        Ok(pages)
    }
}
