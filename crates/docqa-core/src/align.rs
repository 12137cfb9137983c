//! Chunk-to-page alignment.
//!
//! Every chunk is compared against every page of every cached document, so
//! the cost is O(chunks × total pages × page length). This is fine for the
//! per-dataset corpora the pipeline targets and is the known scaling limit.
use std::collections::BTreeMap;
use tracing::debug;

use crate::chunker::RecursiveSplitter;
use crate::similarity::{length_bound, Matcher};
use crate::types::AlignedChunk;

/// Document id → ordered page texts.
pub type DocumentPages = BTreeMap<String, Vec<String>>;

struct IndexedPage<'a> {
    doc_id: &'a str,
    page: usize,
    matcher: Matcher,
}

pub struct ChunkAligner<'a> {
    pages: Vec<IndexedPage<'a>>,
}

impl<'a> ChunkAligner<'a> {
    pub fn new(documents: &'a DocumentPages) -> Self {
        let pages = documents
            .iter()
            .flat_map(|(doc_id, pages)| {
                pages.iter().enumerate().map(move |(page, text)| IndexedPage {
                    doc_id,
                    page,
                    matcher: Matcher::new(text),
                })
            })
            .collect();
        Self { pages }
    }

    /// The most similar `(doc, page)` for `chunk`; the first maximum wins.
    /// `None` when no page shares a single character with the chunk.
    pub fn best_page(&self, chunk: &str) -> Option<(&'a str, usize)> {
        let chars: Vec<char> = chunk.chars().collect();
        let mut best_ratio = 0.0f64;
        let mut best = None;
        for page in &self.pages {
            // Bounds can only prune pages that cannot strictly beat the best.
            if length_bound(chars.len(), page.matcher.len()) <= best_ratio {
                continue;
            }
            if page.matcher.quick_ratio(&chars) <= best_ratio {
                continue;
            }
            let ratio = page.matcher.ratio(&chars);
            if ratio > best_ratio {
                best_ratio = ratio;
                best = Some((page.doc_id, page.page));
            }
        }
        best
    }
}

/// Split each document's newline-joined pages and attach the best-matching
/// source page to every chunk, falling back to `(source doc, 0)`.
pub fn align_chunks(documents: &DocumentPages, splitter: &RecursiveSplitter) -> Vec<AlignedChunk> {
    let aligner = ChunkAligner::new(documents);
    let mut out = Vec::new();
    for (doc_id, pages) in documents {
        let chunks = splitter.split(&pages.join("\n"));
        debug!("Document {} split into {} chunks", doc_id, chunks.len());
        for text in chunks {
            let (doc, page) = aligner
                .best_page(&text)
                .map_or_else(|| (doc_id.clone(), 0), |(d, p)| (d.to_string(), p));
            out.push(AlignedChunk {
                text,
                doc_id: doc,
                page,
            });
        }
    }
    out
}
