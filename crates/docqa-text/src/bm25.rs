//! docqa-text
//!
//! BM25 chunk ranking on an in-memory tantivy index. Every chunk gets a score
//! (zero when no query token occurs in it), and ties keep chunk order.
use anyhow::{Context, Result};
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Term, Value};
use tantivy::{doc, Index, IndexReader, TantivyDocument};
use tracing::debug;

use docqa_core::traits::ChunkRanker;

use crate::tantivy_utils::{build_schema, register_tokenizer, whitespace_tokens};

pub struct Bm25Ranker {
    index: Index,
    chunk_field: Field,
    text_field: Field,
    reader: Option<IndexReader>,
    num_chunks: usize,
}

impl Bm25Ranker {
    pub fn new() -> Result<Self> {
        let schema = build_schema();
        let index = Index::create_in_ram(schema.clone());
        register_tokenizer(&index);
        let chunk_field = schema.get_field("chunk")?;
        let text_field = schema.get_field("text")?;
        Ok(Self {
            index,
            chunk_field,
            text_field,
            reader: None,
            num_chunks: 0,
        })
    }

    /// Raw score of every chunk for `query`, indexed by chunk position.
    pub fn scores(&self, query: &str) -> Result<Vec<f32>> {
        let mut scores = vec![0.0f32; self.num_chunks];
        let Some(reader) = &self.reader else { return Ok(scores) };
        // Repeated query tokens count once per occurrence.
        let clauses: Vec<(Occur, Box<dyn Query>)> = whitespace_tokens(query)
            .into_iter()
            .map(|tok| {
                let term = Term::from_field_text(self.text_field, tok);
                let query: Box<dyn Query> =
                    Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                (Occur::Should, query)
            })
            .collect();
        if clauses.is_empty() || self.num_chunks == 0 {
            return Ok(scores);
        }
        let searcher = reader.searcher();
        let hits = searcher.search(
            &BooleanQuery::new(clauses),
            &TopDocs::with_limit(self.num_chunks),
        )?;
        for (score, addr) in hits {
            let doc: TantivyDocument = searcher.doc(addr)?;
            let idx = doc
                .get_first(self.chunk_field)
                .and_then(|v| v.as_u64())
                .context("chunk position missing from stored document")? as usize;
            if let Some(slot) = scores.get_mut(idx) {
                *slot = score;
            }
        }
        Ok(scores)
    }
}

impl ChunkRanker for Bm25Ranker {
    fn name(&self) -> &str {
        "bm25"
    }

    fn fit(&mut self, chunks: &[String]) -> Result<()> {
        let mut index_writer = self.index.writer_with_num_threads(1, 50_000_000)?;
        index_writer.delete_all_documents()?;
        for (i, chunk) in chunks.iter().enumerate() {
            index_writer.add_document(doc!(
                self.chunk_field => i as u64,
                self.text_field => chunk.as_str()
            ))?;
        }
        index_writer.commit()?;
        self.reader = Some(self.index.reader()?);
        self.num_chunks = chunks.len();
        debug!("BM25 index holds {} chunks", chunks.len());
        Ok(())
    }

    fn rank(&self, query: &str, k: usize) -> Result<Vec<(usize, f32)>> {
        let scores = self.scores(query)?;
        let mut order: Vec<usize> = (0..scores.len()).collect();
        // Stable sort keeps chunk order among equal scores.
        order.sort_by(|a, b| scores[*b].total_cmp(&scores[*a]));
        Ok(order.into_iter().take(k).map(|i| (i, scores[i])).collect())
    }
}
