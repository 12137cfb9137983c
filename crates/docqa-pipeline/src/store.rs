//! Persisted ranking tables, one CSV per modality and retriever.
//!
//! A table is rebuilt on first use in a run when it is missing or when
//! `force_reindex` is set; after that it is read as-is.
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use docqa_core::types::{Modality, TextRow, VisualRow};
use docqa_core::Result;

pub fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader.deserialize().collect::<std::result::Result<Vec<T>, _>>()?;
    Ok(rows)
}

pub fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug)]
pub struct RetrievalStore {
    visual_path: PathBuf,
    textual_path: PathBuf,
    force_reindex: bool,
    settled: HashSet<Modality>,
}

impl RetrievalStore {
    pub fn new(
        dir: &Path,
        visual_retriever: &str,
        text_retriever: &str,
        force_reindex: bool,
    ) -> Self {
        Self {
            visual_path: dir.join(format!("retrieval_{visual_retriever}.csv")),
            textual_path: dir.join(format!("retrieval_{text_retriever}.csv")),
            force_reindex,
            settled: HashSet::new(),
        }
    }

    pub fn path(&self, modality: Modality) -> &Path {
        match modality {
            Modality::Visual => &self.visual_path,
            Modality::Textual => &self.textual_path,
        }
    }

    /// Whether the next read of `modality` must rebuild its table first.
    pub fn needs_build(&self, modality: Modality) -> bool {
        !self.settled.contains(&modality) && (self.force_reindex || !self.path(modality).exists())
    }

    /// Record that `modality` was built (or a build was attempted) in this run.
    pub fn mark_settled(&mut self, modality: Modality) {
        self.settled.insert(modality);
    }

    pub fn write_visual(&self, rows: &[VisualRow]) -> Result<()> {
        write_table(&self.visual_path, rows)?;
        info!(
            "Wrote {} visual rows to {}",
            rows.len(),
            self.visual_path.display()
        );
        Ok(())
    }

    pub fn write_textual(&self, rows: &[TextRow]) -> Result<()> {
        write_table(&self.textual_path, rows)?;
        info!(
            "Wrote {} textual rows to {}",
            rows.len(),
            self.textual_path.display()
        );
        Ok(())
    }

    /// The `top_k` best-scoring pages for `q_id`, ties in table order.
    pub fn read_visual(&self, q_id: &str, top_k: usize) -> Result<Vec<VisualRow>> {
        if !self.visual_path.exists() {
            warn!("Visual table {} is missing", self.visual_path.display());
            return Ok(Vec::new());
        }
        let mut rows: Vec<VisualRow> = read_table::<VisualRow>(&self.visual_path)?
            .into_iter()
            .filter(|r| r.q_id == q_id)
            .collect();
        if rows.is_empty() {
            warn!("No visual rows for query {}", q_id);
        }
        rows.sort_by(|a, b| b.score.total_cmp(&a.score));
        rows.truncate(top_k);
        Ok(rows)
    }

    /// Rows for `q_id` with the smallest ranks, at most `top_k`.
    pub fn read_textual(&self, q_id: &str, top_k: usize) -> Result<Vec<TextRow>> {
        if !self.textual_path.exists() {
            warn!("Textual table {} is missing", self.textual_path.display());
            return Ok(Vec::new());
        }
        let mut rows: Vec<TextRow> = read_table::<TextRow>(&self.textual_path)?
            .into_iter()
            .filter(|r| r.q_id == q_id)
            .collect();
        if rows.is_empty() {
            warn!("No textual rows for query {}", q_id);
        }
        rows.sort_by_key(|r| r.rank);
        rows.truncate(top_k);
        Ok(rows)
    }
}
