//! Dense chunk ranking backed by a local LanceDB table.
//!
//! `fit` recreates the database directory, embeds every chunk and writes them
//! in batches; `rank` runs an exhaustive cosine nearest-neighbour query and
//! reports `1 - distance` as the score. LanceDB is async-only, so the store
//! drives it from its own tokio runtime.
use anyhow::{anyhow, Context, Result};
use arrow_array::types::Float32Type;
use arrow_array::{
    FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator,
};
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{debug, info};

use docqa_core::traits::{ChunkRanker, Embedder};

use crate::schema::{build_chunk_schema, CHUNK_COLUMN, DISTANCE_COLUMN};

const EMBED_BATCH: usize = 64;
const WRITE_BATCH: usize = 1000;

pub struct LanceChunkStore {
    runtime: Runtime,
    db_path: PathBuf,
    table_name: String,
    embedder: Box<dyn Embedder>,
    db: Option<Connection>,
}

impl LanceChunkStore {
    pub fn new(db_path: &Path, table_name: &str, embedder: Box<dyn Embedder>) -> Result<Self> {
        Ok(Self {
            runtime: Runtime::new()?,
            db_path: db_path.to_path_buf(),
            table_name: table_name.to_string(),
            embedder,
            db: None,
        })
    }

    fn to_record_batch(&self, start: usize, vectors: Vec<Vec<f32>>) -> Result<RecordBatch> {
        let dim = i32::try_from(self.embedder.dim())?;
        let positions: Vec<i32> = (start..start + vectors.len())
            .map(i32::try_from)
            .collect::<Result<_, _>>()?;
        let values = vectors
            .into_iter()
            .map(|v| Some(v.into_iter().map(Some).collect::<Vec<_>>()));
        Ok(RecordBatch::try_new(
            build_chunk_schema(dim),
            vec![
                Arc::new(Int32Array::from(positions)),
                Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
                    values, dim,
                )),
            ],
        )?)
    }

    async fn write_batches(&self, db: &Connection, batches: Vec<RecordBatch>) -> Result<()> {
        for (i, batch) in batches.into_iter().enumerate() {
            let schema = batch.schema();
            let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
            if i == 0 {
                db.create_table(&self.table_name, reader).execute().await?;
            } else {
                db.open_table(&self.table_name)
                    .execute()
                    .await?
                    .add(reader)
                    .execute()
                    .await?;
            }
        }
        Ok(())
    }

    async fn nearest(
        &self,
        db: &Connection,
        vector: Vec<f32>,
        k: usize,
    ) -> Result<Vec<(usize, f32)>> {
        let table = db.open_table(&self.table_name).execute().await?;
        let mut stream = table
            .vector_search(vector)?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await?;
        let mut hits = Vec::new();
        while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await? {
            let chunks = batch
                .column_by_name(CHUNK_COLUMN)
                .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
                .ok_or_else(|| anyhow!("{} column missing", CHUNK_COLUMN))?;
            let distances = batch
                .column_by_name(DISTANCE_COLUMN)
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow!("{} column missing", DISTANCE_COLUMN))?;
            for i in 0..batch.num_rows() {
                hits.push((usize::try_from(chunks.value(i))?, 1.0 - distances.value(i)));
            }
        }
        Ok(hits)
    }
}

impl ChunkRanker for LanceChunkStore {
    fn name(&self) -> &str {
        &self.table_name
    }

    fn fit(&mut self, chunks: &[String]) -> Result<()> {
        if self.db_path.exists() {
            std::fs::remove_dir_all(&self.db_path)?;
        }
        std::fs::create_dir_all(&self.db_path)?;
        let uri = self.db_path.to_string_lossy().to_string();
        let db = self
            .runtime
            .block_on(async { connect(&uri).execute().await })?;
        info!(
            "Embedding {} chunks into LanceDB table {}",
            chunks.len(),
            self.table_name
        );

        let pb = ProgressBar::new(chunks.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}",
                )?
                .progress_chars("#>-"),
        );
        let mut batches = Vec::new();
        for (n, window) in chunks.chunks(WRITE_BATCH).enumerate() {
            let mut vectors = Vec::with_capacity(window.len());
            for part in window.chunks(EMBED_BATCH) {
                vectors.extend(self.embedder.embed_batch(part).context("embedding chunks")?);
                pb.inc(part.len() as u64);
            }
            batches.push(self.to_record_batch(n * WRITE_BATCH, vectors)?);
        }
        pb.finish_with_message("embedded");
        self.runtime.block_on(self.write_batches(&db, batches))?;
        self.db = if chunks.is_empty() { None } else { Some(db) };
        debug!("LanceDB table {} holds {} chunks", self.table_name, chunks.len());
        Ok(())
    }

    fn rank(&self, query: &str, k: usize) -> Result<Vec<(usize, f32)>> {
        let Some(db) = &self.db else {
            return Ok(Vec::new());
        };
        let vector = self
            .embedder
            .embed_batch(&[query.to_string()])?
            .into_iter()
            .next()
            .context("empty query embedding")?;
        let mut hits = self.runtime.block_on(self.nearest(db, vector, k))?;
        hits.sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(hits)
    }
}
