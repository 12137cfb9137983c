//! Resumable per-query state machine.
//!
//! Each query moves through visual answer, textual answer and fusion. Every
//! step persists a JSON artifact and a present artifact is never recomputed, so
//! an interrupted batch resumes where it stopped.
use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use docqa_core::align::{align_chunks, DocumentPages};
use docqa_core::chunker::RecursiveSplitter;
use docqa_core::config::PipelineConfig;
use docqa_core::dataset::{Dataset, Query};
use docqa_core::sections::{
    extract_sections, ANSWER, ANSWER_HEADINGS, CHAIN_OF_THOUGHT, EVIDENCE,
};
use docqa_core::traits::Sampling;
use docqa_core::types::{
    parse_page_id, Modality, ModalityResponse, PageImage, TextContext, VisualContext,
};
use docqa_core::Error;

use crate::artifacts::{load_response, write_json, ArtifactDirs};
use crate::cache::{resolve_pdf, DocumentCacheBuilder};
use crate::fusion::FusionArbiter;
use crate::prompts::{textual_prompt, visual_prompt};
use crate::services::Services;
use crate::store::RetrievalStore;
use crate::textual::TextualIndexBuilder;
use crate::visual::VisualIndexBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    /// The combined artifact already existed.
    AlreadyDone,
    Completed,
    /// At least one step produced no artifact; a rerun retries it.
    Incomplete,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub already_done: usize,
    pub incomplete: usize,
    pub failed: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &anyhow::Result<QueryOutcome>) {
        match outcome {
            Ok(QueryOutcome::Completed) => self.completed += 1,
            Ok(QueryOutcome::AlreadyDone) => self.already_done += 1,
            Ok(QueryOutcome::Incomplete) => self.incomplete += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Artifact counts over the distinct query ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub queries: usize,
    pub visual: usize,
    pub textual: usize,
    pub combined: usize,
}

pub struct Pipeline {
    config: PipelineConfig,
    dataset: Dataset,
    services: Services,
    store: RetrievalStore,
    artifacts: ArtifactDirs,
    documents: Option<DocumentPages>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        dataset: Dataset,
        services: Services,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let store = RetrievalStore::new(
            &config.retrieval_dir(),
            config.vision_retriever.as_str(),
            config.text_retriever.as_str(),
            config.force_reindex,
        );
        let artifacts = ArtifactDirs::new(&config.output_dir, config.generator);
        artifacts.create().with_context(|| {
            format!(
                "creating output directories under {}",
                config.output_dir.display()
            )
        })?;
        Ok(Self {
            config,
            dataset,
            services,
            store,
            artifacts,
            documents: None,
        })
    }

    /// Validate, load the dataset and wire the concrete collaborators.
    pub fn from_config(config: PipelineConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let dataset = Dataset::load_csv(&config.dataset_path())?;
        let services = Services::from_config(&config)?;
        Self::new(config, dataset, services)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn store(&self) -> &RetrievalStore {
        &self.store
    }

    /// Per-page text of every referenced document, extracted on first use.
    fn documents(&mut self) -> &DocumentPages {
        let Self {
            documents,
            services,
            dataset,
            config,
            ..
        } = self;
        documents.get_or_insert_with(|| {
            DocumentCacheBuilder::new(
                services.extractor.as_ref(),
                services.rasterizer.as_ref(),
                services.ocr.as_ref(),
            )
            .build(dataset, &config.docs_dir())
        })
    }

    /// Build the ranking table for `modality` if this run still needs it.
    /// Returns whether a build happened. A failed build is not retried in the same run.
    pub fn ensure_index(&mut self, modality: Modality) -> anyhow::Result<bool> {
        if !self.store.needs_build(modality) {
            debug!(
                "{} table {} is up to date",
                modality,
                self.store.path(modality).display()
            );
            return Ok(false);
        }
        info!(
            "Building {} table at {}",
            modality,
            self.store.path(modality).display()
        );
        let built = match modality {
            Modality::Visual => self.build_visual(),
            Modality::Textual => self.build_textual(),
        };
        self.store.mark_settled(modality);
        built.with_context(|| format!("building the {modality} table"))?;
        Ok(true)
    }

    fn build_visual(&mut self) -> anyhow::Result<()> {
        let builder = VisualIndexBuilder::new(
            self.services.rasterizer.as_ref(),
            self.services.visual.as_ref(),
        );
        let rows = builder.build(&self.dataset, &self.config.docs_dir())?;
        self.store.write_visual(&rows)?;
        Ok(())
    }

    fn build_textual(&mut self) -> anyhow::Result<()> {
        let splitter = RecursiveSplitter::new(self.config.chunk_size, self.config.chunk_overlap);
        let chunks = align_chunks(self.documents(), &splitter);
        info!("Aligned {} chunks", chunks.len());
        let rows = TextualIndexBuilder::new(self.services.ranker.as_mut(), self.config.top_k)
            .build(&self.dataset, &chunks)?;
        self.store.write_textual(&rows)?;
        Ok(())
    }

    /// Top-`top_k` pages for `q_id`, rendered. Unrenderable pages are skipped.
    pub fn visual_contexts(&mut self, q_id: &str) -> Vec<VisualContext> {
        if let Err(e) = self.ensure_index(Modality::Visual) {
            error!("{:#}", e);
            return Vec::new();
        }
        let rows = match self.store.read_visual(q_id, self.config.top_k) {
            Ok(rows) => rows,
            Err(e) => {
                error!("Reading visual table failed: {}", e);
                return Vec::new();
            }
        };
        let docs_dir = self.config.docs_dir();
        let mut contexts = Vec::with_capacity(rows.len());
        for row in rows {
            let Some((doc_id, page)) = parse_page_id(&row.document_id) else {
                warn!("Malformed page id {}", row.document_id);
                continue;
            };
            let Some(pdf) = resolve_pdf(&docs_dir, doc_id) else {
                warn!("PDF not found for document {}", doc_id);
                continue;
            };
            match self.services.rasterizer.render_page(&pdf, page) {
                Ok(image) => contexts.push(VisualContext {
                    image,
                    document_id: row.document_id.clone(),
                    page_number: page,
                }),
                Err(e) => warn!("Cannot render page {} of {}: {:#}", page, pdf.display(), e),
            }
        }
        contexts
    }

    /// Chunks with the smallest ranks for `q_id`, at most `top_k`.
    pub fn textual_contexts(&mut self, q_id: &str) -> Vec<TextContext> {
        if let Err(e) = self.ensure_index(Modality::Textual) {
            error!("{:#}", e);
            return Vec::new();
        }
        match self.store.read_textual(q_id, self.config.top_k) {
            Ok(rows) => rows
                .into_iter()
                .map(|r| TextContext {
                    chunk: r.chunk,
                    chunk_pdf_name: r.chunk_pdf_name,
                    pdf_page_number: r.pdf_page_number,
                })
                .collect(),
            Err(e) => {
                error!("Reading textual table failed: {}", e);
                Vec::new()
            }
        }
    }

    pub fn process_query(&mut self, q_id: &str) -> anyhow::Result<QueryOutcome> {
        let query = self
            .dataset
            .get(q_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("query {q_id}")))?;
        let paths = self.artifacts.for_query(q_id);
        if paths.combined.exists() {
            debug!("Query {} already has a combined answer", q_id);
            return Ok(QueryOutcome::AlreadyDone);
        }

        let visual = if paths.visual.exists() {
            Some(load_response(&paths.visual))
        } else {
            self.answer_visual(&query, &paths.visual)?
        };
        let textual = if paths.textual.exists() {
            Some(load_response(&paths.textual))
        } else {
            self.answer_textual(&query, &paths.textual)?
        };
        let (Some(visual), Some(textual)) = (visual, textual) else {
            warn!("Query {} is incomplete; a rerun will retry the missing steps", q_id);
            return Ok(QueryOutcome::Incomplete);
        };

        let combined =
            FusionArbiter::new(self.services.generator.as_ref()).combine(&query, visual, textual);
        self.services.generator.release_memory();
        match combined {
            Ok(combined) => {
                write_json(&paths.combined, &combined)?;
                info!("Query {} answered: {}", q_id, combined.answer);
                Ok(QueryOutcome::Completed)
            }
            Err(e) => {
                error!("Fusion failed for query {}: {:#}", q_id, e);
                Ok(QueryOutcome::Incomplete)
            }
        }
    }

    fn answer_visual(
        &mut self,
        query: &Query,
        path: &Path,
    ) -> anyhow::Result<Option<ModalityResponse>> {
        let contexts = self.visual_contexts(&query.q_id);
        if contexts.is_empty() {
            warn!("No visual context for query {}", query.q_id);
            return Ok(None);
        }

        let mut images: Vec<PageImage> = Vec::with_capacity(contexts.len());
        let mut document = Vec::with_capacity(contexts.len());
        let mut pages = Vec::with_capacity(contexts.len());
        for ctx in contexts {
            images.push(ctx.image);
            document.push(ctx.document_id);
            pages.push(ctx.page_number);
        }
        let prompt = visual_prompt(self.config.qa_instruction(), &query.question);
        let reply = self
            .services
            .generator
            .generate(&prompt, &images, Sampling::ANSWER);
        drop(images);
        self.services.generator.release_memory();
        let reply = match reply {
            Ok(r) => r,
            Err(e) => {
                error!("Visual generation failed for query {}: {:#}", query.q_id, e);
                return Ok(None);
            }
        };
        let response = ModalityResponse {
            document,
            pages,
            chunks: None,
            ..structured_response(query, &reply)
        };
        write_json(path, &response)?;
        Ok(Some(response))
    }

    fn answer_textual(
        &mut self,
        query: &Query,
        path: &Path,
    ) -> anyhow::Result<Option<ModalityResponse>> {
        let contexts = self.textual_contexts(&query.q_id);
        if contexts.is_empty() {
            warn!("No textual context for query {}", query.q_id);
            return Ok(None);
        }

        let chunks: Vec<String> = contexts.iter().map(|c| c.chunk.clone()).collect();
        let prompt = textual_prompt(self.config.qa_instruction(), &query.question, &chunks);
        let reply = self
            .services
            .generator
            .generate(&prompt, &[], Sampling::ANSWER);
        self.services.generator.release_memory();
        let reply = match reply {
            Ok(r) => r,
            Err(e) => {
                error!("Textual generation failed for query {}: {:#}", query.q_id, e);
                return Ok(None);
            }
        };
        let response = ModalityResponse {
            document: contexts.iter().map(|c| c.chunk_pdf_name.clone()).collect(),
            pages: contexts.iter().map(|c| c.pdf_page_number).collect(),
            chunks: Some(chunks.join("\n")),
            ..structured_response(query, &reply)
        };
        write_json(path, &response)?;
        Ok(Some(response))
    }

    /// Process every distinct query in dataset order. Per-query errors are logged and skipped.
    pub fn run(&mut self) -> anyhow::Result<RunSummary> {
        let ids = self.dataset.unique_ids();
        info!(
            "Processing {} queries with {}",
            ids.len(),
            self.services.generator.name()
        );
        let pb = ProgressBar::new(ids.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} queries ({percent}%) {msg}",
                )?
                .progress_chars("#>-"),
        );

        let pause = Duration::from_millis(self.config.query_pause_ms);
        let mut summary = RunSummary::default();
        for (i, q_id) in ids.iter().enumerate() {
            pb.set_message(q_id.clone());
            let outcome = self.process_query(q_id);
            if let Err(e) = &outcome {
                error!("Query {} failed: {:#}", q_id, e);
            }
            let worked = matches!(
                outcome,
                Ok(QueryOutcome::Completed | QueryOutcome::Incomplete)
            );
            summary.record(&outcome);
            pb.inc(1);
            if worked && i + 1 < ids.len() && !pause.is_zero() {
                std::thread::sleep(pause);
            }
        }
        pb.finish_and_clear();
        info!(
            "Run finished: {} completed, {} already done, {} incomplete, {} failed",
            summary.completed, summary.already_done, summary.incomplete, summary.failed
        );
        Ok(summary)
    }

    pub fn status(&self) -> StatusReport {
        status_report(&self.artifacts, &self.dataset)
    }
}

/// Count the artifacts present for every distinct query id.
pub fn status_report(artifacts: &ArtifactDirs, dataset: &Dataset) -> StatusReport {
    let ids = dataset.unique_ids();
    let mut report = StatusReport {
        queries: ids.len(),
        ..StatusReport::default()
    };
    for q_id in &ids {
        let paths = artifacts.for_query(q_id);
        report.visual += usize::from(paths.visual.exists());
        report.textual += usize::from(paths.textual.exists());
        report.combined += usize::from(paths.combined.exists());
    }
    report
}

fn structured_response(query: &Query, reply: &str) -> ModalityResponse {
    let sections = extract_sections(reply, &ANSWER_HEADINGS);
    ModalityResponse {
        evidence: sections.get(EVIDENCE).to_string(),
        chain_of_thought: sections.get(CHAIN_OF_THOUGHT).to_string(),
        answer: sections.get(ANSWER).to_string(),
        question: query.question.clone(),
        gt_answer: query.answer.clone(),
        ..ModalityResponse::default()
    }
}
