use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use tempfile::TempDir;

use docqa_core::config::{PipelineConfig, TextRetriever};
use docqa_core::dataset::Dataset;
use docqa_core::traits::{
    ChunkRanker, Generator, OcrEngine, PageRasterizer, Sampling, TextExtractor, VisualEmbedder,
};
use docqa_core::types::{
    CombinedResponse, Modality, ModalityResponse, MultiVector, PageImage, TextRow, VisualRow,
};
use docqa_embed::{max_sim_all, FakeEmbedder};
use docqa_pipeline::artifacts::{artifact_file_name, ArtifactDirs};
use docqa_pipeline::cache::{resolve_pdf, DocumentCacheBuilder};
use docqa_pipeline::store::read_table;
use docqa_pipeline::{Pipeline, QueryOutcome, Services};
use docqa_text::Bm25Ranker;
use docqa_vector::LanceChunkStore;

type Corpus = HashMap<String, Vec<String>>;

fn stem(pdf: &Path) -> String {
    pdf.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

struct FakeExtractor(Corpus);

impl TextExtractor for FakeExtractor {
    fn extract_pages(&self, pdf: &Path) -> Result<Vec<String>> {
        self.0.get(&stem(pdf)).cloned().context("unknown pdf")
    }
}

/// Renders a page as the bytes of its text.
struct FakeRasterizer(Corpus);

impl PageRasterizer for FakeRasterizer {
    fn page_count(&self, pdf: &Path) -> Result<usize> {
        Ok(self.0.get(&stem(pdf)).context("unknown pdf")?.len())
    }

    fn render_page(&self, pdf: &Path, page_index: usize) -> Result<PageImage> {
        let pages = self.0.get(&stem(pdf)).context("unknown pdf")?;
        let text = pages.get(page_index).context("page out of range")?;
        Ok(PageImage::png(text.clone().into_bytes()))
    }
}

struct FakeOcr;

impl OcrEngine for FakeOcr {
    fn recognize(&self, page: &PageImage) -> Result<String> {
        Ok(format!("ocr {}", String::from_utf8_lossy(&page.bytes)))
    }
}

struct FakeVisual(FakeEmbedder);

impl VisualEmbedder for FakeVisual {
    fn embed_images(&self, images: &[PageImage]) -> Result<Vec<MultiVector>> {
        Ok(images
            .iter()
            .map(|img| self.0.embed_tokens(&String::from_utf8_lossy(&img.bytes)))
            .collect())
    }

    fn embed_queries(&self, queries: &[String]) -> Result<Vec<MultiVector>> {
        Ok(queries.iter().map(|q| self.0.embed_tokens(q)).collect())
    }

    fn score(&self, query: &MultiVector, candidates: &[&MultiVector]) -> Result<Vec<f32>> {
        max_sim_all(query, candidates)
    }
}

const ANSWER_REPLY: &str = "## Evidence:\nrevenue grew by twelve percent\n\
                            ## Chain of Thought:\nThe page states the growth.\n\
                            ## Answer:\ntwelve percent";
const FUSION_REPLY: &str = "## Analysis:\nBoth chains agree.\n\
                            ## Conclusion:\nResponse 1 is correct.\n\
                            ## Final Answer:\n12 percent";

#[derive(Clone, Default)]
struct Calls {
    count: Arc<AtomicUsize>,
    images: Arc<Mutex<Vec<usize>>>,
}

impl Calls {
    fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

struct ScriptedGenerator {
    calls: Calls,
    fail: bool,
}

impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate(&self, prompt: &str, images: &[PageImage], _sampling: Sampling) -> Result<String> {
        self.calls.count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.calls.images.lock() {
            seen.push(images.len());
        }
        if self.fail {
            bail!("backend unavailable");
        }
        let reply = if prompt.starts_with("Analyze the following two responses") {
            FUSION_REPLY
        } else {
            ANSWER_REPLY
        };
        Ok(reply.to_string())
    }
}

struct Fixture {
    _tmp: TempDir,
    config: PipelineConfig,
    corpus: Corpus,
    calls: Calls,
}

impl Fixture {
    /// `docs` become empty PDFs under `docs/`; `rows` are `(q_id, question, answer, documents)`.
    fn new(docs: &[(&str, &[&str])], rows: &[(&str, &str, &str, &str)]) -> Result<Self> {
        let tmp = tempfile::tempdir()?;
        let data_dir = tmp.path().join("bench");
        fs::create_dir_all(data_dir.join("docs"))?;
        let mut corpus = Corpus::new();
        for (id, pages) in docs {
            fs::write(data_dir.join("docs").join(format!("{id}.pdf")), b"")?;
            corpus.insert(id.to_string(), pages.iter().map(|p| p.to_string()).collect());
        }

        let mut config = PipelineConfig::new(&data_dir);
        config.output_dir = tmp.path().join("outputs");
        config.query_pause_ms = 0;
        config.top_k = 1;

        let mut writer = csv::Writer::from_path(config.dataset_path())?;
        writer.write_record(["q_id", "question", "answer", "documents"])?;
        for (q_id, question, answer, documents) in rows {
            writer.write_record([q_id, question, answer, documents])?;
        }
        writer.flush()?;

        Ok(Self {
            _tmp: tmp,
            config,
            corpus,
            calls: Calls::default(),
        })
    }

    fn pipeline(&self) -> Result<Pipeline> {
        self.pipeline_with(self.config.clone(), false)
    }

    fn pipeline_with(&self, config: PipelineConfig, fail: bool) -> Result<Pipeline> {
        self.assemble(config, Box::new(Bm25Ranker::new()?), fail)
    }

    fn assemble(
        &self,
        config: PipelineConfig,
        ranker: Box<dyn ChunkRanker>,
        fail: bool,
    ) -> Result<Pipeline> {
        let services = Services {
            extractor: Box::new(FakeExtractor(self.corpus.clone())),
            rasterizer: Box::new(FakeRasterizer(self.corpus.clone())),
            ocr: Box::new(FakeOcr),
            visual: Box::new(FakeVisual(FakeEmbedder::new(1024))),
            ranker,
            generator: Box::new(ScriptedGenerator {
                calls: self.calls.clone(),
                fail,
            }),
        };
        let dataset = Dataset::load_csv(&self.config.dataset_path())?;
        Pipeline::new(config, dataset, services)
    }

    fn artifacts(&self) -> ArtifactDirs {
        ArtifactDirs::new(&self.config.output_dir, self.config.generator)
    }
}

fn report_fixture() -> Result<Fixture> {
    Fixture::new(
        &[(
            "report",
            &["revenue grew by twelve percent in 2021", "board approved a dividend"],
        )],
        &[(
            "q1",
            "how much did revenue grow in 2021",
            "['12%']",
            "['report.pdf']",
        )],
    )
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

#[test]
fn single_document_query_completes_and_rerun_is_free() -> Result<()> {
    let fx = report_fixture()?;
    let mut pipeline = fx.pipeline()?;
    assert_eq!(pipeline.process_query("q1")?, QueryOutcome::Completed);
    assert_eq!(fx.calls.count(), 3);
    let images = fx.calls.images.lock().map_err(|_| anyhow::anyhow!("poisoned"))?;
    assert_eq!(*images, vec![1, 0, 0]);
    drop(images);

    let paths = fx.artifacts().for_query("q1");
    let visual: ModalityResponse = read_json(&paths.visual)?;
    assert_eq!(visual.document, vec!["report_0"]);
    assert_eq!(visual.pages, vec![0]);
    assert_eq!(visual.answer, "twelve percent");
    assert_eq!(visual.gt_answer, serde_json::json!(["12%"]));
    assert!(visual.chunks.is_none());

    let textual: ModalityResponse = read_json(&paths.textual)?;
    assert_eq!(textual.document, vec!["report"]);
    assert_eq!(
        textual.chunks.as_deref(),
        Some("revenue grew by twelve percent in 2021\nboard approved a dividend")
    );

    let combined: CombinedResponse = read_json(&paths.combined)?;
    assert_eq!(combined.answer, "12 percent");
    assert_eq!(combined.analysis, "Both chains agree.");
    assert_eq!(combined.conclusion, "Response 1 is correct.");
    assert_eq!(combined.response1, visual);
    assert_eq!(combined.response2, textual);

    assert_eq!(pipeline.process_query("q1")?, QueryOutcome::AlreadyDone);
    let mut fresh = fx.pipeline()?;
    assert_eq!(fresh.process_query("q1")?, QueryOutcome::AlreadyDone);
    assert_eq!(fx.calls.count(), 3);
    Ok(())
}

#[test]
fn run_summarises_outcomes() -> Result<()> {
    let fx = Fixture::new(
        &[("report", &["revenue grew by twelve percent in 2021"])],
        &[
            ("q1", "how much did revenue grow", "12%", "['report.pdf']"),
            ("q2", "what about the ghost", "none", "['ghost.pdf']"),
            ("q1", "duplicate row", "12%", "['report.pdf']"),
        ],
    )?;
    let mut pipeline = fx.pipeline()?;
    let summary = pipeline.run()?;
    assert_eq!(
        (
            summary.completed,
            summary.incomplete,
            summary.already_done,
            summary.failed
        ),
        (1, 1, 0, 0)
    );

    // Textual ranking is corpus-wide, so q2 still gets a textual answer.
    let status = pipeline.status();
    assert_eq!(
        (status.queries, status.visual, status.textual, status.combined),
        (2, 1, 2, 1)
    );
    assert_eq!(fx.calls.count(), 4);
    Ok(())
}

#[test]
fn tables_are_reused_unless_reindex_is_forced() -> Result<()> {
    let fx = report_fixture()?;
    let table = fx.config.retrieval_dir().join("retrieval_bm25.csv");

    let mut first = fx.pipeline()?;
    assert!(first.ensure_index(Modality::Textual)?);
    assert!(!first.ensure_index(Modality::Textual)?);
    let original = fs::read(&table)?;
    assert!(!original.is_empty());

    let mut second = fx.pipeline()?;
    assert!(!second.ensure_index(Modality::Textual)?);
    assert_eq!(fs::read(&table)?, original);

    let header_only = "q_id,question,chunk,chunk_pdf_name,pdf_page_number,rank,score\n";
    fs::write(&table, header_only)?;
    let mut third = fx.pipeline()?;
    assert!(!third.ensure_index(Modality::Textual)?);
    assert_eq!(fs::read_to_string(&table)?, header_only);

    let mut forced_config = fx.config.clone();
    forced_config.force_reindex = true;
    let mut forced = fx.pipeline_with(forced_config, false)?;
    assert!(forced.ensure_index(Modality::Textual)?);
    assert!(!forced.ensure_index(Modality::Textual)?);
    assert_eq!(fs::read(&table)?, original);
    Ok(())
}

#[test]
fn visual_ranking_stays_inside_relevant_documents() -> Result<()> {
    let fx = Fixture::new(
        &[
            ("alpha", &["solar panel output", "wind farm capacity"]),
            ("beta", &["solar tariff policy"]),
        ],
        &[
            ("q1", "solar output", "x", "['alpha.pdf']"),
            ("q2", "solar tariff", "y", ""),
        ],
    )?;
    let mut pipeline = fx.pipeline()?;
    assert!(pipeline.ensure_index(Modality::Visual)?);

    let table = fx.config.retrieval_dir().join("retrieval_colpali.csv");
    let rows: Vec<VisualRow> = read_table(&table)?;
    let q1: Vec<&VisualRow> = rows.iter().filter(|r| r.q_id == "q1").collect();
    assert_eq!(
        q1.iter().map(|r| r.document_id.as_str()).collect::<Vec<_>>(),
        vec!["alpha_0", "alpha_1"]
    );
    assert!(q1[0].score >= q1[1].score);

    let mut q2: Vec<&str> = rows
        .iter()
        .filter(|r| r.q_id == "q2")
        .map(|r| r.document_id.as_str())
        .collect();
    assert_eq!(q2[0], "beta_0");
    q2.sort_unstable();
    assert_eq!(q2, vec!["alpha_0", "alpha_1", "beta_0"]);
    Ok(())
}

#[test]
fn missing_context_leaves_query_incomplete_without_generation() -> Result<()> {
    let fx = Fixture::new(&[], &[("q1", "anything", "x", "['ghost.pdf']")])?;
    let mut pipeline = fx.pipeline()?;
    assert!(pipeline.visual_contexts("q1").is_empty());
    assert!(pipeline.textual_contexts("q1").is_empty());
    assert_eq!(pipeline.process_query("q1")?, QueryOutcome::Incomplete);
    assert_eq!(fx.calls.count(), 0);
    let paths = fx.artifacts().for_query("q1");
    assert!(!paths.visual.exists() && !paths.textual.exists() && !paths.combined.exists());
    Ok(())
}

#[test]
fn failed_generation_persists_nothing_and_is_retried() -> Result<()> {
    let fx = report_fixture()?;
    let mut failing = fx.pipeline_with(fx.config.clone(), true)?;
    assert_eq!(failing.process_query("q1")?, QueryOutcome::Incomplete);
    assert_eq!(fx.calls.count(), 2);
    let paths = fx.artifacts().for_query("q1");
    assert!(!paths.visual.exists() && !paths.textual.exists());

    let mut working = fx.pipeline()?;
    assert_eq!(working.process_query("q1")?, QueryOutcome::Completed);
    assert_eq!(fx.calls.count(), 5);
    Ok(())
}

#[test]
fn unreadable_artifact_still_counts_as_done() -> Result<()> {
    let fx = report_fixture()?;
    let paths = fx.artifacts().for_query("q1");
    fs::create_dir_all(paths.visual.parent().context("no parent")?)?;
    fs::write(&paths.visual, "not json")?;

    let mut pipeline = fx.pipeline()?;
    assert_eq!(pipeline.process_query("q1")?, QueryOutcome::Completed);
    assert_eq!(fx.calls.count(), 2);
    let combined: CombinedResponse = read_json(&paths.combined)?;
    assert_eq!(combined.response1, ModalityResponse::default());
    Ok(())
}

#[test]
fn unknown_query_is_an_error() -> Result<()> {
    let fx = report_fixture()?;
    assert!(fx.pipeline()?.process_query("nope").is_err());
    Ok(())
}

#[test]
fn existing_visdmrag_output_tree_resumes_as_done() -> Result<()> {
    let fx = report_fixture()?;
    let root = &fx.config.output_dir;
    let generator = fx.config.generator;
    for dir in ["vision", "text", "visdmrag"] {
        let dir = root.join(format!("{generator}_{dir}"));
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("response_q1.json"), "{}")?;
    }

    assert_eq!(fx.artifacts().combined, root.join(format!("{generator}_visdmrag")));
    assert_eq!(fx.pipeline()?.process_query("q1")?, QueryOutcome::AlreadyDone);
    assert_eq!(fx.calls.count(), 0);
    Ok(())
}

#[test]
fn artifact_names_escape_slashes() {
    assert_eq!(artifact_file_name("spiqa/12"), "response_spiqa$12.json");
    assert_eq!(artifact_file_name("q1"), "response_q1.json");
}

#[test]
fn pdf_resolution_tries_padded_and_prefixed_names() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    for name in ["plain.pdf", "abc0000000.pdf", "paper.pdf"] {
        fs::write(tmp.path().join(name), b"")?;
    }
    assert_eq!(
        resolve_pdf(tmp.path(), "plain"),
        Some(tmp.path().join("plain.pdf"))
    );
    assert_eq!(
        resolve_pdf(tmp.path(), "abc"),
        Some(tmp.path().join("abc0000000.pdf"))
    );
    assert_eq!(
        resolve_pdf(tmp.path(), "paper_3"),
        Some(tmp.path().join("paper.pdf"))
    );
    assert_eq!(resolve_pdf(tmp.path(), "missing"), None);
    Ok(())
}

#[test]
fn blank_text_layer_falls_back_to_ocr() -> Result<()> {
    let mut corpus = Corpus::new();
    corpus.insert(
        "scan".to_string(),
        vec!["first page".to_string(), "  ".to_string()],
    );
    corpus.insert("born_digital".to_string(), vec!["text layer".to_string()]);
    let extractor = FakeExtractor(corpus.clone());
    let rasterizer = FakeRasterizer(corpus);
    let builder = DocumentCacheBuilder::new(&extractor, &rasterizer, &FakeOcr);

    assert_eq!(
        builder.extract(Path::new("/docs/scan.pdf"))?,
        vec!["--- Page 1 ---\nocr first page\n", "--- Page 2 ---\nocr   \n"]
    );
    assert_eq!(
        builder.extract(Path::new("/docs/born_digital.pdf"))?,
        vec!["text layer"]
    );
    Ok(())
}

struct BrokenExtractor;

impl TextExtractor for BrokenExtractor {
    fn extract_pages(&self, _pdf: &Path) -> Result<Vec<String>> {
        bail!("pdftotext exited with status 1")
    }
}

#[test]
fn failed_text_extraction_falls_back_to_ocr() -> Result<()> {
    let mut corpus = Corpus::new();
    corpus.insert("scan".to_string(), vec!["quarterly totals".to_string()]);
    let rasterizer = FakeRasterizer(corpus);
    let builder = DocumentCacheBuilder::new(&BrokenExtractor, &rasterizer, &FakeOcr);

    assert_eq!(
        builder.extract(Path::new("/docs/scan.pdf"))?,
        vec!["--- Page 1 ---\nocr quarterly totals\n"]
    );
    // Without a page count there is nothing to recognise either.
    assert!(builder.extract(Path::new("/docs/unknown.pdf")).is_err());
    Ok(())
}

#[test]
fn dense_textual_table_ranks_by_similarity() -> Result<()> {
    let fx = Fixture::new(
        &[
            ("alpha", &["revenue grew by twelve percent in 2021"]),
            ("beta", &["the board approved a dividend"]),
            ("gamma", &["protein folding accuracy improved"]),
            ("delta", &["revenue fell sharply in 2020"]),
        ],
        &[(
            "q1",
            "how much did revenue grow in 2021",
            "['12%']",
            "['alpha.pdf']",
        )],
    )?;
    let mut config = fx.config.clone();
    config.text_retriever = TextRetriever::Bge;
    config.top_k = 2;
    let store = LanceChunkStore::new(
        &config.retrieval_dir().join("lancedb_bge"),
        "chunks_bge",
        Box::new(FakeEmbedder::new(1024)),
    )?;
    let mut pipeline = fx.assemble(config, Box::new(store), false)?;

    assert!(pipeline.ensure_index(Modality::Textual)?);
    let table = pipeline.store().path(Modality::Textual).to_path_buf();
    assert!(table.ends_with("retrieval_bge.csv"));

    let rows: Vec<TextRow> = read_table(&table)?;
    assert_eq!(rows.len(), 4, "2 x top_k rows per query");
    assert_eq!(rows.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    for pair in rows.windows(2) {
        assert!(pair[0].score >= pair[1].score, "{} before {}", pair[0].score, pair[1].score);
    }
    assert_eq!(rows[0].chunk_pdf_name, "alpha");
    assert_eq!(rows[1].chunk_pdf_name, "delta");
    assert!(rows.iter().all(|r| r.score <= 1.0 + 1e-4));
    Ok(())
}
