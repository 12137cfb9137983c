mod logging;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use docqa_core::config::{Config, GeneratorKind, TextRetriever, VisionRetriever};
use docqa_core::dataset::Dataset;
use docqa_core::types::Modality;
use docqa_pipeline::artifacts::ArtifactDirs;
use docqa_pipeline::{status_report, Pipeline};

#[derive(Parser)]
#[command(name = "docqa")]
#[command(
    about = "Visual + textual retrieval-augmented question answering over PDF collections"
)]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and its environment overlays
    #[arg(long, global = true, default_value = ".")]
    config_dir: PathBuf,

    /// Enable debug logging for every target
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    overrides: PipelineOverrides,

    #[command(subcommand)]
    command: Commands,
}

/// Flags that override `[pipeline]` keys. Unset flags leave the layered value alone.
#[derive(Args, Serialize, Default)]
struct PipelineOverrides {
    /// Dataset root (holds docs/ and the query table)
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    generator: Option<GeneratorKind>,
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    vision_retriever: Option<VisionRetriever>,
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    text_retriever: Option<TextRetriever>,
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<usize>,
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    chunk_size: Option<usize>,
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    chunk_overlap: Option<usize>,
    /// Rebuild ranking tables even when they exist
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    force_reindex: bool,
    /// One of feta_tab, paper_tab, scigraphqa, slidevqa, spiqa
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    answer_style: Option<String>,
    /// Free-form answer instruction; overrides --answer-style
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    qa_prompt: Option<String>,
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    csv_path: Option<PathBuf>,
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    models_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    visual_endpoint: Option<String>,
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    query_pause_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer every query in the dataset, resuming where a previous run stopped
    Run,
    /// Answer a single query
    Query {
        q_id: String,
    },
    /// Build ranking tables ahead of generation
    Index {
        #[arg(value_enum, default_value = "all")]
        target: IndexTarget,
    },
    /// Count queries with vision, text and combined artifacts
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
enum IndexTarget {
    Visual,
    Textual,
    All,
}

impl IndexTarget {
    fn modalities(self) -> &'static [Modality] {
        match self {
            Self::Visual => &[Modality::Visual],
            Self::Textual => &[Modality::Textual],
            Self::All => &[Modality::Visual, Modality::Textual],
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init_logging(cli.verbose)?;

    let config = Config::load_from(&cli.config_dir)?
        .with_overrides(serde_json::json!({ "pipeline": &cli.overrides }));
    let pipeline_config = config.pipeline()?;
    pipeline_config.validate()?;
    info!(
        "Data directory {}, outputs under {}",
        pipeline_config.data_dir.display(),
        pipeline_config.output_dir.display()
    );

    if let Commands::Status = cli.command {
        let dataset = Dataset::load_csv(&pipeline_config.dataset_path())?;
        let dirs = ArtifactDirs::new(&pipeline_config.output_dir, pipeline_config.generator);
        let report = status_report(&dirs, &dataset);
        println!(
            "{} queries: {} vision, {} text, {} combined ({} remaining)",
            report.queries,
            report.visual,
            report.textual,
            report.combined,
            report.queries - report.combined
        );
        return Ok(());
    }

    let mut pipeline = Pipeline::from_config(pipeline_config)?;
    match cli.command {
        Commands::Run => {
            let summary = pipeline.run()?;
            println!(
                "completed {}, already done {}, incomplete {}, failed {}",
                summary.completed, summary.already_done, summary.incomplete, summary.failed
            );
        }
        Commands::Query { q_id } => {
            let outcome = pipeline.process_query(&q_id)?;
            println!("{q_id}: {outcome:?}");
        }
        Commands::Index { target } => {
            for modality in target.modalities() {
                let built = pipeline.ensure_index(*modality)?;
                let path = pipeline.store().path(*modality).display().to_string();
                if built {
                    println!("built {modality} table {path}");
                } else {
                    println!("{modality} table {path} is up to date");
                }
            }
        }
        Commands::Status => {}
    }
    Ok(())
}
