//! Layered configuration and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nesting, e.g. `APP_PIPELINE__TOP_K=3`). The `[pipeline]`
//! section deserializes into [`PipelineConfig`].
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Overlay file merged after `config.toml` for each `RUST_ENV` value.
fn env_overlay(env_name: &str) -> Option<&'static str> {
    match env_name {
        "dev" | "development" => Some("config.dev.toml"),
        "prod" | "production" => Some("config.prod.toml"),
        "test" | "testing" => Some("config.test.toml"),
        _ => None,
    }
}

pub struct Config {
    figment: Figment,
}

impl Config {
    /// Load `config.toml`, its `RUST_ENV` overlay and `APP_*` variables, with the
    /// files looked up in `dir`.
    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = std::env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        let files = std::iter::once("config.toml").chain(env_overlay(&env_name));
        let figment = files
            .fold(Figment::new(), |fig, name| fig.merge(Toml::file(dir.join(name))))
            .merge(Env::prefixed("APP_").split("__"));
        Ok(Self { figment })
    }

    /// Merge command-line overrides on top of files and environment.
    /// `overrides` should serialize to a map whose keys follow the config layout
    /// and omit unset values.
    pub fn with_overrides<T: Serialize>(mut self, overrides: T) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(overrides));
        self
    }

    /// The `[pipeline]` section with defaults applied and paths expanded.
    pub fn pipeline(&self) -> anyhow::Result<PipelineConfig> {
        let config: PipelineConfig = self
            .figment
            .extract_inner("pipeline")
            .map_err(|e| anyhow::anyhow!("[pipeline] section is invalid: {}", e))?;
        Ok(config.with_expanded_paths()?)
    }
}

/// Answer-style instructions for the benchmark families the pipeline was tuned on.
pub const ANSWER_STYLES: &[(&str, &str)] = &[
    (
        "feta_tab",
        "You are a Wikipedia editor. Answer the question with a single, well-formed, factual sentence.",
    ),
    (
        "paper_tab",
        "You are a research scientist. Answer the question with a concise technical phrase.",
    ),
    (
        "scigraphqa",
        "You are a scientific researcher. Answer the question in 1-2 clear, evidence-based sentences.",
    ),
    (
        "slidevqa",
        "You are a presentation expert. Provide the exact answer to the question as it would appear on a slide. Be direct and precise.",
    ),
    (
        "spiqa",
        "You are a scientific paper author. Answer the question in 1-3 authoritative sentences.",
    ),
];

pub const DEFAULT_QA_PROMPT: &str =
    "Answer the question objectively based on the context provided.";

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name { $(#[serde(rename = $text)] $variant),+ }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;
            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!(
                        "unsupported {} '{}' (expected one of: {})",
                        stringify!($name),
                        other,
                        [$($text),+].join(", ")
                    )),
                }
            }
        }
    };
}

string_enum! {
    /// Generation backend identity. Also scopes the output directories.
    GeneratorKind { Gpt4 => "gpt4", Gemini => "gemini", Qwen => "qwen" }
}

string_enum! {
    /// Late-interaction visual retriever.
    VisionRetriever { ColPali => "colpali", ColQwen => "colqwen" }
}

string_enum! {
    /// Sparse (`bm25`) or dense text retriever.
    TextRetriever { Bm25 => "bm25", MiniLm => "minilm", Bge => "bge", BgeM3 => "bge-m3" }
}

impl VisionRetriever {
    /// Model name sent to the embedding service.
    pub fn model_name(&self) -> &'static str {
        match self {
            Self::ColPali => "vidore/colpali-v1.2",
            Self::ColQwen => "vidore/colqwen2-v0.1",
        }
    }
}

impl TextRetriever {
    pub fn is_dense(&self) -> bool {
        !matches!(self, Self::Bm25)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_generator")]
    pub generator: GeneratorKind,
    #[serde(default = "default_vision_retriever")]
    pub vision_retriever: VisionRetriever,
    #[serde(default = "default_text_retriever")]
    pub text_retriever: TextRetriever,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default)]
    pub force_reindex: bool,
    #[serde(default)]
    pub answer_style: Option<String>,
    #[serde(default)]
    pub qa_prompt: Option<String>,
    #[serde(default)]
    pub csv_path: Option<PathBuf>,
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
    #[serde(default = "default_visual_endpoint")]
    pub visual_endpoint: String,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_qwen_base_url")]
    pub qwen_base_url: String,
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,
    #[serde(default = "default_query_pause_ms")]
    pub query_pause_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_generator() -> GeneratorKind {
    GeneratorKind::Gpt4
}

fn default_vision_retriever() -> VisionRetriever {
    VisionRetriever::ColPali
}

fn default_text_retriever() -> TextRetriever {
    TextRetriever::Bm25
}

fn default_top_k() -> usize {
    5
}

fn default_chunk_size() -> usize {
    3000
}

fn default_chunk_overlap() -> usize {
    300
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_visual_endpoint() -> String {
    "http://127.0.0.1:8765".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_qwen_base_url() -> String {
    "http://127.0.0.1:8000/v1".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_query_pause_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    300
}

impl PipelineConfig {
    /// Defaults for everything except the data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            output_dir: default_output_dir(),
            generator: default_generator(),
            vision_retriever: default_vision_retriever(),
            text_retriever: default_text_retriever(),
            top_k: default_top_k(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            force_reindex: false,
            answer_style: None,
            qa_prompt: None,
            csv_path: None,
            models_dir: default_models_dir(),
            visual_endpoint: default_visual_endpoint(),
            openai_base_url: default_openai_base_url(),
            qwen_base_url: default_qwen_base_url(),
            gemini_base_url: default_gemini_base_url(),
            query_pause_ms: default_query_pause_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    /// Expand `~` and `$VAR` / `${VAR}` in every configured path. An unset
    /// variable is a configuration error.
    pub fn with_expanded_paths(mut self) -> Result<Self> {
        self.data_dir = expand_config_path("data_dir", &self.data_dir)?;
        self.output_dir = expand_config_path("output_dir", &self.output_dir)?;
        self.models_dir = expand_config_path("models_dir", &self.models_dir)?;
        if let Some(csv) = self.csv_path.take() {
            self.csv_path = Some(expand_config_path("csv_path", &csv)?);
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(Error::InvalidConfig("top_k must be at least 1".into()));
        }
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be at least 1".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if let Some(style) = &self.answer_style {
            if self.qa_prompt.is_none() && !ANSWER_STYLES.iter().any(|(name, _)| name == style) {
                return Err(Error::InvalidConfig(format!("unknown answer_style '{style}'")));
            }
        }
        Ok(())
    }

    /// The dataset table; defaults to `{data_dir}/{basename(data_dir)}.csv`.
    pub fn dataset_path(&self) -> PathBuf {
        if let Some(p) = &self.csv_path {
            return p.clone();
        }
        let stem = self
            .data_dir
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "dataset".to_string());
        self.data_dir.join(format!("{stem}.csv"))
    }

    pub fn docs_dir(&self) -> PathBuf {
        self.data_dir.join("docs")
    }

    pub fn retrieval_dir(&self) -> PathBuf {
        self.data_dir.join("retrieval")
    }

    /// Answer-style instruction injected into the structured-answer prompt.
    pub fn qa_instruction(&self) -> &str {
        if let Some(p) = &self.qa_prompt {
            return p;
        }
        self.answer_style
            .as_deref()
            .and_then(|style| ANSWER_STYLES.iter().find(|(name, _)| *name == style))
            .map_or(DEFAULT_QA_PROMPT, |(_, prompt)| prompt)
    }
}

fn expand_config_path(key: &str, path: &Path) -> Result<PathBuf> {
    // Non-UTF-8 paths cannot hold variables worth expanding.
    let Some(raw) = path.to_str() else {
        return Ok(path.to_path_buf());
    };
    shellexpand::full(raw)
        .map(|expanded| PathBuf::from(expanded.as_ref()))
        .map_err(|e| Error::InvalidConfig(format!("{key} '{raw}': {e}")))
}
