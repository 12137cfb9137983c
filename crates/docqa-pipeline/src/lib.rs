//! Dual-modality question answering over PDF collections: ranking tables,
//! per-query answer generation and fusion.
pub mod artifacts;
pub mod cache;
pub mod fusion;
pub mod generate;
pub mod orchestrator;
pub mod pdf;
pub mod prompts;
pub mod remote;
pub mod services;
pub mod store;
pub mod textual;
pub mod visual;

pub use orchestrator::{status_report, Pipeline, QueryOutcome, RunSummary, StatusReport};
pub use services::Services;
pub use store::RetrievalStore;
