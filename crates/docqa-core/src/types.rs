//! Domain types shared by the retrieval engines and the orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One embedding vector per token/patch; late-interaction models return many.
pub type MultiVector = Vec<Vec<f32>>;

/// The two independent retrieval-and-answer pathways.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Modality {
    Visual,
    Textual,
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Visual => f.write_str("visual"),
            Self::Textual => f.write_str("textual"),
        }
    }
}

/// A rendered PDF page, encoded (PNG by default) and ready to ship to a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl PageImage {
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime_type: "image/png".to_string(),
        }
    }
}

/// Strip directory components and a trailing `.pdf` so ids coming from the
/// `documents` list and the `doc_path` column agree.
pub fn normalize_doc_id(raw: &str) -> String {
    let trimmed = raw.trim();
    let base = trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed);
    let lower = base.to_ascii_lowercase();
    if lower.ends_with(".pdf") {
        base[..base.len() - 4].to_string()
    } else {
        base.to_string()
    }
}

/// `{doc_id}_{page_index}`; page indices are 0-based.
pub fn page_id(doc_id: &str, page_index: usize) -> String {
    format!("{doc_id}_{page_index}")
}

/// Inverse of [`page_id`]. Splits on the last underscore, so document ids may
/// themselves contain underscores.
pub fn parse_page_id(id: &str) -> Option<(&str, usize)> {
    let (doc, page) = id.rsplit_once('_')?;
    Some((doc, page.parse().ok()?))
}

/// A chunk of concatenated document text with its best-matching source page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedChunk {
    pub text: String,
    pub doc_id: String,
    pub page: usize,
}

/// One persisted row of the visual ranking table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisualRow {
    pub q_id: String,
    pub document_id: String,
    pub score: f32,
    pub question: String,
}

/// One persisted row of the textual ranking table. `rank` is 1-based.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextRow {
    pub q_id: String,
    pub question: String,
    pub chunk: String,
    pub chunk_pdf_name: String,
    pub pdf_page_number: usize,
    pub rank: usize,
    pub score: f32,
}

/// A retrieved chunk handed to the textual answer prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextContext {
    pub chunk: String,
    pub chunk_pdf_name: String,
    pub pdf_page_number: usize,
}

/// A retrieved page image handed to the visual answer prompt.
#[derive(Debug, Clone)]
pub struct VisualContext {
    pub image: PageImage,
    pub document_id: String,
    pub page_number: usize,
}

/// Structured answer of one modality, persisted as the modality's completion marker.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModalityResponse {
    #[serde(rename = "Evidence", default)]
    pub evidence: String,
    #[serde(rename = "Chain of Thought", default)]
    pub chain_of_thought: String,
    #[serde(rename = "Answer", default)]
    pub answer: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub document: Vec<String>,
    #[serde(default)]
    pub gt_answer: serde_json::Value,
    #[serde(default)]
    pub pages: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks: Option<String>,
}

/// Final fused answer for a query. `response1` is visual, `response2` textual.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CombinedResponse {
    pub question: String,
    pub answer: String,
    pub gt_answer: serde_json::Value,
    pub analysis: String,
    pub conclusion: String,
    pub response1: ModalityResponse,
    pub response2: ModalityResponse,
}
