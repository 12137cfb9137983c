//! Query dataset loading.
//!
//! The dataset is a CSV table with at least `q_id`, `question` and `answer`
//! columns, and optionally `documents` (a serialized list literal such as
//! `['a.pdf', 'b.pdf']`) and `doc_path`.
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::types::normalize_doc_id;

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub q_id: String,
    pub question: String,
    /// Structured when the stored answer parses as a list/dict literal, else the raw string.
    pub answer: serde_json::Value,
    /// Normalized relevant document ids; empty means the whole corpus.
    pub documents: Vec<String>,
    pub doc_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRow {
    q_id: String,
    question: String,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    documents: Option<String>,
    #[serde(default)]
    doc_path: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    queries: Vec<Query>,
}

impl Dataset {
    pub fn new(queries: Vec<Query>) -> Self {
        Self { queries }
    }

    pub fn load_csv(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(format!("dataset file {}", path.display())));
        }
        let mut reader = csv::Reader::from_path(path)?;
        let mut queries = Vec::new();
        for (line, row) in reader.deserialize::<RawRow>().enumerate() {
            let row = row.map_err(|e| Error::Dataset(format!("row {}: {}", line + 1, e)))?;
            queries.push(Query {
                documents: row
                    .documents
                    .as_deref()
                    .map(parse_document_list)
                    .unwrap_or_default(),
                answer: row
                    .answer
                    .as_deref()
                    .map_or(serde_json::Value::Null, parse_answer),
                doc_path: row.doc_path.filter(|p| !p.trim().is_empty()),
                q_id: row.q_id,
                question: row.question,
            });
        }
        info!("Loaded {} queries from {}", queries.len(), path.display());
        Ok(Self { queries })
    }

    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    /// First row with the given id.
    pub fn get(&self, q_id: &str) -> Option<&Query> {
        self.queries.iter().find(|q| q.q_id == q_id)
    }

    /// Distinct query ids in dataset order.
    pub fn unique_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.queries
            .iter()
            .filter(|q| seen.insert(q.q_id.as_str()))
            .map(|q| q.q_id.clone())
            .collect()
    }

    /// Every document id referenced through `documents` or `doc_path`.
    pub fn referenced_documents(&self) -> BTreeSet<String> {
        let mut docs = BTreeSet::new();
        for q in &self.queries {
            docs.extend(q.documents.iter().cloned());
            if let Some(p) = &q.doc_path {
                docs.insert(normalize_doc_id(p));
            }
        }
        docs.retain(|d| !d.is_empty());
        docs
    }
}

/// Parse a serialized list of document names (`['a.pdf', "b"]` or JSON).
/// Malformed input yields an empty list.
pub fn parse_document_list(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    match split_list_literal(trimmed) {
        Some(items) => items
            .iter()
            .map(|s| normalize_doc_id(s))
            .filter(|s| !s.is_empty())
            .collect(),
        None => {
            warn!("Malformed documents field, treating as empty: {}", trimmed);
            Vec::new()
        }
    }
}

/// Parse a stored answer: JSON first, then a Python-style literal, else the raw text.
pub fn parse_answer(raw: &str) -> serde_json::Value {
    let trimmed = raw.trim();
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if v.is_array() || v.is_object() {
            return v;
        }
    }
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        let rewritten = python_literal_to_json(trimmed);
        if let Ok(v) = serde_json::from_str::<serde_json::Value>(&rewritten) {
            return v;
        }
    }
    serde_json::Value::String(raw.to_string())
}

/// Items of a flat list literal of quoted strings. Returns `None` on malformed input.
fn split_list_literal(s: &str) -> Option<Vec<String>> {
    let inner = s.strip_prefix('[')?.strip_suffix(']')?;
    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let Some(quote) = chars.next() else { break };
        if quote != '\'' && quote != '"' {
            return None;
        }
        let mut item = String::new();
        loop {
            match chars.next()? {
                '\\' => item.push(chars.next()?),
                c if c == quote => break,
                c => item.push(c),
            }
        }
        items.push(item);
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            None => break,
            Some(',') => continue,
            Some(_) => return None,
        }
    }
    Some(items)
}

/// Rewrite single-quoted strings and Python keywords into JSON.
fn python_literal_to_json(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut quote: Option<char> = None;
    let mut chars = s.chars();
    let mut word = String::new();
    let flush = |word: &mut String, out: &mut String| {
        match word.as_str() {
            "True" => out.push_str("true"),
            "False" => out.push_str("false"),
            "None" => out.push_str("null"),
            w => out.push_str(w),
        }
        word.clear();
    };
    while let Some(c) = chars.next() {
        match quote {
            Some(q) => match c {
                '\\' => match chars.next() {
                    Some('\'') => out.push('\''),
                    Some(n) => {
                        out.push('\\');
                        out.push(n);
                    }
                    None => {}
                },
                '"' if q == '\'' => out.push_str("\\\""),
                c if c == q => {
                    out.push('"');
                    quote = None;
                }
                c => out.push(c),
            },
            None => {
                if c.is_alphanumeric() || c == '_' {
                    word.push(c);
                    continue;
                }
                flush(&mut word, &mut out);
                if c == '\'' || c == '"' {
                    quote = Some(c);
                    out.push('"');
                } else {
                    out.push(c);
                }
            }
        }
    }
    flush(&mut word, &mut out);
    out
}
