pub mod bm25;
pub mod tantivy_utils;

pub use bm25::Bm25Ranker;
