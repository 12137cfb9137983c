use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const CHUNK_COLUMN: &str = "chunk";
pub const VECTOR_COLUMN: &str = "vector";
pub const DISTANCE_COLUMN: &str = "_distance";

/// One row per chunk: its position in the fitted corpus and its embedding.
pub fn build_chunk_schema(dim: i32) -> Arc<Schema> {
    let item = Arc::new(Field::new("item", DataType::Float32, true));
    Arc::new(Schema::new(vec![
        Field::new(CHUNK_COLUMN, DataType::Int32, false),
        Field::new(VECTOR_COLUMN, DataType::FixedSizeList(item, dim), true),
    ]))
}
