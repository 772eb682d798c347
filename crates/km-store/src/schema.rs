//! Arrow schema for a vector-store index table.
//!
//! Each logical index backs onto its own physical LanceDB table,
//! named after the normalized index name, holding `(id, vector, tags, payload)`.
//! `tags`/`payload` have no native multimap/object column type in Arrow, so
//! both are stored as JSON text.

use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};

pub fn records_schema(vector_dim: usize) -> Arc<Schema> {
  Arc::new(Schema::new(vec![
    Field::new("id", DataType::Utf8, false),
    Field::new("tags", DataType::Utf8, false), // JSON: { key: [value|null, ...] }
    Field::new("payload", DataType::Utf8, false), // JSON object
    Field::new(
      "vector",
      DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), vector_dim as i32),
      true,
    ),
  ]))
}
