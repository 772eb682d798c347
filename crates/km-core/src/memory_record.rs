//! `MemoryRecord`: the unit stored in the vector store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tags::TagSet;

/// Stable record id, unique within one index. The `save_records` step derives
/// this from a base64url encoding of the originating partition key so that
/// re-ingesting the same partition upserts rather than duplicates.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Derive a record id from the `(document_id, file_id, partition_number)`
  /// triple that identifies a partition, so the same partition always maps
  /// to the same record id across re-ingestions.
  pub fn from_partition_key(document_id: &str, file_id: &str, partition_number: u32) -> Self {
    use base64::Engine;
    let raw = format!("{document_id}/{file_id}/{partition_number}");
    Self(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw))
  }
}

impl std::fmt::Display for RecordId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// `(vector, tags, payload)` row. Vector dimension is fixed per index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
  pub id: RecordId,
  pub vector: Vec<f32>,
  pub tags: TagSet,
  pub payload: BTreeMap<String, Value>,
}

impl MemoryRecord {
  pub fn new(id: RecordId, vector: Vec<f32>, tags: TagSet) -> Self {
    Self { id, vector, tags, payload: BTreeMap::new() }
  }

  pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.payload.insert(key.into(), value.into());
    self
  }

  pub fn document_id(&self) -> Option<&str> {
    self.tags.get(crate::tags::TAG_DOCUMENT_ID).and_then(|v| v.first()).and_then(|v| v.as_deref())
  }
}
