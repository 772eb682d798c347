//! Vector Store (C2): create/delete indexes, upsert/delete/query memory records.
//!
//! Reference implementation backs onto LanceDB as a simple reference store,
//! one physical table per logical index. `GetSimilarList`'s contract is
//! always cosine similarity in `[-1, 1]`, sorted descending, independent of what
//! the backend natively returns — here that means requesting LanceDB's cosine
//! `DistanceType` and converting its `_distance` column (`1 - similarity`) back.
//!
//! Tag filtering is applied client-side after an over-fetched vector query,
//! a post-filter strategy suited to backends that cannot push multi-valued
//! tag predicates into their native query language (a Cognitive Search-style
//! adapter would need the same over-fetch).

use std::collections::BTreeMap;

use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use serde_json::Value;
use std::sync::Arc;

use km_core::{MemoryFilter, MemoryRecord, RecordId, TagSet};

use crate::connection::VectorDb;
use crate::error::{Result, StoreError};
use crate::schema::records_schema;

/// Multiplier applied to `limit` when over-fetching to compensate for
/// client-side tag filtering. Doubled on each retry up to [`MAX_OVER_FETCH`].
const INITIAL_OVER_FETCH: usize = 4;
const MAX_OVER_FETCH: usize = 64;

pub struct VectorStore {
  db: VectorDb,
  default_index: String,
}

impl VectorStore {
  pub fn new(db: VectorDb, default_index: impl Into<String>) -> Self {
    Self { db, default_index: default_index.into() }
  }

  /// Idempotent: a second call with the same `vector_size` is a no-op; a
  /// mismatched size against an already-created index is rejected.
  pub async fn create_index(&self, index: &str, vector_size: usize) -> Result<()> {
    let existing = self.db.table_names().await?;
    if existing.iter().any(|t| t == index) {
      let existing_dim = self.db.table_vector_dim(index).await?;
      if existing_dim != vector_size {
        return Err(StoreError::DimensionMismatch { expected: existing_dim, actual: vector_size });
      }
      return Ok(());
    }
    self.db.create_table_if_absent(index, vector_size).await
  }

  pub async fn list_indexes(&self) -> Result<Vec<String>> {
    self.db.table_names().await
  }

  /// The default index must not be deleted (see DESIGN.md for the rationale).
  pub async fn delete_index(&self, index: &str) -> Result<()> {
    if index == self.default_index {
      return Err(StoreError::DefaultIndexDeletionRefused(index.to_string()));
    }
    self.db.drop_table(index).await
  }

  /// Create or replace by `record.id` (upsert, implemented as delete-then-insert
  /// since LanceDB's native merge-insert API is awkward for single rows).
  pub async fn upsert(&self, index: &str, record: MemoryRecord) -> Result<RecordId> {
    let table = self.db.open_table(index).await?;
    let id = record.id.clone();
    let _ = table.delete(&format!("id = '{}'", escape(record.id.as_str()))).await;

    let dim = vector_dim_of(&table).await?;
    let batch = record_to_batch(&record, dim)?;
    let batches = RecordBatchIterator::new(vec![Ok(batch)], records_schema(dim));
    table.add(Box::new(batches)).execute().await?;
    Ok(id)
  }

  pub async fn delete(&self, index: &str, record_id: &RecordId) -> Result<()> {
    let table = self.db.open_table(index).await?;
    table.delete(&format!("id = '{}'", escape(record_id.as_str()))).await?;
    Ok(())
  }

  /// Delete every record whose tags satisfy `filters` (used by `delete_document`
  /// to remove everything tagged with a given `__document_id`).
  pub async fn delete_by_filter(&self, index: &str, filters: &[MemoryFilter]) -> Result<usize> {
    let records = self.get_list(index, filters, usize::MAX, false).await?;
    let table = self.db.open_table(index).await?;
    let count = records.len();
    for record in &records {
      table.delete(&format!("id = '{}'", escape(record.id.as_str()))).await?;
    }
    Ok(count)
  }

  /// Nearest-neighbor query with tag filters, returned in descending
  /// similarity order. Records with score `< min_relevance` are excluded.
  /// `with_embeddings` controls whether returned records carry their `vector`
  /// field, or have it cleared to spare the caller the transfer cost.
  pub async fn get_similar_list(
    &self,
    index: &str,
    embedding: &[f32],
    limit: usize,
    min_relevance: f32,
    filters: &[MemoryFilter],
    with_embeddings: bool,
  ) -> Result<Vec<(MemoryRecord, f32)>> {
    let table = self.db.open_table(index).await?;

    let mut over_fetch = INITIAL_OVER_FETCH;
    loop {
      let fetch_limit = limit.saturating_mul(over_fetch).max(limit).min(100_000);
      let query = table
        .vector_search(embedding.to_vec())?
        .distance_type(lancedb::DistanceType::Cosine)
        .limit(fetch_limit);
      let batches: Vec<RecordBatch> = query.execute().await?.try_collect().await?;

      let mut scored: Vec<(MemoryRecord, f32)> = Vec::new();
      for batch in &batches {
        for row in 0..batch.num_rows() {
          let mut record = batch_to_record(batch, row)?;
          let distance = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
            .map(|a| a.value(row))
            .unwrap_or(0.0);
          let similarity = 1.0 - distance;
          if !matches_filters(&record.tags, filters) {
            continue;
          }
          if similarity < min_relevance {
            continue;
          }
          if !with_embeddings {
            record.vector.clear();
          }
          scored.push((record, similarity));
        }
      }

      scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
      scored.truncate(limit);

      let exhausted_table = batches.iter().map(|b| b.num_rows()).sum::<usize>() < fetch_limit;
      if scored.len() >= limit || exhausted_table || over_fetch >= MAX_OVER_FETCH {
        return Ok(scored);
      }
      over_fetch *= 2;
    }
  }

  /// Unordered scan with filter, no similarity scoring. `with_embeddings`
  /// controls whether returned records carry their `vector` field.
  pub async fn get_list(&self, index: &str, filters: &[MemoryFilter], limit: usize, with_embeddings: bool) -> Result<Vec<MemoryRecord>> {
    let table = self.db.open_table(index).await?;
    let batches: Vec<RecordBatch> = table.query().execute().await?.try_collect().await?;

    let mut out = Vec::new();
    for batch in &batches {
      for row in 0..batch.num_rows() {
        let mut record = batch_to_record(batch, row)?;
        if matches_filters(&record.tags, filters) {
          if !with_embeddings {
            record.vector.clear();
          }
          out.push(record);
          if out.len() >= limit {
            return Ok(out);
          }
        }
      }
    }
    Ok(out)
  }
}

#[async_trait::async_trait]
impl km_core::VecStore for VectorStore {
  async fn create_index(&self, index: &str, vector_size: usize) -> km_core::Result<()> {
    Ok(self.create_index(index, vector_size).await?)
  }

  async fn list_indexes(&self) -> km_core::Result<Vec<String>> {
    Ok(self.list_indexes().await?)
  }

  async fn delete_index(&self, index: &str) -> km_core::Result<()> {
    Ok(self.delete_index(index).await?)
  }

  async fn upsert(&self, index: &str, record: MemoryRecord) -> km_core::Result<RecordId> {
    Ok(self.upsert(index, record).await?)
  }

  async fn delete(&self, index: &str, record_id: &RecordId) -> km_core::Result<()> {
    Ok(self.delete(index, record_id).await?)
  }

  async fn delete_by_filter(&self, index: &str, filters: &[MemoryFilter]) -> km_core::Result<usize> {
    Ok(self.delete_by_filter(index, filters).await?)
  }

  async fn get_similar_list(&self, index: &str, embedding: &[f32], limit: usize, min_relevance: f32, filters: &[MemoryFilter], with_embeddings: bool) -> km_core::Result<Vec<(MemoryRecord, f32)>> {
    Ok(self.get_similar_list(index, embedding, limit, min_relevance, filters, with_embeddings).await?)
  }

  async fn get_list(&self, index: &str, filters: &[MemoryFilter], limit: usize, with_embeddings: bool) -> km_core::Result<Vec<MemoryRecord>> {
    Ok(self.get_list(index, filters, limit, with_embeddings).await?)
  }
}

/// `filters` is empty => no filtering. Otherwise ORed across `MemoryFilter`s,
/// each of which ANDs its equals/not-equals predicates.
fn matches_filters(tags: &TagSet, filters: &[MemoryFilter]) -> bool {
  if filters.is_empty() {
    return true;
  }
  filters.iter().any(|filter| {
    filter.equals.iter().all(|p| tags.contains(&p.key, &p.value)) && filter.not_equals.iter().all(|p| !tags.contains(&p.key, &p.value))
  })
}

async fn vector_dim_of(table: &lancedb::Table) -> Result<usize> {
  let schema = table.schema().await?;
  let field = schema.field_with_name("vector").map_err(|_| StoreError::IndexNotFound("vector".to_string()))?;
  match field.data_type() {
    arrow_schema::DataType::FixedSizeList(_, n) => Ok(*n as usize),
    _ => Ok(0),
  }
}

fn escape(s: &str) -> String {
  s.replace('\'', "''")
}

fn record_to_batch(record: &MemoryRecord, dim: usize) -> Result<RecordBatch> {
  let id = StringArray::from(vec![record.id.as_str().to_string()]);
  let tags_json = serde_json::to_string(&record.tags)?;
  let payload_json = serde_json::to_string(&record.payload)?;
  let tags = StringArray::from(vec![tags_json]);
  let payload = StringArray::from(vec![payload_json]);

  let mut vector = record.vector.clone();
  vector.resize(dim, 0.0);
  let values = Float32Array::from(vector);
  let field = Arc::new(arrow_schema::Field::new("item", arrow_schema::DataType::Float32, true));
  let vector_array = FixedSizeListArray::try_new(field, dim as i32, Arc::new(values), None)?;

  Ok(RecordBatch::try_new(
    records_schema(dim),
    vec![Arc::new(id), Arc::new(tags), Arc::new(payload), Arc::new(vector_array)],
  )?)
}

fn batch_to_record(batch: &RecordBatch, row: usize) -> Result<MemoryRecord> {
  let id = column_str(batch, "id", row)?;
  let tags_json = column_str(batch, "tags", row)?;
  let payload_json = column_str(batch, "payload", row)?;
  let tags: TagSet = serde_json::from_str(&tags_json)?;
  let payload: BTreeMap<String, Value> = serde_json::from_str(&payload_json)?;

  let vector = batch
    .column_by_name("vector")
    .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
    .map(|list| {
      let values = list.value(row);
      let floats = values.as_any().downcast_ref::<Float32Array>().expect("vector column is f32");
      floats.values().to_vec()
    })
    .unwrap_or_default();

  Ok(MemoryRecord { id: RecordId::new(id), vector, tags, payload })
}

fn column_str(batch: &RecordBatch, name: &str, row: usize) -> Result<String> {
  Ok(
    batch
      .column_by_name(name)
      .and_then(|c| c.as_any().downcast_ref::<StringArray>())
      .map(|a| a.value(row).to_string())
      .unwrap_or_default(),
  )
}
