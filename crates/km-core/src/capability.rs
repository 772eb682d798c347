//! Small capability traits the orchestrator and step handlers depend on,
//! instead of a deep class hierarchy: tagged unions and small capability
//! sets are preferable to deep hierarchies here. Concrete crates (`km-store`,
//! `km-embedding`, `km-llm`) implement these for their adapter types; handler
//! and orchestrator code only ever sees `&dyn DocStore`, `&dyn VecStore`, etc.

use async_trait::async_trait;

use crate::error::Result;
use crate::memory_record::{MemoryRecord, RecordId};
use crate::retrieval::MemoryFilter;

/// C1 Document Store.
#[async_trait]
pub trait DocStore: Send + Sync {
  async fn create_index_directory(&self, index: &str) -> Result<()>;
  async fn delete_index_directory(&self, index: &str) -> Result<()>;
  async fn create_document_directory(&self, index: &str, document_id: &str) -> Result<()>;
  async fn empty_document_directory(&self, index: &str, document_id: &str) -> Result<()>;
  async fn delete_document_directory(&self, index: &str, document_id: &str) -> Result<()>;
  async fn write_file(&self, index: &str, document_id: &str, name: &str, bytes: &[u8]) -> Result<()>;
  async fn read_file_bytes(&self, index: &str, document_id: &str, name: &str) -> Result<Vec<u8>>;
  async fn list_files(&self, index: &str, document_id: &str) -> Result<Vec<String>>;
}

/// C2 Vector Store.
#[async_trait]
pub trait VecStore: Send + Sync {
  async fn create_index(&self, index: &str, vector_size: usize) -> Result<()>;
  async fn list_indexes(&self) -> Result<Vec<String>>;
  async fn delete_index(&self, index: &str) -> Result<()>;
  async fn upsert(&self, index: &str, record: MemoryRecord) -> Result<RecordId>;
  async fn delete(&self, index: &str, record_id: &RecordId) -> Result<()>;
  async fn delete_by_filter(&self, index: &str, filters: &[MemoryFilter]) -> Result<usize>;
  async fn get_similar_list(&self, index: &str, embedding: &[f32], limit: usize, min_relevance: f32, filters: &[MemoryFilter], with_embeddings: bool) -> Result<Vec<(MemoryRecord, f32)>>;
  async fn get_list(&self, index: &str, filters: &[MemoryFilter], limit: usize, with_embeddings: bool) -> Result<Vec<MemoryRecord>>;
}

/// C4 Embedding Generator.
#[async_trait]
pub trait Embedder: Send + Sync {
  /// Identifies this embedder among the configured fan-out set, and is
  /// recorded on the `TextEmbeddingVector` artifact it produces.
  fn name(&self) -> &str;
  fn dimensions(&self) -> usize;
  async fn embed(&self, text: &str) -> Result<Vec<f32>>;
  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;
}

/// C5 Text Generator, used only by the retrieval engine.
#[async_trait]
pub trait Generator: Send + Sync {
  async fn generate(&self, prompt: &str) -> Result<String>;
}
