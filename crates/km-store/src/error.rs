//! Local error type for the document/vector store, collapsed into
//! [`km_core::Error`] at the pipeline-step boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
  #[error("lancedb error: {0}")]
  Lance(#[from] lancedb::Error),

  #[error("arrow error: {0}")]
  Arrow(#[from] arrow_schema::ArrowError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("index not found: {0}")]
  IndexNotFound(String),

  #[error("file not found: {index}/{document_id}/{name}")]
  FileNotFound { index: String, document_id: String, name: String },

  #[error("refused to delete the default index {0:?}")]
  DefaultIndexDeletionRefused(String),

  #[error("vector dimension mismatch: index expects {expected}, got {actual}")]
  DimensionMismatch { expected: usize, actual: usize },

  #[error("null filter value for tag {0:?} is not supported")]
  NullFilterValue(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for km_core::Error {
  fn from(err: StoreError) -> Self {
    match &err {
      StoreError::IndexNotFound(id) => km_core::Error::not_found("index", id.clone()),
      StoreError::FileNotFound { name, .. } => km_core::Error::not_found("file", name.clone()),
      StoreError::DefaultIndexDeletionRefused(_) => km_core::Error::validation(err.to_string()),
      StoreError::DimensionMismatch { .. } => km_core::Error::validation(err.to_string()),
      StoreError::NullFilterValue(_) => km_core::Error::validation(err.to_string()),
      StoreError::Io(_) | StoreError::Lance(_) => km_core::Error::transient(err.to_string()),
      StoreError::Arrow(_) | StoreError::Serialization(_) => km_core::Error::fatal(err.to_string()),
    }
  }
}
