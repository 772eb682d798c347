//! Error taxonomy shared across the workspace.
//!
//! Every crate defines its own local error type (`km_store::StoreError`,
//! `km_embedding::EmbeddingError`, ...) for the failure modes specific to that
//! concern; this module is the five-kind taxonomy those local errors collapse into
//! at the pipeline-step boundary, where it decides retry vs. fail-fast.

use thiserror::Error;

/// The kind of failure, independent of which component raised it.
///
/// `Transient` is retried by the queue up to the poison threshold; `Fatal` marks
/// the owning pipeline failed with no retry; `NotFound` is converted to an empty
/// result wherever that is semantically valid (e.g. `is_document_ready`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Validation,
  NotFound,
  Transient,
  Fatal,
  Poisoned,
}

#[derive(Error, Debug)]
pub enum Error {
  #[error("validation: {0}")]
  Validation(String),

  #[error("not found: {entity} {id}")]
  NotFound { entity: &'static str, id: String },

  #[error("transient: {0}")]
  Transient(String),

  #[error("fatal: {0}")]
  Fatal(String),

  #[error("poisoned: delivery attempts exhausted for {0}")]
  Poisoned(String),

  #[error("io: {0}")]
  Io(#[from] std::io::Error),

  #[error("serialization: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Error::Validation(_) => ErrorKind::Validation,
      Error::NotFound { .. } => ErrorKind::NotFound,
      Error::Transient(_) => ErrorKind::Transient,
      Error::Fatal(_) => ErrorKind::Fatal,
      Error::Poisoned(_) => ErrorKind::Poisoned,
      Error::Io(_) => ErrorKind::Transient,
      Error::Serialization(_) => ErrorKind::Fatal,
    }
  }

  /// Whether the queue should redeliver a step that failed with this error.
  pub fn is_retryable(&self) -> bool {
    matches!(self.kind(), ErrorKind::Transient)
  }

  pub fn validation(msg: impl Into<String>) -> Self {
    Error::Validation(msg.into())
  }

  pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
    Error::NotFound { entity, id: id.into() }
  }

  pub fn transient(msg: impl Into<String>) -> Self {
    Error::Transient(msg.into())
  }

  pub fn fatal(msg: impl Into<String>) -> Self {
    Error::Fatal(msg.into())
  }
}

pub type Result<T> = std::result::Result<T, Error>;
