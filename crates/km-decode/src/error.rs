use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
  #[error("fetch failed: {0}")]
  Fetch(#[from] reqwest::Error),

  #[error("content is not valid UTF-8: {0}")]
  InvalidUtf8(#[from] std::str::Utf8Error),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

impl From<DecodeError> for km_core::Error {
  fn from(err: DecodeError) -> Self {
    match &err {
      DecodeError::Fetch(_) => km_core::Error::transient(err.to_string()),
      DecodeError::InvalidUtf8(_) => km_core::Error::fatal(err.to_string()),
    }
  }
}
