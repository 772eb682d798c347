//! Input validation for the handful of string shapes the data model
//! constrains: document ids, index names, and tag keys.

use std::fmt;
use thiserror::Error;

/// A validation error with field information
#[derive(Debug, Clone, Error)]
pub struct ValidationError {
  pub field: String,
  pub message: String,
}

impl fmt::Display for ValidationError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.field, self.message)
  }
}

impl ValidationError {
  pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
    Self { field: field.into(), message: message.into() }
  }

  pub fn missing(field: impl Into<String>) -> Self {
    let field = field.into();
    Self { message: format!("{} is required", field), field }
  }
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum length, in characters, of a normalized index name.
pub const MAX_INDEX_NAME_LEN: usize = 128;

/// Characters allowed in a document id without escaping.
const DOCUMENT_ID_CHARS: fn(char) -> bool = |c: char| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-';

/// Validate a document id against the `[A-Za-z0-9._-]+` rule.
pub fn validate_document_id(id: &str) -> ValidationResult<()> {
  if id.is_empty() {
    return Err(ValidationError::missing("documentId"));
  }
  if !id.chars().all(DOCUMENT_ID_CHARS) {
    return Err(ValidationError::new("documentId", "must contain only letters, digits, '.', '_' or '-'"));
  }
  Ok(())
}

/// Validate a tag key: non-empty, no `=` or `:` (reserved as filter separators),
/// and not a reserved `__`-prefixed name unless `allow_reserved` is set.
pub fn validate_tag_key(key: &str, allow_reserved: bool) -> ValidationResult<()> {
  if key.is_empty() {
    return Err(ValidationError::missing("tag key"));
  }
  if key.contains('=') || key.contains(':') {
    return Err(ValidationError::new("tag key", "must not contain '=' or ':'"));
  }
  if !allow_reserved && key.starts_with("__") {
    return Err(ValidationError::new(key, "tag keys beginning with '__' are reserved"));
  }
  Ok(())
}

/// Validate a tag value: no `=` or `:` (the same reserved filter separators
/// enforced on tag keys), since `key=value`/`key:value` filter syntax depends
/// on the value never containing either.
pub fn validate_tag_value(value: &str) -> ValidationResult<()> {
  if value.contains('=') || value.contains(':') {
    return Err(ValidationError::new("tag value", "must not contain '=' or ':'"));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_validate_document_id() {
    assert!(validate_document_id("doc-1.txt").is_ok());
    assert!(validate_document_id("").is_err());
    assert!(validate_document_id("doc/1").is_err());
    assert!(validate_document_id("doc 1").is_err());
  }

  #[test]
  fn test_validate_tag_key() {
    assert!(validate_tag_key("user", false).is_ok());
    assert!(validate_tag_key("__document_id", true).is_ok());
    assert!(validate_tag_key("__document_id", false).is_err());
    assert!(validate_tag_key("a=b", false).is_err());
    assert!(validate_tag_key("", false).is_err());
  }

  #[test]
  fn test_validate_tag_value() {
    assert!(validate_tag_value("alice").is_ok());
    assert!(validate_tag_value("").is_ok());
    assert!(validate_tag_value("a=b").is_err());
    assert!(validate_tag_value("a:b").is_err());
  }

  #[test]
  fn test_validation_error_constructors() {
    let err = ValidationError::missing("content");
    assert!(err.message.contains("is required"));
  }
}
