use async_trait::async_trait;

use crate::error::Result;

/// Converts the raw bytes of one uploaded file into plain text ready for
/// partitioning. Selection happens by mime type or file extension.
#[async_trait]
pub trait ContentDecoder: Send + Sync {
  /// Whether this decoder should handle a file with the given mime type
  /// and name. Decoders are tried in registration order; the first match wins.
  fn accepts(&self, mime_type: &str, file_name: &str) -> bool;

  async fn decode(&self, bytes: &[u8]) -> Result<String>;
}
