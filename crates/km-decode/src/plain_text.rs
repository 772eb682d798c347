use async_trait::async_trait;

use crate::decoder::ContentDecoder;
use crate::error::Result;

/// Handles anything already text: `text/*` mime types, and `.txt`/`.md`/
/// `.markdown` files whose mime type was left generic by the uploader.
/// Markdown is passed through unrendered; the partitioner treats the raw
/// source as prose, which is sufficient for embedding and retrieval.
pub struct PlainTextDecoder;

#[async_trait]
impl ContentDecoder for PlainTextDecoder {
  fn accepts(&self, mime_type: &str, file_name: &str) -> bool {
    mime_type.starts_with("text/") || has_extension(file_name, &["txt", "md", "markdown"])
  }

  async fn decode(&self, bytes: &[u8]) -> Result<String> {
    Ok(String::from_utf8_lossy(bytes).into_owned())
  }
}

fn has_extension(file_name: &str, extensions: &[&str]) -> bool {
  file_name.rsplit_once('.').map(|(_, ext)| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))).unwrap_or(false)
}
