use async_trait::async_trait;

use crate::decoder::ContentDecoder;
use crate::error::Result;

/// Handles `content.url` uploads: content uploaded via a URL is
/// materialized to a file named `content.url` whose body is the absolute URL
/// string"). The file's bytes ARE the URL, not the fetched content; this
/// decoder fetches it and extracts the body as text.
pub struct UrlDecoder {
  client: reqwest::Client,
}

impl UrlDecoder {
  pub fn new() -> Self {
    Self { client: reqwest::Client::new() }
  }
}

impl Default for UrlDecoder {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl ContentDecoder for UrlDecoder {
  fn accepts(&self, _mime_type: &str, file_name: &str) -> bool {
    file_name == "content.url"
  }

  async fn decode(&self, bytes: &[u8]) -> Result<String> {
    let url = std::str::from_utf8(bytes)?.trim();
    let response = self.client.get(url).send().await?;
    let text = response.text().await?;
    Ok(text)
  }
}
