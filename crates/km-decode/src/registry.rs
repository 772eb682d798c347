use crate::decoder::ContentDecoder;
use crate::plain_text::PlainTextDecoder;
use crate::url::UrlDecoder;

/// Ordered set of decoders tried against each file's mime type and name.
/// Construct with [`DecoderRegistry::with_defaults`] for the reference set,
/// or [`DecoderRegistry::new`] to register a custom set.
pub struct DecoderRegistry {
  decoders: Vec<Box<dyn ContentDecoder>>,
}

impl DecoderRegistry {
  pub fn new() -> Self {
    Self { decoders: Vec::new() }
  }

  pub fn with_defaults() -> Self {
    let mut registry = Self::new();
    registry.register(Box::new(UrlDecoder::new()));
    registry.register(Box::new(PlainTextDecoder));
    registry
  }

  pub fn register(&mut self, decoder: Box<dyn ContentDecoder>) {
    self.decoders.push(decoder);
  }

  pub fn select(&self, mime_type: &str, file_name: &str) -> Option<&dyn ContentDecoder> {
    self.decoders.iter().find(|d| d.accepts(mime_type, file_name)).map(|d| d.as_ref())
  }
}

impl Default for DecoderRegistry {
  fn default() -> Self {
    Self::with_defaults()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn selects_url_decoder_for_content_url() {
    let registry = DecoderRegistry::with_defaults();
    assert!(registry.select("text/plain", "content.url").is_some());
  }

  #[test]
  fn selects_plain_text_decoder_for_txt() {
    let registry = DecoderRegistry::with_defaults();
    assert!(registry.select("text/plain", "notes.txt").is_some());
  }

  #[test]
  fn returns_none_for_unknown_mime() {
    let registry = DecoderRegistry::with_defaults();
    assert!(registry.select("application/octet-stream", "photo.png").is_none());
  }
}
