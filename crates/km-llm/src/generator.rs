use async_trait::async_trait;

use crate::{infer, InferenceRequest, Model};

/// [`km_core::Generator`] backed by a local `claude` CLI process.
///
/// This is the reference C5 implementation: any other completion backend
/// (a hosted API, a local model server) would implement the same trait and
/// slot into the retrieval engine without it knowing the difference.
pub struct ClaudeCliGenerator {
  model: Model,
  timeout_secs: u64,
}

impl ClaudeCliGenerator {
  pub fn new(model: Model, timeout_secs: u64) -> Self {
    Self { model, timeout_secs }
  }
}

impl Default for ClaudeCliGenerator {
  fn default() -> Self {
    Self { model: Model::default(), timeout_secs: 120 }
  }
}

#[async_trait]
impl km_core::Generator for ClaudeCliGenerator {
  async fn generate(&self, prompt: &str) -> km_core::Result<String> {
    let request = InferenceRequest::new(prompt).with_model(self.model).with_timeout(self.timeout_secs);
    let response = infer(request).await?;
    Ok(response.text)
  }
}
