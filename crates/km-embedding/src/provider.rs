use async_trait::async_trait;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
  fn name(&self) -> &str;
  fn model_id(&self) -> &str;
  fn dimensions(&self) -> usize;

  async fn embed(&self, text: &str) -> Result<Vec<f32>, crate::EmbeddingError>;
  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, crate::EmbeddingError>;
  async fn is_available(&self) -> bool;
}

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
  #[error("Provider not available")]
  NotAvailable,
  #[error("Request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("Provider error: {0}")]
  ProviderError(String),
  #[error("Network error: {0}")]
  Network(String),
  #[error("Request timed out")]
  Timeout,
}

impl From<EmbeddingError> for km_core::Error {
  fn from(err: EmbeddingError) -> Self {
    match &err {
      EmbeddingError::NotAvailable | EmbeddingError::Network(_) | EmbeddingError::Timeout | EmbeddingError::Request(_) => km_core::Error::transient(err.to_string()),
      EmbeddingError::ProviderError(_) => km_core::Error::fatal(err.to_string()),
    }
  }
}

/// Bridges a concrete [`EmbeddingProvider`] to the `km_core::Embedder`
/// capability trait the orchestrator and step handlers depend on. One
/// `impl` per local adapter type, since a
/// blanket impl over a bare generic parameter would violate the orphan rules
/// for `km_core::Embedder`, which is foreign to this crate.
macro_rules! impl_km_embedder {
  ($ty:ty) => {
    #[async_trait]
    impl km_core::Embedder for $ty {
      fn name(&self) -> &str {
        EmbeddingProvider::name(self)
      }

      fn dimensions(&self) -> usize {
        EmbeddingProvider::dimensions(self)
      }

      async fn embed(&self, text: &str) -> km_core::Result<Vec<f32>> {
        Ok(EmbeddingProvider::embed(self, text).await?)
      }

      async fn embed_batch(&self, texts: &[&str]) -> km_core::Result<Vec<Vec<f32>>> {
        Ok(EmbeddingProvider::embed_batch(self, texts).await?)
      }
    }
  };
}

impl_km_embedder!(crate::ollama::OllamaProvider);
impl_km_embedder!(crate::openrouter::OpenRouterProvider);
impl_km_embedder!(crate::resilient::ResilientProvider<crate::ollama::OllamaProvider>);
impl_km_embedder!(crate::resilient::ResilientProvider<crate::openrouter::OpenRouterProvider>);
