pub mod ollama;
pub mod openrouter;
pub mod provider;
pub mod resilient;

pub use ollama::{OllamaHealthStatus, OllamaProvider};
pub use openrouter::OpenRouterProvider;
pub use provider::{EmbeddingError, EmbeddingProvider};
pub use resilient::{ResilientProvider, RetryConfig, is_retryable_error, wrap_resilient, wrap_resilient_arc};
