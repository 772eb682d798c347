//! Layered configuration for the memory service.
//!
//! Config priority: project-relative (`.kernel-memory/config.toml`) > user
//! (`~/.config/kernel-memory/config.toml`) > built-in defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// Embedding Configuration
// ============================================================================

/// Embedding provider selection (C4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
  #[default]
  Ollama,
  OpenRouter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
  pub provider: EmbeddingProvider,

  /// Model name (e.g., "qwen3-embedding", "openai/text-embedding-3-small").
  pub model: String,

  /// Fixed vector dimension for the model. Changing this for an index that
  /// already has records requires re-embedding (see [`Config::needs_reembedding`]).
  pub dimensions: usize,

  /// Ollama server URL (only used when provider = ollama).
  pub ollama_url: String,

  /// OpenRouter API key. If not set, reads from OPENROUTER_API_KEY env var.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub openrouter_api_key: Option<String>,

  /// Per-call timeout in seconds.
  pub request_timeout_secs: u64,

  /// Greedy batch grouping limits for the gen_embeddings step.
  pub max_batch_size: usize,
  pub max_batch_tokens: usize,
}

impl Default for EmbeddingConfig {
  fn default() -> Self {
    Self {
      provider: EmbeddingProvider::Ollama,
      model: "qwen3-embedding".to_string(),
      dimensions: 4096,
      ollama_url: "http://localhost:11434".to_string(),
      openrouter_api_key: None,
      request_timeout_secs: 60,
      max_batch_size: 64,
      max_batch_tokens: 8192,
    }
  }
}

// ============================================================================
// Chunking Configuration
// ============================================================================

/// Partitioning limits for the `partition` step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
  pub max_tokens_per_paragraph: usize,
  pub overlapping_tokens: usize,
  pub max_tokens_per_line: usize,
}

impl Default for ChunkingConfig {
  fn default() -> Self {
    Self {
      max_tokens_per_paragraph: 1000,
      overlapping_tokens: 100,
      max_tokens_per_line: 300,
    }
  }
}

// ============================================================================
// Queue Configuration
// ============================================================================

/// Retry/poison tuning for the queue (C3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
  /// Delivery attempts before a message is routed to the poison store.
  pub max_delivery_attempts: u32,

  /// Initial visibility timeout in seconds.
  pub visibility_timeout_secs: u64,

  /// Backoff base in milliseconds applied between redeliveries.
  pub retry_backoff_ms: u64,
}

impl Default for QueueConfig {
  fn default() -> Self {
    Self {
      max_delivery_attempts: 20,
      visibility_timeout_secs: 120,
      retry_backoff_ms: 500,
    }
  }
}

// ============================================================================
// Retrieval Configuration
// ============================================================================

/// Defaults for `Search`/`Ask`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
  pub default_limit: usize,
  pub min_relevance: f32,
  /// Token budget for accumulated facts, leaving headroom for the answer.
  pub max_prompt_tokens: usize,
  pub empty_answer: String,
  /// Per-call timeout in seconds for the text generator.
  pub generation_timeout_secs: u64,
}

impl Default for RetrievalConfig {
  fn default() -> Self {
    Self {
      default_limit: 10,
      min_relevance: 0.0,
      max_prompt_tokens: 3000,
      empty_answer: crate::retrieval::DEFAULT_EMPTY_ANSWER.to_string(),
      generation_timeout_secs: 120,
    }
  }
}

// ============================================================================
// Index Naming Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexNamingConfig {
  pub default_index: String,
}

impl Default for IndexNamingConfig {
  fn default() -> Self {
    Self { default_index: crate::index_name::DEFAULT_INDEX_NAME.to_string() }
  }
}

// ============================================================================
// Main Configuration
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  #[serde(default)]
  pub embedding: EmbeddingConfig,

  #[serde(default)]
  pub chunking: ChunkingConfig,

  #[serde(default)]
  pub queue: QueueConfig,

  #[serde(default)]
  pub retrieval: RetrievalConfig,

  #[serde(default)]
  pub index_naming: IndexNamingConfig,
}

impl Config {
  /// Load config for a project, with fallback to user config, falling back
  /// to built-in defaults when neither file exists or parses.
  pub fn load_for_project(project_path: &Path) -> Self {
    let project_config = Self::project_config_path(project_path);
    if project_config.exists()
      && let Ok(content) = std::fs::read_to_string(&project_config)
      && let Ok(config) = toml::from_str(&content)
    {
      return config;
    }

    if let Some(user_config_path) = Self::user_config_path()
      && user_config_path.exists()
      && let Ok(content) = std::fs::read_to_string(&user_config_path)
      && let Ok(config) = toml::from_str(&content)
    {
      return config;
    }

    Self::default()
  }

  pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CONFIG_DIR") {
      return Some(PathBuf::from(path).join("config.toml"));
    }

    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
      return Some(PathBuf::from(path).join("kernel-memory").join("config.toml"));
    }

    dirs::config_dir().map(|p: PathBuf| p.join("kernel-memory").join("config.toml"))
  }

  pub fn project_config_path(project_path: &Path) -> PathBuf {
    project_path.join(".kernel-memory").join("config.toml")
  }

  /// Whether records already stored for this index must be re-embedded
  /// because the configured model's dimension has changed.
  pub fn needs_reembedding(&self, stored_dimensions: usize) -> bool {
    self.embedding.dimensions != stored_dimensions
  }

  /// Generate a default config file as a string, suitable for writing to
  /// [`Config::project_config_path`].
  pub fn generate_template() -> String {
    r#"# Kernel Memory Configuration
# Place in .kernel-memory/config.toml (project) or ~/.config/kernel-memory/config.toml (user)

[embedding]
# Provider: ollama (local) or openrouter (cloud)
provider = "ollama"
model = "qwen3-embedding"
# Embedding dimensions (must match model output).
# WARNING: changing dimensions requires re-embedding all data.
dimensions = 4096
ollama_url = "http://localhost:11434"
# openrouter_api_key = "sk-or-..."
request_timeout_secs = 60
max_batch_size = 64
max_batch_tokens = 8192

[chunking]
max_tokens_per_paragraph = 1000
overlapping_tokens = 100
max_tokens_per_line = 300

[queue]
max_delivery_attempts = 20
visibility_timeout_secs = 120
retry_backoff_ms = 500

[retrieval]
default_limit = 10
min_relevance = 0.0
max_prompt_tokens = 3000
empty_answer = "INFO NOT FOUND"
generation_timeout_secs = 120

[index_naming]
default_index = "default"
"#
    .to_string()
  }
}
