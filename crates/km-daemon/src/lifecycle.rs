//! Daemon process lifecycle: wires the concrete storage, embedding and
//! generation backends into an [`Orchestrator`], [`Queue`], [`RetrievalEngine`]
//! and [`Scheduler`], and owns the background tasks that keep them running.
//!
//! This service has no IPC surface of its own (the embedded-client facade is
//! out of scope), so `run()` is reduced to standing up the background workers
//! and waiting on a shutdown signal via `tokio::signal::ctrl_c()` plus a
//! `broadcast` shutdown channel.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

use km_core::{Config, DocStore, Embedder, EmbeddingProvider as ConfigEmbeddingProvider, Generator, StepHandler, VecStore};
use km_embedding::{wrap_resilient, OllamaProvider, OpenRouterProvider};
use km_llm::ClaudeCliGenerator;
use km_store::{DocumentStore, VectorDb, VectorStore};

use crate::orchestrator::{ExecutionMode, Orchestrator};
use crate::queue::Queue;
use crate::retrieval::RetrievalEngine;
use crate::scheduler::{spawn_scheduler_with_config, SchedulerConfig};

#[derive(Debug, Error)]
pub enum LifecycleError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("storage error: {0}")]
  Store(#[from] km_store::StoreError),
  #[error("service error: {0}")]
  Core(#[from] km_core::Error),
}

/// Daemon configuration: operational parameters only, no embedded-client
/// transport fields, since that facade is out of scope here.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
  /// Directory documents and the vector store are persisted under.
  pub data_dir: PathBuf,
  /// Whether pipelines run inline on the caller's task or are handed to the
  /// queue for the background worker loop to drive.
  pub execution_mode: ExecutionMode,
  /// Core service configuration (embedding, chunking, queue, retrieval).
  pub config: Config,
}

impl Default for DaemonConfig {
  fn default() -> Self {
    Self { data_dir: default_data_dir(), execution_mode: ExecutionMode::Queued, config: Config::default() }
  }
}

/// `$XDG_DATA_HOME/kernel-memory`, falling back to `~/.local/share/kernel-memory`.
pub fn default_data_dir() -> PathBuf {
  if let Ok(path) = std::env::var("XDG_DATA_HOME") {
    return PathBuf::from(path).join("kernel-memory");
  }
  dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("kernel-memory")
}

/// Build the embedding backend named by `config.embedding.provider`, wrapped
/// in the resilient retry/backoff layer, since embedding calls must be
/// retried with backoff. Falls back to Ollama with a warning if OpenRouter
/// is selected but no API key is configured.
fn build_embedder(config: &km_core::EmbeddingConfig) -> Arc<dyn Embedder> {
  match config.provider {
    ConfigEmbeddingProvider::Ollama => {
      let provider = OllamaProvider::new().with_url(&config.ollama_url).with_model(&config.model, config.dimensions);
      Arc::new(wrap_resilient(provider))
    }
    ConfigEmbeddingProvider::OpenRouter => {
      let api_key = config.openrouter_api_key.clone().or_else(|| std::env::var("OPENROUTER_API_KEY").ok()).unwrap_or_default();

      if api_key.is_empty() {
        warn!("OpenRouter API key not configured, falling back to Ollama");
        let provider = OllamaProvider::new().with_url(&config.ollama_url).with_model(&config.model, config.dimensions);
        Arc::new(wrap_resilient(provider))
      } else {
        let provider = OpenRouterProvider::new(api_key).with_model(&config.model, config.dimensions);
        Arc::new(wrap_resilient(provider))
      }
    }
  }
}

/// Every step handler the orchestrator may dispatch to: the default ingestion
/// chain plus the two teardown handlers, which are not part of
/// [`km_index::ingestion_handlers`] since they never run as part of an import.
fn all_handlers() -> Vec<Box<dyn StepHandler>> {
  let mut handlers = km_index::ingestion_handlers();
  handlers.push(Box::new(km_index::DeleteDocumentHandler));
  handlers.push(Box::new(km_index::DeleteIndexHandler));
  handlers
}

/// Owns the long-running pieces of the service: the orchestrator (and, in
/// [`ExecutionMode::Queued`], its worker loop), the retrieval engine, and the
/// sweep scheduler. `Daemon` is the thing a host binary (e.g. `km-cli`'s
/// `serve` command) constructs once and keeps alive for the process lifetime.
pub struct Daemon {
  config: DaemonConfig,
  orchestrator: Arc<Orchestrator>,
  retrieval: Arc<RetrievalEngine>,
  queue: Arc<Queue>,
  shutdown_tx: broadcast::Sender<()>,
}

impl Daemon {
  /// Construct every capability implementation and wire them into an
  /// [`Orchestrator`] and [`RetrievalEngine`], opening the vector store at
  /// `config.data_dir`.
  pub async fn new(config: DaemonConfig) -> Result<Self, LifecycleError> {
    info!(data_dir = %config.data_dir.display(), mode = ?config.execution_mode, "starting kernel-memory daemon");

    std::fs::create_dir_all(&config.data_dir)?;

    let docs: Arc<dyn DocStore> = Arc::new(DocumentStore::new(config.data_dir.join("docs")));
    let vector_db = VectorDb::open(&config.data_dir.join("vectors.lance")).await?;
    let vectors: Arc<dyn VecStore> = Arc::new(VectorStore::new(vector_db, config.config.index_naming.default_index.clone()));

    let embedder = build_embedder(&config.config.embedding);
    if embedder.is_available().await {
      info!(embedder = embedder.name(), "embedding provider available");
    } else {
      warn!(embedder = embedder.name(), "embedding provider unavailable, ingestion will fail until it recovers");
    }

    let generator: Option<Arc<dyn Generator>> = Some(Arc::new(ClaudeCliGenerator::new(km_llm::Model::default(), config.config.retrieval.generation_timeout_secs)));

    let queue = Arc::new(Queue::new(config.config.queue.clone()));

    let orchestrator = Arc::new(Orchestrator::new(
      docs.clone(),
      vectors.clone(),
      vec![embedder.clone()],
      generator.clone(),
      config.config.clone(),
      all_handlers(),
      queue.clone(),
      config.execution_mode,
    ));

    let retrieval = Arc::new(RetrievalEngine::new(docs, vectors, embedder, generator, config.config.retrieval.clone()));

    let (shutdown_tx, _) = broadcast::channel(4);

    Ok(Self { config, orchestrator, retrieval, queue, shutdown_tx })
  }

  pub fn orchestrator(&self) -> Arc<Orchestrator> {
    self.orchestrator.clone()
  }

  pub fn retrieval(&self) -> Arc<RetrievalEngine> {
    self.retrieval.clone()
  }

  /// Run the background workers (the queue worker loop when queued, plus the
  /// sweep scheduler) until a shutdown signal arrives: spawn background tasks,
  /// wire `ctrl_c` to the shared broadcast channel, then wait for everything
  /// to wind down.
  pub async fn run(&self) -> Result<(), LifecycleError> {
    let scheduler_handle = spawn_scheduler_with_config(self.queue.clone(), self.shutdown_tx.subscribe(), SchedulerConfig::default());

    let worker_handle = if self.config.execution_mode == ExecutionMode::Queued {
      let orchestrator = self.orchestrator.clone();
      let shutdown_rx = self.shutdown_tx.subscribe();
      Some(tokio::spawn(async move {
        orchestrator.run_worker_loop(shutdown_rx).await;
      }))
    } else {
      None
    };

    let shutdown_tx = self.shutdown_tx.clone();
    tokio::spawn(async move {
      if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        return;
      }
      info!("received ctrl-c, shutting down");
      let _ = shutdown_tx.send(());
    });

    let _ = scheduler_handle.await;
    if let Some(handle) = worker_handle {
      let _ = handle.await;
    }

    info!("daemon shutdown complete");
    Ok(())
  }

  /// Trigger shutdown of the background workers without waiting for `ctrl_c`.
  pub fn shutdown(&self) {
    let _ = self.shutdown_tx.send(());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn default_config_uses_queued_execution() {
    let config = DaemonConfig::default();
    assert_eq!(config.execution_mode, ExecutionMode::Queued);
  }

  #[tokio::test]
  async fn daemon_new_provisions_storage_under_data_dir() {
    let temp = TempDir::new().unwrap();
    let config = DaemonConfig { data_dir: temp.path().to_path_buf(), execution_mode: ExecutionMode::InProcess, config: Config::default() };

    let daemon = Daemon::new(config).await.unwrap();
    assert!(temp.path().join("docs").exists());
    let _ = daemon.orchestrator();
    let _ = daemon.retrieval();
  }
}
