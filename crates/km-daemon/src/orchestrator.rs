//! C6 Pipeline Orchestrator.
//!
//! Owns the capability implementations, the registered step handlers, and the
//! per-`(index, documentId)` lock that keeps one pipeline single-threaded
//! while letting unrelated documents run fully in parallel. Mirrors
//! the keyed-mutex pattern `km_store::DocumentStore` already uses for file
//! writes, applied here one level up at the pipeline-step granularity.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;

use km_core::{content_hash, dedupe_file_names, Config, DataPipeline, DocStore, DocumentId, Embedder, Error, FileDetails, Generator, HandlerContext, Result, StepHandler, TagSet, UploadFile, VecStore};

use crate::queue::{PipelineMessage, Queue};

const STATUS_FILE: &str = "status.json";

/// A document upload as the orchestrator's caller presents it.
pub struct UploadRequest {
  pub document_id: Option<String>,
  pub tags: TagSet,
  pub files: Vec<UploadFile>,
  /// Overrides the default ingestion chain; primarily for tests that want to
  /// exercise a single step in isolation.
  pub steps: Option<Vec<String>>,
}

/// Whether newly imported/deleted pipelines run to completion inline, or get
/// handed to the queue for a background worker loop to drive: the daemon
/// may run steps inline for low-latency local use, or hand work to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
  InProcess,
  Queued,
}

/// Outcome of driving a pipeline through exactly one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
  /// The step ran and the pipeline is not yet done; more steps remain.
  Advanced,
  /// The step ran and no steps remain.
  Completed,
  /// The step handler reported a retryable (transient) failure; the caller
  /// should redeliver later rather than treat this as an error.
  RetryLater,
  /// The step handler reported a non-retryable failure; the pipeline is
  /// marked failed and persisted.
  Failed,
}

#[derive(Default)]
struct DocumentLocks {
  locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DocumentLocks {
  fn get(&self, key: &str) -> Arc<Mutex<()>> {
    let mut locks = self.locks.lock().unwrap();
    locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
  }
}

pub struct Orchestrator {
  docs: Arc<dyn DocStore>,
  vectors: Arc<dyn VecStore>,
  embedders: Vec<Arc<dyn Embedder>>,
  generator: Option<Arc<dyn Generator>>,
  config: Config,
  handlers: HashMap<&'static str, Box<dyn StepHandler>>,
  locks: DocumentLocks,
  queue: Arc<Queue>,
  mode: ExecutionMode,
}

impl Orchestrator {
  pub fn new(
    docs: Arc<dyn DocStore>,
    vectors: Arc<dyn VecStore>,
    embedders: Vec<Arc<dyn Embedder>>,
    generator: Option<Arc<dyn Generator>>,
    config: Config,
    handlers: Vec<Box<dyn StepHandler>>,
    queue: Arc<Queue>,
    mode: ExecutionMode,
  ) -> Self {
    let handlers = handlers.into_iter().map(|h| (h.step_name(), h)).collect();
    Self { docs, vectors, embedders, generator, config, handlers, locks: DocumentLocks::default(), queue, mode }
  }

  fn lock_key(index: &str, document_id: &str) -> String {
    format!("{index}/{document_id}")
  }

  async fn persist(&self, pipeline: &DataPipeline) -> Result<()> {
    let bytes = serde_json::to_vec(pipeline)?;
    self.docs.write_file(&pipeline.index, &pipeline.document_id, STATUS_FILE, &bytes).await
  }

  async fn read_status(&self, index: &str, document_id: &str) -> Result<DataPipeline> {
    let bytes = self.docs.read_file_bytes(index, document_id, STATUS_FILE).await?;
    serde_json::from_slice(&bytes).map_err(|e| Error::fatal(format!("corrupt status.json for {index}/{document_id}: {e}")))
  }

  /// Ingest a new document: write its files, build a fresh pipeline, persist
  /// `status.json`, and hand it off per `self.mode`.
  /// Returns the assigned document id.
  pub async fn import_document(&self, index: &str, request: UploadRequest) -> Result<String> {
    let index = km_core::normalize_index_name(index);

    let document_id = match request.document_id {
      Some(id) => DocumentId::parse(id)?.to_string(),
      None => uuid::Uuid::new_v4().to_string(),
    };

    self.docs.create_document_directory(&index, &document_id).await?;

    let deduped = dedupe_file_names(request.files);
    let mut files = Vec::with_capacity(deduped.len());
    for upload in deduped {
      self.docs.write_file(&index, &document_id, &upload.name, &upload.bytes).await?;
      let mime_type = guess_upload_mime(&upload.name);
      let hash = content_hash(&upload.bytes);
      // File id is derived from (index, documentId, name) rather than randomly
      // generated, so re-uploading the same document/file pair reproduces the
      // same file id — and therefore the same partition and record ids, so
      // `save_records`' upsert replaces stale records instead of accumulating
      // them alongside the new ones.
      let file_id = content_hash(format!("{index}/{document_id}/{}", upload.name).as_bytes());
      files.push(FileDetails::new(file_id, upload.name, upload.bytes.len() as u64, mime_type, hash));
    }

    let steps = request.steps.unwrap_or_else(km_core::default_ingestion_steps);
    let pipeline = DataPipeline::new(index.clone(), document_id.clone(), request.tags, steps, files, false);
    self.persist(&pipeline).await?;

    tracing::info!(index = %pipeline.index, document_id = %pipeline.document_id, "document imported");
    self.dispatch(&pipeline).await?;
    Ok(document_id)
  }

  /// Begin tearing down one document.
  pub async fn start_document_deletion(&self, index: &str, document_id: &str) -> Result<()> {
    let index = km_core::normalize_index_name(index);
    let pipeline = DataPipeline::for_deletion(index, document_id);
    self.persist(&pipeline).await?;
    self.dispatch(&pipeline).await
  }

  /// Begin tearing down a whole index.
  pub async fn start_index_deletion(&self, index: &str) -> Result<()> {
    let index = km_core::normalize_index_name(index);
    let document_id = format!("__delete_index_{}", uuid::Uuid::new_v4());
    let mut pipeline = DataPipeline::for_index_deletion(index);
    pipeline.document_id = document_id;
    self.docs.create_document_directory(&pipeline.index, &pipeline.document_id).await?;
    self.persist(&pipeline).await?;
    self.dispatch(&pipeline).await
  }

  /// Whether `(index, documentId)`'s pipeline has completed and is not a
  /// deletion pipeline.
  pub async fn is_document_ready(&self, index: &str, document_id: &str) -> Result<bool> {
    let index = km_core::normalize_index_name(index);
    match self.read_status(&index, document_id).await {
      Ok(pipeline) => Ok(pipeline.is_ready()),
      Err(e) if e.kind() == km_core::ErrorKind::NotFound => Ok(false),
      Err(e) => Err(e),
    }
  }

  /// Read the full pipeline status for `(index, documentId)`.
  pub async fn read_pipeline_summary(&self, index: &str, document_id: &str) -> Result<DataPipeline> {
    let index = km_core::normalize_index_name(index);
    self.read_status(&index, document_id).await
  }

  /// Hand a freshly-persisted pipeline off for execution, per `self.mode`.
  async fn dispatch(&self, pipeline: &DataPipeline) -> Result<()> {
    match self.mode {
      ExecutionMode::InProcess => self.run_to_completion(&pipeline.index, &pipeline.document_id).await,
      ExecutionMode::Queued => {
        let message = PipelineMessage::new(pipeline.index.clone(), pipeline.document_id.clone());
        self.queue.enqueue("pipelines", message.to_bytes(), None).await;
        Ok(())
      }
    }
  }

  /// Run one step of `(index, documentId)`'s pipeline to completion: reads
  /// `status.json`, takes the per-document lock, executes the current step's
  /// handler, advances and persists on success. Handler failures are reported
  /// through the return value rather than propagated as `Err`, so that a
  /// single failing document never aborts a caller driving many pipelines.
  pub async fn step_cycle(&self, index: &str, document_id: &str) -> Result<StepOutcome> {
    let lock = self.locks.get(&Self::lock_key(index, document_id));
    let _guard = lock.lock().await;

    let mut pipeline = self.read_status(index, document_id).await?;
    if pipeline.completed || pipeline.failed {
      return Ok(StepOutcome::Completed);
    }

    let Some(step_name) = pipeline.current_step().map(str::to_string) else {
      return Ok(StepOutcome::Completed);
    };

    let Some(handler) = self.handlers.get(step_name.as_str()) else {
      pipeline.mark_failed();
      self.persist(&pipeline).await?;
      tracing::error!(index, document_id, step = %step_name, "no handler registered for step");
      return Ok(StepOutcome::Failed);
    };

    let embedders = self.embedders.clone();
    let ctx = HandlerContext {
      docs: self.docs.as_ref(),
      vectors: self.vectors.as_ref(),
      embedders: &embedders,
      generator: self.generator.as_deref(),
      config: &self.config,
      cancellation: CancellationToken::new(),
    };

    match handler.invoke(&ctx, pipeline.clone()).await {
      Ok(mut updated) => {
        updated.advance();
        self.persist(&updated).await?;
        tracing::debug!(index, document_id, step = %step_name, completed = updated.completed, "step advanced");
        Ok(if updated.completed { StepOutcome::Completed } else { StepOutcome::Advanced })
      }
      Err(e) if e.is_retryable() => {
        tracing::warn!(index, document_id, step = %step_name, error = %e, "step failed transiently, will retry");
        Ok(StepOutcome::RetryLater)
      }
      Err(e) => {
        pipeline.mark_failed();
        self.persist(&pipeline).await?;
        tracing::error!(index, document_id, step = %step_name, error = %e, "step failed fatally");
        Ok(StepOutcome::Failed)
      }
    }
  }

  /// Drive `(index, documentId)` through every remaining step inline, with a
  /// bounded retry/backoff loop on transient failures (used by
  /// [`ExecutionMode::InProcess`] and by tests).
  pub async fn run_to_completion(&self, index: &str, document_id: &str) -> Result<()> {
    let mut attempts: u32 = 0;
    loop {
      match self.step_cycle(index, document_id).await? {
        StepOutcome::Advanced => {
          attempts = 0;
        }
        StepOutcome::Completed | StepOutcome::Failed => return Ok(()),
        StepOutcome::RetryLater => {
          attempts += 1;
          if attempts >= self.config.queue.max_delivery_attempts {
            return Err(Error::Poisoned(format!("{index}/{document_id}")));
          }
          let backoff = self.config.queue.retry_backoff_ms.saturating_mul(attempts as u64);
          tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
        }
      }
    }
  }

  /// Background worker loop for [`ExecutionMode::Queued`]: pulls
  /// [`PipelineMessage`]s off the `"pipelines"` queue and drives one step per
  /// delivery, ack'ing on progress and nack'ing on a transient failure so the
  /// queue's own backoff/poison bookkeeping applies. Uses a `tokio::select!`
  /// over the delivery future and a broadcast shutdown channel.
  pub async fn run_worker_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
    loop {
      tokio::select! {
        _ = shutdown.recv() => {
          tracing::info!("pipeline worker loop shutting down");
          return;
        }
        delivery = self.queue.dequeue("pipelines") => {
          let Some(delivery) = delivery else {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            continue;
          };

          let message = match PipelineMessage::from_bytes(&delivery.payload) {
            Ok(message) => message,
            Err(e) => {
              tracing::error!(error = %e, "dropping unparseable pipeline message");
              self.queue.nack("pipelines", delivery.delivery_id).await;
              continue;
            }
          };

          match self.step_cycle(&message.index, &message.document_id).await {
            Ok(StepOutcome::Advanced) => {
              self.queue.ack("pipelines", delivery.delivery_id).await;
              self.queue.enqueue("pipelines", message.to_bytes(), None).await;
            }
            Ok(StepOutcome::Completed | StepOutcome::Failed) => {
              self.queue.ack("pipelines", delivery.delivery_id).await;
            }
            Ok(StepOutcome::RetryLater) => {
              let poisoned = self.queue.nack("pipelines", delivery.delivery_id).await;
              if poisoned {
                tracing::error!(index = %message.index, document_id = %message.document_id, "pipeline poisoned after exhausting delivery attempts");
              }
            }
            Err(e) => {
              tracing::error!(index = %message.index, document_id = %message.document_id, error = %e, "step_cycle errored outside the handler taxonomy");
              self.queue.nack("pipelines", delivery.delivery_id).await;
            }
          }
        }
      }
    }
  }
}

fn guess_upload_mime(name: &str) -> String {
  match std::path::Path::new(name).extension().and_then(|e| e.to_str()) {
    Some("txt") => "text/plain",
    Some("md") => "text/markdown",
    Some("json") => "application/json",
    Some("url") => "text/x-uri",
    Some("html") | Some("htm") => "text/html",
    Some("pdf") => "application/pdf",
    _ => "application/octet-stream",
  }
  .to_string()
}
