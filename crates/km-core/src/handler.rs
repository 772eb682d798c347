//! Step handler contract (C7).
//!
//! A handler is a unit of work keyed by step name. It reads the artifacts the
//! pipeline has accumulated so far, does its work through the [`crate::capability`]
//! traits, and returns an updated pipeline snapshot for the orchestrator to persist.
//! Handlers MUST be idempotent: the orchestrator re-invokes a step on redelivery
//! without assuming anything about how far a prior attempt got.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::capability::{DocStore, Embedder, Generator, VecStore};
use crate::config::Config;
use crate::error::Result;
use crate::pipeline::DataPipeline;

/// Everything a handler needs to do its work, borrowed for the duration of one
/// `invoke` call. Built fresh by the orchestrator for every step execution so
/// handlers never hold state across steps: each re-reads and re-writes
/// `status.json` on every entry/exit.
pub struct HandlerContext<'a> {
  pub docs: &'a dyn DocStore,
  pub vectors: &'a dyn VecStore,
  /// One per configured embedder; `gen_embeddings`/`save_records` fan out
  /// across all of them.
  pub embedders: &'a [Arc<dyn Embedder>],
  /// Present only when the retrieval engine's generator is also wired in as
  /// the `summarize` step's backend; absent disables `summarize`.
  pub generator: Option<&'a dyn Generator>,
  pub config: &'a Config,
  pub cancellation: CancellationToken,
}

#[async_trait]
pub trait StepHandler: Send + Sync {
  /// The step name this handler is registered under (e.g. `"extract"`).
  fn step_name(&self) -> &'static str;

  /// Run this step to completion against `pipeline`, returning the updated
  /// snapshot. Does not itself advance `completed_steps`/`remaining_steps` —
  /// the orchestrator does that once `invoke` returns `Ok`.
  async fn invoke(&self, ctx: &HandlerContext<'_>, pipeline: DataPipeline) -> Result<DataPipeline>;
}
