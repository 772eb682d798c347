//! `DataPipeline` state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::FileDetails;
use crate::tags::TagSet;

/// Current schema version of the persisted `status.json` document. Bumped
/// whenever a field is added or reinterpreted; readers ignore unknown fields
/// regardless, per the backward-compatibility rule for `status.json`.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

pub const STEP_EXTRACT: &str = "extract";
pub const STEP_PARTITION: &str = "partition";
pub const STEP_GEN_EMBEDDINGS: &str = "gen_embeddings";
pub const STEP_SAVE_RECORDS: &str = "save_records";
pub const STEP_DELETE_DOCUMENT: &str = "delete_document";
pub const STEP_DELETE_INDEX: &str = "delete_index";
pub const STEP_SUMMARIZE: &str = "summarize";

/// The default ingestion pipeline.
pub fn default_ingestion_steps() -> Vec<String> {
  vec![
    STEP_EXTRACT.to_string(),
    STEP_PARTITION.to_string(),
    STEP_GEN_EMBEDDINGS.to_string(),
    STEP_SAVE_RECORDS.to_string(),
  ]
}

/// Mutable state object owned by the orchestrator for one `(index, documentId)`.
///
/// Invariant: `steps == completed_steps ++ remaining_steps` and the multiset of
/// their union never changes after construction (see [`DataPipeline::invariant_holds`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPipeline {
  pub completed: bool,
  pub failed: bool,
  /// True for delete pipelines, which carry no source files.
  pub empty: bool,
  pub index: String,
  pub document_id: String,
  pub tags: TagSet,
  pub creation: DateTime<Utc>,
  pub last_update: DateTime<Utc>,
  pub steps: Vec<String>,
  pub remaining_steps: Vec<String>,
  pub completed_steps: Vec<String>,
  pub files: Vec<FileDetails>,
  pub schema_version: u32,
}

impl DataPipeline {
  pub fn new(index: impl Into<String>, document_id: impl Into<String>, tags: TagSet, steps: Vec<String>, files: Vec<FileDetails>, empty: bool) -> Self {
    let now = Utc::now();
    Self {
      completed: false,
      failed: false,
      empty,
      index: index.into(),
      document_id: document_id.into(),
      tags,
      creation: now,
      last_update: now,
      remaining_steps: steps.clone(),
      steps,
      completed_steps: Vec::new(),
      files,
      schema_version: CURRENT_SCHEMA_VERSION,
    }
  }

  pub fn for_deletion(index: impl Into<String>, document_id: impl Into<String>) -> Self {
    Self::new(index, document_id, TagSet::new(), vec![STEP_DELETE_DOCUMENT.to_string()], Vec::new(), true)
  }

  pub fn for_index_deletion(index: impl Into<String>) -> Self {
    Self::new(index, String::new(), TagSet::new(), vec![STEP_DELETE_INDEX.to_string()], Vec::new(), true)
  }

  /// The step about to run, if any steps remain.
  pub fn current_step(&self) -> Option<&str> {
    self.remaining_steps.first().map(String::as_str)
  }

  /// Move the current step from `remaining_steps` to `completed_steps` and
  /// mark the pipeline completed if nothing remains.
  pub fn advance(&mut self) {
    if self.remaining_steps.is_empty() {
      return;
    }
    let step = self.remaining_steps.remove(0);
    self.completed_steps.push(step);
    self.last_update = Utc::now();
    if self.remaining_steps.is_empty() {
      self.completed = true;
    }
  }

  pub fn mark_failed(&mut self) {
    self.failed = true;
    self.last_update = Utc::now();
  }

  pub fn is_ready(&self) -> bool {
    self.completed && !self.empty
  }

  pub fn file(&self, id: &str) -> Option<&FileDetails> {
    self.files.iter().find(|f| f.id == id)
  }

  pub fn file_mut(&mut self, id: &str) -> Option<&mut FileDetails> {
    self.files.iter_mut().find(|f| f.id == id)
  }

  /// `completed_steps` is a prefix of `steps` and their union matches
  ///. Used by tests and by the orchestrator's own
  /// debug assertions.
  pub fn invariant_holds(&self) -> bool {
    if self.completed_steps.len() + self.remaining_steps.len() != self.steps.len() {
      return false;
    }
    self.steps.iter().zip(self.completed_steps.iter().chain(self.remaining_steps.iter())).all(|(a, b)| a == b)
  }
}
