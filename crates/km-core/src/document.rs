//! Document and per-file artifact model.
//!
//! A `Document` is the unit of ingestion the orchestrator drives through a
//! [`crate::pipeline::DataPipeline`]. `FileDetails`/`GeneratedFileDetails` track every
//! artifact (extracted text, partitions, embeddings, summaries) produced along the way
//! as a `generatedFiles`-style derived-artifact map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tags::TagSet;
use crate::validation::validate_document_id;

/// Client-supplied or auto-generated document identifier, `[A-Za-z0-9._-]+`.
///
/// Unlike a UUID newtype this wraps a plain string: ids are frequently chosen
/// by the caller (a filename, an external record id) and must round-trip
/// through `status.json` unchanged.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
  pub fn parse(raw: impl Into<String>) -> Result<Self> {
    let raw = raw.into();
    validate_document_id(&raw).map_err(|e| Error::validation(e.to_string()))?;
    Ok(Self(raw))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for DocumentId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl std::str::FromStr for DocumentId {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    Self::parse(s)
  }
}

/// Kind of artifact a file represents at a point in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArtifactType {
  Undefined,
  ExtractedContent,
  TextPartition,
  SyntheticData,
  TextEmbeddingVector,
  TextSummarization,
}

impl Default for ArtifactType {
  fn default() -> Self {
    ArtifactType::Undefined
  }
}

/// An artifact derived from an input file: an extracted-text file, a partition,
/// an embedding vector file, or a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedFileDetails {
  pub id: String,
  pub name: String,
  pub size: u64,
  pub mime_type: String,
  pub artifact_type: ArtifactType,
  /// File id of the input file this was derived from.
  pub parent_id: String,
  /// Sequence number within the parent (partition index).
  pub partition_number: Option<u32>,
  /// Page/slide/scene number for multi-section sources.
  pub section_number: Option<u32>,
  /// SHA-256 of the artifact's bytes, used to detect unchanged re-ingestion.
  pub content_hash: String,
  /// Name of the embedder that produced this artifact. Only set on
  /// `TextEmbeddingVector` artifacts, which identify both their source
  /// partition (`parent_id`) and embedder.
  #[serde(default)]
  pub embedder: Option<String>,
}

/// One input file attached to a document, plus every artifact derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDetails {
  pub id: String,
  pub name: String,
  pub size: u64,
  pub mime_type: String,
  pub artifact_type: ArtifactType,
  pub generated_files: BTreeMap<String, GeneratedFileDetails>,
  pub content_hash: String,
}

impl FileDetails {
  pub fn new(id: impl Into<String>, name: impl Into<String>, size: u64, mime_type: impl Into<String>, content_hash: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      name: name.into(),
      size,
      mime_type: mime_type.into(),
      artifact_type: ArtifactType::Undefined,
      generated_files: BTreeMap::new(),
      content_hash: content_hash.into(),
    }
  }

  pub fn add_generated(&mut self, file: GeneratedFileDetails) {
    self.generated_files.insert(file.name.clone(), file);
  }

  pub fn generated_of_type(&self, artifact_type: ArtifactType) -> impl Iterator<Item = &GeneratedFileDetails> {
    self.generated_files.values().filter(move |f| f.artifact_type == artifact_type)
  }
}

/// One named byte stream uploaded as part of a document, before pipeline
/// processing begins. Mime recognition of `content.url` (a materialized URL
/// upload) happens in the extract step, not here.
#[derive(Debug, Clone)]
pub struct UploadFile {
  pub name: String,
  pub bytes: Vec<u8>,
}

/// Unit of ingestion: an index-scoped id, user tags, and a set of uploaded files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
  pub id: DocumentId,
  pub tags: TagSet,
}

impl Document {
  pub fn new(id: DocumentId, tags: TagSet) -> Self {
    Self { id, tags }
  }
}

/// Deduplicate file names within one document by appending a stable hash
/// suffix of the source path to any name that collides with an earlier one.
pub fn dedupe_file_names(files: Vec<UploadFile>) -> Vec<UploadFile> {
  use sha2::{Digest, Sha256};

  let mut seen = std::collections::HashSet::new();
  files
    .into_iter()
    .map(|mut f| {
      if seen.contains(&f.name) {
        let mut hasher = Sha256::new();
        hasher.update(f.name.as_bytes());
        let digest = hasher.finalize();
        let suffix = hex_prefix(&digest, 8);
        let (stem, ext) = split_ext(&f.name);
        f.name = match ext {
          Some(ext) => format!("{stem}.{suffix}.{ext}"),
          None => format!("{stem}.{suffix}"),
        };
      }
      seen.insert(f.name.clone());
      f
    })
    .collect()
}

fn hex_prefix(bytes: &[u8], n: usize) -> String {
  bytes.iter().take(n).map(|b| format!("{b:02x}")).collect()
}

fn split_ext(name: &str) -> (&str, Option<&str>) {
  match name.rsplit_once('.') {
    Some((stem, ext)) => (stem, Some(ext)),
    None => (name, None),
  }
}

/// SHA-256 content hash used for idempotent re-ingestion detection.
pub fn content_hash(bytes: &[u8]) -> String {
  use sha2::{Digest, Sha256};
  let mut hasher = Sha256::new();
  hasher.update(bytes);
  hex_prefix(&hasher.finalize(), 32)
}
