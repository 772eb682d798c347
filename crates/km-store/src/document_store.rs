//! Document Store (C1): durable hierarchical blob storage with path semantics
//! `index / documentId / fileName`.
//!
//! Reference implementation is filesystem-backed (`tokio::fs`) under a
//! configurable root directory. Per-key writes are serialized with an
//! in-process keyed mutex, an advisory-lock alternative to a blob lease.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::{Result, StoreError};

/// A file returned by [`DocumentStore::read_file`]: metadata plus a deferred
/// stream opener, so callers that only need size/mime never pay for the read.
pub struct StreamableFile {
  pub name: String,
  pub size: u64,
  pub content_type: String,
  pub last_write: DateTime<Utc>,
  path: PathBuf,
}

impl StreamableFile {
  pub async fn open(&self) -> Result<tokio::fs::File> {
    Ok(tokio::fs::File::open(&self.path).await?)
  }

  pub async fn read_to_vec(&self) -> Result<Vec<u8>> {
    Ok(tokio::fs::read(&self.path).await?)
  }
}

/// Guards concurrent writes to the same `(index, documentId, name)` key so two
/// workers never interleave writes to one blob.
#[derive(Default)]
struct KeyedLocks {
  locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
  fn get(&self, key: &str) -> Arc<Mutex<()>> {
    let mut locks = self.locks.lock().unwrap();
    locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
  }
}

pub struct DocumentStore {
  root: PathBuf,
  locks: KeyedLocks,
}

impl DocumentStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into(), locks: KeyedLocks::default() }
  }

  fn index_dir(&self, index: &str) -> PathBuf {
    self.root.join(index)
  }

  fn document_dir(&self, index: &str, document_id: &str) -> PathBuf {
    self.index_dir(index).join(document_id)
  }

  fn file_path(&self, index: &str, document_id: &str, name: &str) -> PathBuf {
    self.document_dir(index, document_id).join(name)
  }

  pub async fn create_index_directory(&self, index: &str) -> Result<()> {
    tokio::fs::create_dir_all(self.index_dir(index)).await?;
    Ok(())
  }

  /// Removes every document's artifacts under `index`. The
  /// pipeline-status file of an in-flight deletion pipeline is preserved by
  /// the narrower `empty_document_directory`/`delete_document_directory`
  /// calls; a whole-index deletion has no such pipeline to protect and removes
  /// everything.
  pub async fn delete_index_directory(&self, index: &str) -> Result<()> {
    let path = self.index_dir(index);
    if path.exists() {
      tokio::fs::remove_dir_all(&path).await?;
    }
    Ok(())
  }

  pub async fn create_document_directory(&self, index: &str, document_id: &str) -> Result<()> {
    tokio::fs::create_dir_all(self.document_dir(index, document_id)).await?;
    Ok(())
  }

  /// Deletes every file in the document directory except `status.json`, so
  /// pipeline status remains queryable after a `delete_document` step.
  pub async fn empty_document_directory(&self, index: &str, document_id: &str) -> Result<()> {
    let dir = self.document_dir(index, document_id);
    let mut entries = match tokio::fs::read_dir(&dir).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
      Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
      if entry.file_name() == "status.json" {
        continue;
      }
      let path = entry.path();
      if entry.file_type().await?.is_dir() {
        tokio::fs::remove_dir_all(&path).await?;
      } else {
        tokio::fs::remove_file(&path).await?;
      }
    }
    Ok(())
  }

  /// Deletes the whole document directory including `status.json`. Unlike
  /// `empty_document_directory`, this is for callers (e.g. index deletion)
  /// that no longer need to report pipeline status.
  pub async fn delete_document_directory(&self, index: &str, document_id: &str) -> Result<()> {
    let path = self.document_dir(index, document_id);
    if path.exists() {
      tokio::fs::remove_dir_all(&path).await?;
    }
    Ok(())
  }

  /// Overwrite semantics; concurrent writes to the same key are serialized.
  /// Zero-byte writes are permitted and logged.
  pub async fn write_file(&self, index: &str, document_id: &str, name: &str, bytes: &[u8]) -> Result<()> {
    let key = format!("{index}/{document_id}/{name}");
    let lock = self.locks.get(&key);
    let _guard = lock.lock().await;

    self.create_document_directory(index, document_id).await?;
    let path = self.file_path(index, document_id, name);
    if bytes.is_empty() {
      tracing::debug!(index, document_id, name, "writing zero-byte file");
    } else {
      tracing::debug!(index, document_id, name, size = bytes.len(), "writing file");
    }
    tokio::fs::write(&path, bytes).await?;
    Ok(())
  }

  pub async fn read_file(&self, index: &str, document_id: &str, name: &str) -> Result<StreamableFile> {
    let path = self.file_path(index, document_id, name);
    let metadata = tokio::fs::metadata(&path).await.map_err(|_| StoreError::FileNotFound {
      index: index.to_string(),
      document_id: document_id.to_string(),
      name: name.to_string(),
    })?;
    let last_write = metadata.modified().map(DateTime::<Utc>::from).unwrap_or_else(Utc::now);
    Ok(StreamableFile {
      name: name.to_string(),
      size: metadata.len(),
      content_type: mime_guess(name),
      last_write,
      path,
    })
  }

  pub async fn delete_file(&self, index: &str, document_id: &str, name: &str) -> Result<()> {
    let path = self.file_path(index, document_id, name);
    match tokio::fs::remove_file(&path).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e.into()),
    }
  }

  pub async fn list_files(&self, index: &str, document_id: &str) -> Result<Vec<String>> {
    let dir = self.document_dir(index, document_id);
    let mut entries = match tokio::fs::read_dir(&dir).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(e.into()),
    };
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
      if let Some(name) = entry.file_name().to_str() {
        names.push(name.to_string());
      }
    }
    names.sort();
    Ok(names)
  }
}

#[async_trait::async_trait]
impl km_core::DocStore for DocumentStore {
  async fn create_index_directory(&self, index: &str) -> km_core::Result<()> {
    Ok(self.create_index_directory(index).await?)
  }

  async fn delete_index_directory(&self, index: &str) -> km_core::Result<()> {
    Ok(self.delete_index_directory(index).await?)
  }

  async fn create_document_directory(&self, index: &str, document_id: &str) -> km_core::Result<()> {
    Ok(self.create_document_directory(index, document_id).await?)
  }

  async fn empty_document_directory(&self, index: &str, document_id: &str) -> km_core::Result<()> {
    Ok(self.empty_document_directory(index, document_id).await?)
  }

  async fn delete_document_directory(&self, index: &str, document_id: &str) -> km_core::Result<()> {
    Ok(self.delete_document_directory(index, document_id).await?)
  }

  async fn write_file(&self, index: &str, document_id: &str, name: &str, bytes: &[u8]) -> km_core::Result<()> {
    Ok(self.write_file(index, document_id, name, bytes).await?)
  }

  async fn read_file_bytes(&self, index: &str, document_id: &str, name: &str) -> km_core::Result<Vec<u8>> {
    let file = self.read_file(index, document_id, name).await?;
    Ok(file.read_to_vec().await?)
  }

  async fn list_files(&self, index: &str, document_id: &str) -> km_core::Result<Vec<String>> {
    Ok(self.list_files(index, document_id).await?)
  }
}

fn mime_guess(name: &str) -> String {
  match Path::new(name).extension().and_then(|e| e.to_str()) {
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
