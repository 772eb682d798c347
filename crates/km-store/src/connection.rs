//! LanceDB connection management: one physical table per logical index.

use std::path::{Path, PathBuf};

use lancedb::Connection;
use lancedb::connect;
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::schema::records_schema;

/// Holds the LanceDB connection for one project's vector indexes.
pub struct VectorDb {
  pub path: PathBuf,
  connection: Connection,
}

impl VectorDb {
  /// Open (creating if absent) the LanceDB database directory at `path`.
  pub async fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    info!(path = %path.display(), "opening vector store");
    let connection = connect(path.to_string_lossy().as_ref()).execute().await?;
    Ok(Self { path: path.to_path_buf(), connection })
  }

  pub async fn table_names(&self) -> Result<Vec<String>> {
    Ok(self.connection.table_names().execute().await?)
  }

  /// Create the table for `index` with the given vector dimension. Idempotent:
  /// a no-op if the table already exists (dimension compatibility is checked
  /// by the caller, [`crate::vector_store::VectorStore::create_index`]).
  pub async fn create_table_if_absent(&self, index: &str, vector_dim: usize) -> Result<()> {
    let existing = self.table_names().await?;
    if existing.iter().any(|t| t == index) {
      return Ok(());
    }
    debug!(index, vector_dim, "creating vector store table");
    self
      .connection
      .create_empty_table(index, records_schema(vector_dim))
      .execute()
      .await?;
    Ok(())
  }

  pub async fn open_table(&self, index: &str) -> Result<lancedb::Table> {
    self
      .connection
      .open_table(index)
      .execute()
      .await
      .map_err(|_| StoreError::IndexNotFound(index.to_string()))
  }

  pub async fn drop_table(&self, index: &str) -> Result<()> {
    self.connection.drop_table(index).await.map_err(|_| StoreError::IndexNotFound(index.to_string()))
  }

  /// Vector dimension of an existing table's `vector` column, used to detect
  /// a mismatched `CreateIndex` call against an already-created index.
  pub async fn table_vector_dim(&self, index: &str) -> Result<usize> {
    let table = self.open_table(index).await?;
    let schema = table.schema().await?;
    let field = schema
      .field_with_name("vector")
      .map_err(|_| StoreError::IndexNotFound(index.to_string()))?;
    match field.data_type() {
      arrow_schema::DataType::FixedSizeList(_, n) => Ok(*n as usize),
      _ => Ok(0),
    }
  }
}
