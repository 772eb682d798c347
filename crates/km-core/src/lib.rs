pub mod capability;
pub mod config;
pub mod document;
pub mod error;
pub mod handler;
pub mod index_name;
pub mod memory_record;
pub mod pipeline;
pub mod retrieval;
pub mod tags;
pub mod validation;

pub use capability::{DocStore, Embedder, Generator, VecStore};
pub use config::{ChunkingConfig, Config, EmbeddingConfig, EmbeddingProvider, IndexNamingConfig, QueueConfig, RetrievalConfig};
pub use document::{ArtifactType, Document, DocumentId, FileDetails, GeneratedFileDetails, UploadFile, content_hash, dedupe_file_names};
pub use error::{Error, ErrorKind, Result};
pub use handler::{HandlerContext, StepHandler};
pub use index_name::{DEFAULT_INDEX_NAME, normalize_index_name};
pub use memory_record::{MemoryRecord, RecordId};
pub use pipeline::{CURRENT_SCHEMA_VERSION, DataPipeline, STEP_DELETE_DOCUMENT, STEP_DELETE_INDEX, STEP_EXTRACT, STEP_GEN_EMBEDDINGS, STEP_PARTITION, STEP_SAVE_RECORDS, STEP_SUMMARIZE, default_ingestion_steps};
pub use retrieval::{Citation, CitationPartition, DEFAULT_EMPTY_ANSWER, MemoryAnswer, MemoryFilter, SearchResult, TagPredicate};
pub use tags::{RESERVED_PREFIX, TAG_DOCUMENT_ID, TAG_FILE_ID, TAG_FILE_PART, TAG_FILE_TYPE, TAG_PART_N, TAG_SECT_N, TAG_SYNTHETIC, TagSet};
pub use validation::{ValidationError, ValidationResult};
