//! Step handlers for document lifecycle management (C7): the
//! ingestion chain (`partition`, `gen_embeddings`, `save_records`,
//! `summarize`) plus document/index teardown (`delete_document`,
//! `delete_index`). `extract` lives in `km-decode`, which owns the decoder
//! registry these handlers consume artifacts from.

pub mod chunker;
pub mod delete_document;
pub mod delete_index;
pub mod gen_embeddings;
pub mod partition;
pub mod save_records;
pub mod summarize;

pub use chunker::{Chunker, TextPartition};
pub use delete_document::DeleteDocumentHandler;
pub use delete_index::DeleteIndexHandler;
pub use gen_embeddings::GenEmbeddingsHandler;
pub use partition::PartitionHandler;
pub use save_records::SaveRecordsHandler;
pub use summarize::SummarizeHandler;

/// Builds every step handler this crate provides, plus `km-decode`'s
/// `extract`, in the order a default ingestion pipeline runs them. Deletion
/// handlers are not part of the ingestion chain and must be registered
/// separately by whatever dispatches pipelines by step name.
pub fn ingestion_handlers() -> Vec<Box<dyn km_core::StepHandler>> {
  vec![
    Box::new(km_decode::ExtractHandler::default()),
    Box::new(PartitionHandler),
    Box::new(SummarizeHandler),
    Box::new(GenEmbeddingsHandler),
    Box::new(SaveRecordsHandler),
  ]
}
