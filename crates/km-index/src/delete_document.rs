use async_trait::async_trait;

use km_core::{DataPipeline, HandlerContext, MemoryFilter, Result, StepHandler, STEP_DELETE_DOCUMENT, TAG_DOCUMENT_ID};

/// Step handler for `delete_document`: removes every record
/// tagged with this document's id from every index the document's embedders
/// could have targeted, then empties its document-store directory (leaving
/// `status.json` itself, which the orchestrator deletes once the pipeline
/// finishes).
pub struct DeleteDocumentHandler;

#[async_trait]
impl StepHandler for DeleteDocumentHandler {
  fn step_name(&self) -> &'static str {
    STEP_DELETE_DOCUMENT
  }

  async fn invoke(&self, ctx: &HandlerContext<'_>, pipeline: DataPipeline) -> Result<DataPipeline> {
    let filter = MemoryFilter::new().by_tag(TAG_DOCUMENT_ID, pipeline.document_id.clone());

    for index in ctx.vectors.list_indexes().await? {
      ctx.vectors.delete_by_filter(&index, std::slice::from_ref(&filter)).await?;
    }

    ctx.docs.empty_document_directory(&pipeline.index, &pipeline.document_id).await?;

    Ok(pipeline)
  }
}
