use async_trait::async_trait;

use km_core::{DataPipeline, HandlerContext, Result, StepHandler, STEP_DELETE_INDEX};

/// Step handler for `delete_index`: drops an entire index, both
/// its vector store and its document-store directory. The vector store
/// itself refuses to drop the configured default index, so that guard is not
/// duplicated here; the error simply propagates and fails the pipeline.
pub struct DeleteIndexHandler;

#[async_trait]
impl StepHandler for DeleteIndexHandler {
  fn step_name(&self) -> &'static str {
    STEP_DELETE_INDEX
  }

  async fn invoke(&self, ctx: &HandlerContext<'_>, pipeline: DataPipeline) -> Result<DataPipeline> {
    ctx.vectors.delete_index(&pipeline.index).await?;
    ctx.docs.delete_index_directory(&pipeline.index).await?;
    Ok(pipeline)
  }
}
