use async_trait::async_trait;

use km_core::{ArtifactType, DataPipeline, GeneratedFileDetails, HandlerContext, Result, StepHandler, STEP_EXTRACT};

use crate::registry::DecoderRegistry;

/// Step handler for `extract`: decodes every input file whose
/// `artifactType` is still `Undefined` into an `ExtractedContent` text
/// artifact. Already-extracted files are skipped, which makes re-delivery
/// of this step idempotent.
pub struct ExtractHandler {
  registry: DecoderRegistry,
}

impl ExtractHandler {
  pub fn new(registry: DecoderRegistry) -> Self {
    Self { registry }
  }
}

impl Default for ExtractHandler {
  fn default() -> Self {
    Self::new(DecoderRegistry::with_defaults())
  }
}

#[async_trait]
impl StepHandler for ExtractHandler {
  fn step_name(&self) -> &'static str {
    STEP_EXTRACT
  }

  async fn invoke(&self, ctx: &HandlerContext<'_>, mut pipeline: DataPipeline) -> Result<DataPipeline> {
    let index = pipeline.index.clone();
    let document_id = pipeline.document_id.clone();

    for file in pipeline.files.iter_mut() {
      if file.artifact_type != ArtifactType::Undefined {
        continue;
      }

      let bytes = ctx.docs.read_file_bytes(&index, &document_id, &file.name).await?;
      let decoder = self.registry.select(&file.mime_type, &file.name);

      let extracted = match decoder {
        Some(decoder) => match decoder.decode(&bytes).await {
          Ok(text) => text,
          Err(err) => {
            tracing::warn!(file = %file.name, error = %err, "decoder failed, producing empty artifact");
            String::new()
          }
        },
        None => {
          tracing::warn!(file = %file.name, mime_type = %file.mime_type, "no decoder for mime type, producing empty artifact");
          String::new()
        }
      };

      let extracted_bytes = extracted.into_bytes();
      let generated_name = format!("{}.extract.txt", file.name);

      ctx.docs.write_file(&index, &document_id, &generated_name, &extracted_bytes).await?;

      file.add_generated(GeneratedFileDetails {
        id: format!("{}-extract", file.id),
        name: generated_name,
        size: extracted_bytes.len() as u64,
        mime_type: "text/plain".to_string(),
        artifact_type: ArtifactType::ExtractedContent,
        parent_id: file.id.clone(),
        partition_number: None,
        section_number: None,
        content_hash: km_core::content_hash(&extracted_bytes),
        embedder: None,
      });

      file.artifact_type = ArtifactType::ExtractedContent;
    }

    Ok(pipeline)
  }
}
