use async_trait::async_trait;

use km_core::{ArtifactType, DataPipeline, GeneratedFileDetails, HandlerContext, Result, StepHandler, STEP_PARTITION};

use crate::chunker::Chunker;

/// Step handler for `partition`: splits every `ExtractedContent`
/// artifact into `TextPartition` artifacts under the configured token
/// budgets. Already-partitioned extracted files are skipped by checking for
/// an existing `TextPartition` child, so redelivery is idempotent.
pub struct PartitionHandler;

#[async_trait]
impl StepHandler for PartitionHandler {
  fn step_name(&self) -> &'static str {
    STEP_PARTITION
  }

  async fn invoke(&self, ctx: &HandlerContext<'_>, mut pipeline: DataPipeline) -> Result<DataPipeline> {
    let index = pipeline.index.clone();
    let document_id = pipeline.document_id.clone();
    let chunker = Chunker::new(ctx.config.chunking.clone());

    for file in pipeline.files.iter_mut() {
      let extracted: Vec<GeneratedFileDetails> = file.generated_of_type(ArtifactType::ExtractedContent).cloned().collect();

      for extracted_file in extracted {
        if file.generated_files.values().any(|g| g.artifact_type == ArtifactType::TextPartition && g.parent_id == extracted_file.id) {
          continue;
        }

        let bytes = ctx.docs.read_file_bytes(&index, &document_id, &extracted_file.name).await?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let partitions = chunker.partition(&text);

        for partition in partitions {
          let partition_name = format!("{}.partition.{}.txt", extracted_file.name, partition.partition_number);
          let partition_bytes = partition.content.into_bytes();

          ctx.docs.write_file(&index, &document_id, &partition_name, &partition_bytes).await?;

          file.add_generated(GeneratedFileDetails {
            id: format!("{}-partition-{}", extracted_file.id, partition.partition_number),
            name: partition_name,
            size: partition_bytes.len() as u64,
            mime_type: "text/plain".to_string(),
            artifact_type: ArtifactType::TextPartition,
            parent_id: extracted_file.id.clone(),
            partition_number: Some(partition.partition_number),
            section_number: partition.section_number,
            content_hash: km_core::content_hash(&partition_bytes),
            embedder: None,
          });
        }
      }
    }

    Ok(pipeline)
  }
}
