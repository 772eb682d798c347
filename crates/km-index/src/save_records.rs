use async_trait::async_trait;

use km_core::{
  ArtifactType, DataPipeline, HandlerContext, MemoryRecord, RecordId, Result, StepHandler, TagSet, STEP_SAVE_RECORDS, TAG_DOCUMENT_ID, TAG_FILE_ID, TAG_FILE_PART,
  TAG_FILE_TYPE, TAG_PART_N, TAG_SECT_N, TAG_SYNTHETIC,
};

/// Step handler for `save_records`: upserts one [`MemoryRecord`]
/// per `TextEmbeddingVector` artifact into the vector index that embedder
/// targets. Upsert is keyed on the partition's record id, so redelivery
/// overwrites rather than duplicates.
pub struct SaveRecordsHandler;

#[async_trait]
impl StepHandler for SaveRecordsHandler {
  fn step_name(&self) -> &'static str {
    STEP_SAVE_RECORDS
  }

  async fn invoke(&self, ctx: &HandlerContext<'_>, pipeline: DataPipeline) -> Result<DataPipeline> {
    let index = pipeline.index.clone();
    let document_id = pipeline.document_id.clone();
    let embedder_count = ctx.embedders.len();

    for file in &pipeline.files {
      for embedding in file.generated_of_type(ArtifactType::TextEmbeddingVector) {
        let embedder_name = embedding.embedder.as_deref().unwrap_or_default();
        let partition_number = embedding.partition_number.unwrap_or(0);

        let vector_bytes = ctx.docs.read_file_bytes(&index, &document_id, &embedding.name).await?;
        let vector: Vec<f32> = serde_json::from_slice(&vector_bytes).map_err(|e| km_core::Error::fatal(e.to_string()))?;

        let partition_text = match file.generated_files.values().find(|g| g.id == embedding.parent_id) {
          Some(partition_file) => {
            let bytes = ctx.docs.read_file_bytes(&index, &document_id, &partition_file.name).await?;
            String::from_utf8_lossy(&bytes).into_owned()
          }
          None => String::new(),
        };

        let mut tags = TagSet::new();
        tags.set_reserved(TAG_DOCUMENT_ID, document_id.clone());
        tags.set_reserved(TAG_FILE_ID, file.id.clone());
        tags.set_reserved(TAG_FILE_PART, embedding.parent_id.clone());
        tags.set_reserved(TAG_PART_N, partition_number.to_string());
        if let Some(section_number) = embedding.section_number {
          tags.set_reserved(TAG_SECT_N, section_number.to_string());
        }
        tags.set_reserved(TAG_FILE_TYPE, file.mime_type.clone());
        let parent_is_summary = file.generated_files.values().any(|g| g.id == embedding.parent_id && g.artifact_type == ArtifactType::TextSummarization);
        if parent_is_summary {
          tags.set_reserved(TAG_SYNTHETIC, "summary");
        }
        tags.merge(&pipeline.tags);

        let record_id = RecordId::from_partition_key(&document_id, &file.id, partition_number);
        let vector_dim = vector.len();
        let record = MemoryRecord::new(record_id, vector, tags).with_payload("sourceFile", file.name.clone()).with_payload("text", partition_text);

        let target_index = target_index_for(&index, embedder_name, embedder_count);
        ctx.vectors.create_index(&target_index, vector_dim).await?;
        ctx.vectors.upsert(&target_index, record).await?;
      }
    }

    Ok(pipeline)
  }
}

/// The vector index a given embedder's records land in. With a single
/// configured embedder, records go straight into the document's index; with
/// more than one, each embedder gets its own `{index}__{embedder}` namespace
/// so that one embedder's dimension never collides with another's in the
/// same index.
fn target_index_for(base_index: &str, embedder_name: &str, embedder_count: usize) -> String {
  if embedder_count <= 1 {
    base_index.to_string()
  } else {
    format!("{base_index}__{embedder_name}")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn single_embedder_uses_base_index() {
    assert_eq!(target_index_for("default", "ollama", 1), "default");
  }

  #[test]
  fn multiple_embedders_get_namespaced_indexes() {
    assert_eq!(target_index_for("default", "ollama", 2), "default__ollama");
    assert_eq!(target_index_for("default", "openrouter", 2), "default__openrouter");
  }
}
