use async_trait::async_trait;

use km_core::{ArtifactType, DataPipeline, GeneratedFileDetails, HandlerContext, Result, StepHandler, STEP_GEN_EMBEDDINGS};

use crate::chunker::estimate_tokens;

/// Step handler for `gen_embeddings`: embeds every `TextPartition`
/// (and `TextSummarization`) artifact once per configured embedder, fanning
/// out across the embedder set. Partitions already embedded by a given
/// embedder are skipped, and empty text is skipped entirely.
pub struct GenEmbeddingsHandler;

#[async_trait]
impl StepHandler for GenEmbeddingsHandler {
  fn step_name(&self) -> &'static str {
    STEP_GEN_EMBEDDINGS
  }

  async fn invoke(&self, ctx: &HandlerContext<'_>, mut pipeline: DataPipeline) -> Result<DataPipeline> {
    let index = pipeline.index.clone();
    let document_id = pipeline.document_id.clone();

    for file in pipeline.files.iter_mut() {
      let partitions: Vec<GeneratedFileDetails> =
        file.generated_files.values().filter(|g| matches!(g.artifact_type, ArtifactType::TextPartition | ArtifactType::TextSummarization)).cloned().collect();

      if partitions.is_empty() {
        continue;
      }

      for embedder in ctx.embedders.iter() {
        let mut items: Vec<(GeneratedFileDetails, String)> = Vec::new();

        for partition in &partitions {
          let already_embedded = file
            .generated_files
            .values()
            .any(|g| g.artifact_type == ArtifactType::TextEmbeddingVector && g.parent_id == partition.id && g.embedder.as_deref() == Some(embedder.name()));
          if already_embedded {
            continue;
          }

          let bytes = ctx.docs.read_file_bytes(&index, &document_id, &partition.name).await?;
          let text = String::from_utf8_lossy(&bytes).into_owned();
          if text.trim().is_empty() {
            continue;
          }

          items.push((partition.clone(), text));
        }

        if items.is_empty() {
          continue;
        }

        for batch in greedy_batches(&items, ctx.config.embedding.max_batch_size, ctx.config.embedding.max_batch_tokens) {
          let texts: Vec<&str> = batch.iter().map(|(_, text)| text.as_str()).collect();
          let vectors = embedder.embed_batch(&texts).await?;

          for (entry, vector) in batch.into_iter().zip(vectors.into_iter()) {
            let (partition, _text) = entry;

            let vector_json = serde_json::to_vec(vector).map_err(|e| km_core::Error::fatal(e.to_string()))?;
            let artifact_name = format!("{}.embedding.{}.json", partition.name, embedder.name());

            ctx.docs.write_file(&index, &document_id, &artifact_name, &vector_json).await?;

            file.add_generated(GeneratedFileDetails {
              id: embedding_artifact_id(&partition.id, embedder.name()),
              name: artifact_name,
              size: vector_json.len() as u64,
              mime_type: "application/json".to_string(),
              artifact_type: ArtifactType::TextEmbeddingVector,
              parent_id: partition.id.clone(),
              partition_number: partition.partition_number,
              section_number: partition.section_number,
              content_hash: km_core::content_hash(&vector_json),
              embedder: Some(embedder.name().to_string()),
            });
          }
        }
      }
    }

    Ok(pipeline)
  }
}

fn embedding_artifact_id(partition_id: &str, embedder_name: &str) -> String {
  format!("{partition_id}-embedding-{embedder_name}")
}

/// Groups `items` greedily under both an element-count cap and a cumulative
/// token cap.
fn greedy_batches(items: &[(GeneratedFileDetails, String)], max_batch_size: usize, max_batch_tokens: usize) -> Vec<Vec<&(GeneratedFileDetails, String)>> {
  let mut batches = Vec::new();
  let mut current: Vec<&(GeneratedFileDetails, String)> = Vec::new();
  let mut current_tokens = 0usize;

  for item in items {
    let tokens = estimate_tokens(&item.1);
    let would_exceed_count = current.len() + 1 > max_batch_size;
    let would_exceed_tokens = current_tokens + tokens > max_batch_tokens && !current.is_empty();

    if !current.is_empty() && (would_exceed_count || would_exceed_tokens) {
      batches.push(std::mem::take(&mut current));
      current_tokens = 0;
    }

    current.push(item);
    current_tokens += tokens;
  }

  if !current.is_empty() {
    batches.push(current);
  }

  batches
}
