use async_trait::async_trait;

use km_core::{ArtifactType, DataPipeline, GeneratedFileDetails, HandlerContext, Result, StepHandler, STEP_SUMMARIZE};

use crate::chunker::estimate_tokens;

/// Step handler for `summarize`: asks C5 for a summary
/// of each `ExtractedContent` artifact under the configured prompt token
/// budget, and emits it as a `TextSummarization` artifact. Downstream,
/// `gen_embeddings`/`save_records` treat it exactly like a partition, tagged
/// `__syn=summary`. Absent a configured generator this step is a no-op, so a
/// deployment that never wires one in can still list it in its pipeline.
pub struct SummarizeHandler;

#[async_trait]
impl StepHandler for SummarizeHandler {
  fn step_name(&self) -> &'static str {
    STEP_SUMMARIZE
  }

  async fn invoke(&self, ctx: &HandlerContext<'_>, mut pipeline: DataPipeline) -> Result<DataPipeline> {
    let Some(generator) = ctx.generator else {
      return Ok(pipeline);
    };

    let index = pipeline.index.clone();
    let document_id = pipeline.document_id.clone();
    let max_tokens = ctx.config.retrieval.max_prompt_tokens;

    for file in pipeline.files.iter_mut() {
      let extracted: Vec<GeneratedFileDetails> = file.generated_of_type(ArtifactType::ExtractedContent).cloned().collect();

      for extracted_file in extracted {
        if file.generated_files.values().any(|g| g.artifact_type == ArtifactType::TextSummarization && g.parent_id == extracted_file.id) {
          continue;
        }

        let bytes = ctx.docs.read_file_bytes(&index, &document_id, &extracted_file.name).await?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        if text.trim().is_empty() {
          continue;
        }

        let prompt = build_summary_prompt(&text, max_tokens);
        let summary = generator.generate(&prompt).await?;
        if summary.trim().is_empty() {
          continue;
        }

        let summary_bytes = summary.into_bytes();
        let summary_name = format!("{}.summary.txt", extracted_file.name);

        ctx.docs.write_file(&index, &document_id, &summary_name, &summary_bytes).await?;

        file.add_generated(GeneratedFileDetails {
          id: format!("{}-summary", extracted_file.id),
          name: summary_name,
          size: summary_bytes.len() as u64,
          mime_type: "text/plain".to_string(),
          artifact_type: ArtifactType::TextSummarization,
          parent_id: extracted_file.id.clone(),
          partition_number: None,
          section_number: None,
          content_hash: km_core::content_hash(&summary_bytes),
          embedder: None,
        });
      }
    }

    Ok(pipeline)
  }
}

/// Truncates `text` to roughly `max_tokens` worth of content before handing
/// it to the generator, so a long document doesn't blow the prompt budget.
fn build_summary_prompt(text: &str, max_tokens: usize) -> String {
  let truncated = truncate_to_tokens(text, max_tokens);
  format!(
    "Summarize the following content concisely, preserving the key facts a reader would need. Respond with only the summary, no preamble.\n\nContent:\n{truncated}"
  )
}

fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
  if estimate_tokens(text) <= max_tokens {
    return text.to_string();
  }
  let max_chars = max_tokens * 4;
  text.chars().take(max_chars).collect()
}
