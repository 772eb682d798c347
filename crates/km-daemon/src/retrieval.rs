//! C8 Retrieval Engine: `Search` and `Ask`.
//!
//! Both operations embed the query with the configured embedder, run a
//! similarity query scoped by the caller's [`MemoryFilter`]s, and assemble
//! matches into [`Citation`]s grouped by `(documentId, fileId)`. `Ask` further
//! accumulates citation text under a token budget and hands it to the
//! configured [`Generator`] via [`km_llm::build_answer_prompt`].

use std::collections::BTreeMap;
use std::sync::Arc;

use km_core::{Citation, CitationPartition, DataPipeline, DocStore, Embedder, Generator, MemoryAnswer, MemoryFilter, MemoryRecord, RetrievalConfig, SearchResult, VecStore, TAG_FILE_ID};

const STATUS_FILE: &str = "status.json";

pub struct RetrievalEngine {
  docs: Arc<dyn DocStore>,
  vectors: Arc<dyn VecStore>,
  embedder: Arc<dyn Embedder>,
  generator: Option<Arc<dyn Generator>>,
  config: RetrievalConfig,
}

impl RetrievalEngine {
  pub fn new(docs: Arc<dyn DocStore>, vectors: Arc<dyn VecStore>, embedder: Arc<dyn Embedder>, generator: Option<Arc<dyn Generator>>, config: RetrievalConfig) -> Self {
    Self { docs, vectors, embedder, generator, config }
  }

  /// `Search`: embed `query`, run a similarity search scoped by `filters`, and
  /// group matches into citations.
  pub async fn search(&self, index: &str, query: &str, filters: &[MemoryFilter], limit: Option<usize>, min_relevance: Option<f32>) -> km_core::Result<SearchResult> {
    let limit = limit.unwrap_or(self.config.default_limit);
    let min_relevance = min_relevance.unwrap_or(self.config.min_relevance);

    let embedding = self.embedder.embed(query).await?;
    let matches = self.vectors.get_similar_list(index, &embedding, limit, min_relevance, filters, false).await?;

    if matches.is_empty() {
      return Ok(SearchResult::empty(query));
    }

    let citations = self.group_into_citations(index, matches).await?;
    Ok(SearchResult { query: query.to_string(), results: citations, no_result: false })
  }

  /// `Ask`: run the same retrieval as `Search`, then synthesize a grounded
  /// answer from the accumulated facts. Returns
  /// [`MemoryAnswer::empty`] when nothing matches or no generator is
  /// configured.
  pub async fn ask(&self, index: &str, question: &str, filters: &[MemoryFilter], min_relevance: Option<f32>) -> km_core::Result<MemoryAnswer> {
    let Some(generator) = self.generator.as_ref() else {
      return Ok(MemoryAnswer::empty(question));
    };

    let min_relevance = min_relevance.unwrap_or(self.config.min_relevance);
    let embedding = self.embedder.embed(question).await?;
    let matches = self.vectors.get_similar_list(index, &embedding, self.config.default_limit, min_relevance, filters, false).await?;

    if matches.is_empty() {
      return Ok(MemoryAnswer::empty(question));
    }

    let citations = self.group_into_citations(index, matches).await?;
    let facts = facts_under_budget(&citations, self.config.max_prompt_tokens);

    let prompt = km_llm::build_answer_prompt(&facts, question, &self.config.empty_answer);
    let text = generator.generate(&prompt).await?;

    Ok(MemoryAnswer { question: question.to_string(), text, relevant_sources: citations, no_result: false })
  }

  /// Groups scored records by `(documentId, fileId)`, sourcing each citation's
  /// `sourceName` from the record's `sourceFile` payload entry and its
  /// partitions' `lastUpdate` from the owning document's `status.json`
  /// (read directly rather than threading a timestamp through every record,
  /// since `km-index` deliberately carries no `chrono` dependency).
  async fn group_into_citations(&self, index: &str, matches: Vec<(MemoryRecord, f32)>) -> km_core::Result<Vec<Citation>> {
    let mut grouped: BTreeMap<(String, String), Citation> = BTreeMap::new();
    let mut last_update_cache: BTreeMap<String, chrono::DateTime<chrono::Utc>> = BTreeMap::new();

    for (record, relevance) in matches {
      let Some(document_id) = record.document_id().map(str::to_string) else { continue };
      let file_id = record.tags.get(TAG_FILE_ID).and_then(|v| v.first()).and_then(|v| v.clone()).unwrap_or_default();

      let partition_number = record.tags.get(km_core::TAG_PART_N).and_then(|v| v.first()).and_then(|v| v.clone()).and_then(|v| v.parse().ok());
      let section_number = record.tags.get(km_core::TAG_SECT_N).and_then(|v| v.first()).and_then(|v| v.clone()).and_then(|v| v.parse().ok());

      let source_name = record.payload.get("sourceFile").and_then(|v| v.as_str()).unwrap_or_default().to_string();
      let text = record.payload.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_string();

      let last_update = if let Some(cached) = last_update_cache.get(&document_id) {
        *cached
      } else {
        let resolved = self.document_last_update(index, &document_id).await;
        last_update_cache.insert(document_id.clone(), resolved);
        resolved
      };

      let key = (document_id.clone(), file_id.clone());
      let citation = grouped.entry(key).or_insert_with(|| Citation { document_id: document_id.clone(), file_id: file_id.clone(), source_name: source_name.clone(), partitions: Vec::new() });
      citation.partitions.push(CitationPartition { text, relevance, partition_number, section_number, last_update });
    }

    for citation in grouped.values_mut() {
      citation.partitions.sort_by(|a, b| b.relevance.partial_cmp(&a.relevance).unwrap_or(std::cmp::Ordering::Equal));
    }

    let mut citations: Vec<Citation> = grouped.into_values().collect();
    citations.sort_by(|a, b| {
      let a_best = a.partitions.first().map(|p| p.relevance).unwrap_or(0.0);
      let b_best = b.partitions.first().map(|p| p.relevance).unwrap_or(0.0);
      b_best.partial_cmp(&a_best).unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(citations)
  }

  /// Best-effort lookup of a document's `status.json` `lastUpdate`; falls back
  /// to the current time if the pipeline record can't be read (e.g. it was
  /// torn down between the vector match and this lookup).
  async fn document_last_update(&self, index: &str, document_id: &str) -> chrono::DateTime<chrono::Utc> {
    match self.docs.read_file_bytes(index, document_id, STATUS_FILE).await {
      Ok(bytes) => serde_json::from_slice::<DataPipeline>(&bytes).map(|p| p.last_update).unwrap_or_else(|_| chrono::Utc::now()),
      Err(_) => chrono::Utc::now(),
    }
  }
}

/// Greedily accumulate citation text under `max_tokens`, in the order
/// citations are already sorted (best match first), so the most relevant
/// facts are favored when the budget can't fit everything.
fn facts_under_budget(citations: &[Citation], max_tokens: usize) -> Vec<String> {
  let mut facts = Vec::new();
  let mut used = 0usize;

  for citation in citations {
    for partition in &citation.partitions {
      if partition.text.is_empty() {
        continue;
      }
      let estimated = estimate_tokens(&partition.text);
      if used + estimated > max_tokens && !facts.is_empty() {
        return facts;
      }
      facts.push(partition.text.clone());
      used += estimated;
    }
  }
  facts
}

fn estimate_tokens(text: &str) -> usize {
  text.split_whitespace().count().max(1)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn facts_under_budget_stops_once_budget_exhausted() {
    let citations = vec![
      Citation {
        document_id: "doc1".into(),
        file_id: "f1".into(),
        source_name: "a.txt".into(),
        partitions: vec![CitationPartition { text: "one two three four five".into(), relevance: 0.9, partition_number: Some(0), section_number: None, last_update: chrono::Utc::now() }],
      },
      Citation {
        document_id: "doc2".into(),
        file_id: "f2".into(),
        source_name: "b.txt".into(),
        partitions: vec![CitationPartition { text: "six seven eight".into(), relevance: 0.8, partition_number: Some(0), section_number: None, last_update: chrono::Utc::now() }],
      },
    ];

    let facts = facts_under_budget(&citations, 5);
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0], "one two three four five");
  }

  #[test]
  fn facts_under_budget_always_includes_at_least_the_first_fact() {
    let citations = vec![Citation {
      document_id: "doc1".into(),
      file_id: "f1".into(),
      source_name: "a.txt".into(),
      partitions: vec![CitationPartition { text: "a very long fact that exceeds the tiny budget on its own".into(), relevance: 0.9, partition_number: Some(0), section_number: None, last_update: chrono::Utc::now() }],
    }];

    let facts = facts_under_budget(&citations, 1);
    assert_eq!(facts.len(), 1);
  }

  #[test]
  fn facts_under_budget_skips_empty_partition_text() {
    let citations = vec![Citation {
      document_id: "doc1".into(),
      file_id: "f1".into(),
      source_name: "a.txt".into(),
      partitions: vec![CitationPartition { text: String::new(), relevance: 0.9, partition_number: Some(0), section_number: None, last_update: chrono::Utc::now() }],
    }];

    assert!(facts_under_budget(&citations, 1000).is_empty());
  }

  mod engine {
    use super::*;
    use async_trait::async_trait;
    use km_core::{RecordId, TagSet, TAG_DOCUMENT_ID, TAG_PART_N};
    use tempfile::TempDir;

    struct EchoEmbedder;

    #[async_trait]
    impl Embedder for EchoEmbedder {
      fn name(&self) -> &str {
        "echo"
      }
      fn dimensions(&self) -> usize {
        1
      }
      async fn embed(&self, _text: &str) -> km_core::Result<Vec<f32>> {
        Ok(vec![1.0])
      }
      async fn embed_batch(&self, texts: &[&str]) -> km_core::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0]).collect())
      }
    }

    struct FixedGenerator;

    #[async_trait]
    impl Generator for FixedGenerator {
      async fn generate(&self, _prompt: &str) -> km_core::Result<String> {
        Ok("Paris.".to_string())
      }
    }

    struct FixedVecStore {
      records: Vec<(MemoryRecord, f32)>,
    }

    #[async_trait]
    impl VecStore for FixedVecStore {
      async fn create_index(&self, _index: &str, _vector_size: usize) -> km_core::Result<()> {
        Ok(())
      }
      async fn list_indexes(&self) -> km_core::Result<Vec<String>> {
        Ok(Vec::new())
      }
      async fn delete_index(&self, _index: &str) -> km_core::Result<()> {
        Ok(())
      }
      async fn upsert(&self, _index: &str, record: MemoryRecord) -> km_core::Result<RecordId> {
        Ok(record.id)
      }
      async fn delete(&self, _index: &str, _record_id: &RecordId) -> km_core::Result<()> {
        Ok(())
      }
      async fn delete_by_filter(&self, _index: &str, _filters: &[MemoryFilter]) -> km_core::Result<usize> {
        Ok(0)
      }
      async fn get_similar_list(&self, _index: &str, _embedding: &[f32], limit: usize, _min_relevance: f32, _filters: &[MemoryFilter], _with_embeddings: bool) -> km_core::Result<Vec<(MemoryRecord, f32)>> {
        Ok(self.records.iter().take(limit).cloned().collect())
      }
      async fn get_list(&self, _index: &str, _filters: &[MemoryFilter], _limit: usize, _with_embeddings: bool) -> km_core::Result<Vec<MemoryRecord>> {
        Ok(Vec::new())
      }
    }

    fn record_with_text(document_id: &str, text: &str, relevance: f32) -> (MemoryRecord, f32) {
      let mut tags = TagSet::new();
      tags.set_reserved(TAG_DOCUMENT_ID, document_id);
      tags.set_reserved(km_core::TAG_FILE_ID, "f1");
      tags.set_reserved(TAG_PART_N, "0");
      let record = MemoryRecord::new(RecordId::new(format!("{document_id}-r")), vec![1.0], tags).with_payload("sourceFile", "a.txt").with_payload("text", text);
      (record, relevance)
    }

    #[tokio::test]
    async fn search_returns_empty_result_when_no_matches() {
      let temp = TempDir::new().unwrap();
      let docs: Arc<dyn DocStore> = Arc::new(km_store::DocumentStore::new(temp.path()));
      let vectors: Arc<dyn VecStore> = Arc::new(FixedVecStore { records: Vec::new() });
      let engine = RetrievalEngine::new(docs, vectors, Arc::new(EchoEmbedder), None, RetrievalConfig::default());

      let result = engine.search("idx", "anything", &[], None, None).await.unwrap();
      assert!(result.no_result);
      assert!(result.results.is_empty());
    }

    #[tokio::test]
    async fn search_groups_matches_into_citations() {
      let temp = TempDir::new().unwrap();
      let docs: Arc<dyn DocStore> = Arc::new(km_store::DocumentStore::new(temp.path()));
      let vectors: Arc<dyn VecStore> = Arc::new(FixedVecStore { records: vec![record_with_text("doc1", "Paris is the capital of France.", 0.9)] });
      let engine = RetrievalEngine::new(docs, vectors, Arc::new(EchoEmbedder), None, RetrievalConfig::default());

      let result = engine.search("idx", "capital of France", &[], None, None).await.unwrap();
      assert!(!result.no_result);
      assert_eq!(result.results.len(), 1);
      assert_eq!(result.results[0].document_id, "doc1");
      assert_eq!(result.results[0].partitions[0].text, "Paris is the capital of France.");
    }

    #[tokio::test]
    async fn ask_without_generator_returns_empty_answer() {
      let temp = TempDir::new().unwrap();
      let docs: Arc<dyn DocStore> = Arc::new(km_store::DocumentStore::new(temp.path()));
      let vectors: Arc<dyn VecStore> = Arc::new(FixedVecStore { records: vec![record_with_text("doc1", "Paris is the capital of France.", 0.9)] });
      let engine = RetrievalEngine::new(docs, vectors, Arc::new(EchoEmbedder), None, RetrievalConfig::default());

      let answer = engine.ask("idx", "What is the capital of France?", &[], None).await.unwrap();
      assert!(answer.no_result);
      assert_eq!(answer.text, km_core::DEFAULT_EMPTY_ANSWER);
    }

    #[tokio::test]
    async fn ask_with_generator_returns_grounded_answer() {
      let temp = TempDir::new().unwrap();
      let docs: Arc<dyn DocStore> = Arc::new(km_store::DocumentStore::new(temp.path()));
      let vectors: Arc<dyn VecStore> = Arc::new(FixedVecStore { records: vec![record_with_text("doc1", "Paris is the capital of France.", 0.9)] });
      let engine = RetrievalEngine::new(docs, vectors, Arc::new(EchoEmbedder), Some(Arc::new(FixedGenerator)), RetrievalConfig::default());

      let answer = engine.ask("idx", "What is the capital of France?", &[], None).await.unwrap();
      assert!(!answer.no_result);
      assert_eq!(answer.text, "Paris.");
      assert_eq!(answer.relevant_sources.len(), 1);
    }
  }
}
