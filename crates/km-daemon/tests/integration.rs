//! End-to-end tests driving the full ingestion pipeline and retrieval engine
//! together,
//! with an in-process orchestrator, a real on-disk document store and vector
//! store, and deterministic word-overlap embeddings so relevance ordering is
//! predictable without a running embedding service.

use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use km_core::{Config, DocStore, Embedder, Generator, MemoryFilter, TagSet, UploadFile, VecStore};
use km_daemon::{ExecutionMode, Orchestrator, Queue, RetrievalEngine, UploadRequest};
use km_store::{DocumentStore, VectorDb, VectorStore};

const DIM: usize = 32;

/// Deterministic bag-of-words embedder: each distinct lowercase word hashes
/// into one of `DIM` buckets, which are then L2-normalized. Two texts sharing
/// vocabulary score a high cosine similarity; disjoint vocabularies score
/// near zero. Good enough to exercise ranking and filtering without a real
/// model.
struct WordHashEmbedder;

fn hash_embed(text: &str) -> Vec<f32> {
  let mut v = vec![0f32; DIM];
  for word in text.split_whitespace() {
    let word = word.to_lowercase();
    let bucket = word.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64)) as usize % DIM;
    v[bucket] += 1.0;
  }
  let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
  if norm > 0.0 {
    for x in v.iter_mut() {
      *x /= norm;
    }
  }
  v
}

#[async_trait]
impl Embedder for WordHashEmbedder {
  fn name(&self) -> &str {
    "word-hash"
  }
  fn dimensions(&self) -> usize {
    DIM
  }
  async fn embed(&self, text: &str) -> km_core::Result<Vec<f32>> {
    Ok(hash_embed(text))
  }
  async fn embed_batch(&self, texts: &[&str]) -> km_core::Result<Vec<Vec<f32>>> {
    Ok(texts.iter().map(|t| hash_embed(t)).collect())
  }
}

/// Echoes the assembled facts back as the "answer", so `Ask` assertions can
/// check the retrieved grounding without depending on a real LLM.
struct EchoGenerator;

#[async_trait]
impl Generator for EchoGenerator {
  async fn generate(&self, prompt: &str) -> km_core::Result<String> {
    Ok(prompt.to_string())
  }
}

struct Harness {
  _temp: TempDir,
  orchestrator: Orchestrator,
  retrieval: RetrievalEngine,
}

async fn harness() -> Harness {
  let temp = TempDir::new().unwrap();
  let docs: Arc<dyn DocStore> = Arc::new(DocumentStore::new(temp.path().join("docs")));
  let vector_db = VectorDb::open(&temp.path().join("vectors.lance")).await.unwrap();
  let config = Config::default();
  let vectors: Arc<dyn VecStore> = Arc::new(VectorStore::new(vector_db, config.index_naming.default_index.clone()));
  let embedder: Arc<dyn Embedder> = Arc::new(WordHashEmbedder);
  let generator: Arc<dyn Generator> = Arc::new(EchoGenerator);
  let queue = Arc::new(Queue::new(config.queue.clone()));

  let mut handlers = km_index::ingestion_handlers();
  handlers.push(Box::new(km_index::DeleteDocumentHandler));
  handlers.push(Box::new(km_index::DeleteIndexHandler));

  let orchestrator = Orchestrator::new(docs.clone(), vectors.clone(), vec![embedder.clone()], Some(generator.clone()), config.clone(), handlers, queue, ExecutionMode::InProcess);
  let retrieval = RetrievalEngine::new(docs, vectors, embedder, Some(generator), config.retrieval);

  Harness { _temp: temp, orchestrator, retrieval }
}

fn upload(document_id: &str, file_name: &str, content: &str, tags: &[(&str, &str)]) -> UploadRequest {
  let mut tag_set = TagSet::new();
  for (k, v) in tags {
    tag_set.insert_user(k, Some(v.to_string())).unwrap();
  }
  UploadRequest { document_id: Some(document_id.to_string()), tags: tag_set, files: vec![UploadFile { name: file_name.to_string(), bytes: content.as_bytes().to_vec() }], steps: None }
}

/// S1 — single file: import one document, wait for readiness, then `Ask` a
/// question whose answer lives in the file and expect it cited.
#[tokio::test]
async fn s1_single_file_round_trip() {
  let h = harness().await;

  h.orchestrator.import_document("news", upload("doc1", "manual.txt", "The product name is Orion.", &[("type", "news")])).await.unwrap();
  assert!(h.orchestrator.is_document_ready("news", "doc1").await.unwrap());

  let filter = MemoryFilter::new().by_tag("type", "news");
  let answer = h.retrieval.ask("news", "What is the product name Orion?", &[filter], Some(-1.0)).await.unwrap();

  assert!(!answer.no_result);
  assert_eq!(answer.relevant_sources[0].document_id, "doc1");
  assert!(answer.text.contains("Orion"));
}

/// S2 — tag isolation: two documents tagged by different users; filtering by
/// a third user's tag returns nothing, and filtering by one user's tag only
/// grounds the answer in that user's document.
#[tokio::test]
async fn s2_tag_filter_isolates_documents() {
  let h = harness().await;

  h.orchestrator.import_document("idx", upload("alice-doc", "a.txt", "Alice likes the color blue.", &[("user", "alice")])).await.unwrap();
  h.orchestrator.import_document("idx", upload("bob-doc", "b.txt", "Bob likes the color green.", &[("user", "bob")])).await.unwrap();

  let eve_filter = MemoryFilter::new().by_tag("user", "eve");
  let eve_answer = h.retrieval.ask("idx", "What color do they like?", &[eve_filter], Some(-1.0)).await.unwrap();
  assert!(eve_answer.no_result);

  let alice_filter = MemoryFilter::new().by_tag("user", "alice");
  let alice_answer = h.retrieval.ask("idx", "What color do they like?", &[alice_filter], Some(-1.0)).await.unwrap();
  assert!(!alice_answer.no_result);
  assert_eq!(alice_answer.relevant_sources.len(), 1);
  assert_eq!(alice_answer.relevant_sources[0].document_id, "alice-doc");
}

/// S3 — multi-filter OR: two disjoint `(user, type)` filters, each matching
/// one of two documents, together make both documents eligible.
#[tokio::test]
async fn s3_multi_filter_is_unioned() {
  let h = harness().await;

  h.orchestrator.import_document("idx", upload("admin-doc", "a.txt", "The launch date is announced.", &[("user", "admin"), ("type", "news")])).await.unwrap();
  h.orchestrator.import_document("idx", upload("owner-doc", "b.txt", "The launch date is confirmed.", &[("user", "owner"), ("type", "fact")])).await.unwrap();

  let filters = vec![MemoryFilter::new().by_tag("user", "admin").by_tag("type", "news"), MemoryFilter::new().by_tag("user", "owner").by_tag("type", "fact")];

  let result = h.retrieval.search("idx", "launch date", &filters, None, Some(-1.0)).await.unwrap();
  assert!(!result.no_result);
  let ids: Vec<&str> = result.results.iter().map(|c| c.document_id.as_str()).collect();
  assert!(ids.contains(&"admin-doc"));
  assert!(ids.contains(&"owner-doc"));
}

/// S4 — re-ingest: importing the same document id again with different
/// content replaces its records rather than accumulating duplicates.
#[tokio::test]
async fn s4_reingest_replaces_prior_content() {
  let h = harness().await;

  h.orchestrator.import_document("idx", upload("doc1", "a.txt", "AAAA content alpha.", &[])).await.unwrap();
  let first = h.retrieval.search("idx", "content alpha", &[], None, Some(-1.0)).await.unwrap();
  assert!(!first.no_result);

  h.orchestrator.import_document("idx", upload("doc1", "a.txt", "BBBB content beta.", &[])).await.unwrap();

  let alpha_after = h.retrieval.search("idx", "AAAA", &[], None, Some(0.5)).await.unwrap();
  assert!(alpha_after.no_result, "stale partition from first ingest must not survive re-ingest");

  let beta_after = h.retrieval.search("idx", "BBBB", &[], None, Some(0.5)).await.unwrap();
  assert!(!beta_after.no_result);
  assert_eq!(beta_after.results[0].document_id, "doc1");
}

/// S5 — delete: deleting a document tears down its records and leaves
/// `status.json` reporting `completed && empty`; later searches never cite it.
#[tokio::test]
async fn s5_delete_document_removes_records_and_marks_empty() {
  let h = harness().await;

  h.orchestrator.import_document("idx", upload("doc1", "a.txt", "This document should vanish entirely.", &[])).await.unwrap();
  assert!(h.orchestrator.is_document_ready("idx", "doc1").await.unwrap());

  h.orchestrator.start_document_deletion("idx", "doc1").await.unwrap();

  let summary = h.orchestrator.read_pipeline_summary("idx", "doc1").await.unwrap();
  assert!(summary.completed);
  assert!(summary.empty);

  let result = h.retrieval.search("idx", "vanish entirely", &[], None, Some(-1.0)).await.unwrap();
  assert!(result.results.iter().all(|c| c.document_id != "doc1"));
}

/// Property 2 — isolation: a search in index A never returns a record that
/// was imported into index B, even with identical content.
#[tokio::test]
async fn index_isolation_holds_across_identical_content() {
  let h = harness().await;

  h.orchestrator.import_document("index-a", upload("doc1", "a.txt", "Shared wording about whales.", &[])).await.unwrap();
  h.orchestrator.import_document("index-b", upload("doc1", "a.txt", "Shared wording about whales.", &[])).await.unwrap();

  let result = h.retrieval.search("index-a", "whales", &[], None, Some(-1.0)).await.unwrap();
  assert!(!result.no_result);
  assert!(result.results.iter().all(|c| c.document_id == "doc1"));

  // Deleting the b-index copy must not affect a's records.
  h.orchestrator.start_document_deletion("index-b", "doc1").await.unwrap();
  let still_there = h.retrieval.search("index-a", "whales", &[], None, Some(-1.0)).await.unwrap();
  assert!(!still_there.no_result);
}

/// Property 5 — step ordering: a successful pipeline's `completed_steps` is
/// always a prefix of the full `steps` list, in order.
#[tokio::test]
async fn completed_steps_is_a_prefix_of_steps() {
  let h = harness().await;
  h.orchestrator.import_document("idx", upload("doc1", "a.txt", "Some content here.", &[])).await.unwrap();

  let summary = h.orchestrator.read_pipeline_summary("idx", "doc1").await.unwrap();
  assert_eq!(summary.completed_steps, summary.steps);
  assert!(summary.remaining_steps.is_empty());
}

/// A step handler that fails with a transient error the first `fail_times`
/// invocations, then succeeds by passing the pipeline through unchanged.
struct FlakyHandler {
  fail_times: usize,
  attempts: std::sync::atomic::AtomicUsize,
}

#[async_trait]
impl km_core::StepHandler for FlakyHandler {
  fn step_name(&self) -> &'static str {
    "flaky"
  }
  async fn invoke(&self, _ctx: &km_core::HandlerContext<'_>, pipeline: km_core::DataPipeline) -> km_core::Result<km_core::DataPipeline> {
    let n = self.attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    if n < self.fail_times {
      return Err(km_core::Error::transient("simulated transient failure"));
    }
    Ok(pipeline)
  }
}

/// S6 — transient failure then recovery: a step that fails twice with a
/// retryable error before succeeding still completes, via
/// `run_to_completion`'s retry/backoff loop, with the same outcome as a step
/// that succeeds on the first attempt.
#[tokio::test]
async fn s6_transient_failure_recovers_via_retry() {
  let temp = TempDir::new().unwrap();
  let docs: Arc<dyn DocStore> = Arc::new(DocumentStore::new(temp.path().join("docs")));
  let vector_db = VectorDb::open(&temp.path().join("vectors.lance")).await.unwrap();
  let mut config = Config::default();
  config.queue.retry_backoff_ms = 5;
  let vectors: Arc<dyn VecStore> = Arc::new(VectorStore::new(vector_db, config.index_naming.default_index.clone()));
  let embedder: Arc<dyn Embedder> = Arc::new(WordHashEmbedder);
  let queue = Arc::new(Queue::new(config.queue.clone()));

  let handlers: Vec<Box<dyn km_core::StepHandler>> = vec![Box::new(FlakyHandler { fail_times: 2, attempts: std::sync::atomic::AtomicUsize::new(0) })];
  let orchestrator = Orchestrator::new(docs, vectors, vec![embedder], None, config, handlers, queue, ExecutionMode::InProcess);

  let request = UploadRequest {
    document_id: Some("doc1".to_string()),
    tags: TagSet::new(),
    files: vec![UploadFile { name: "a.txt".to_string(), bytes: b"content".to_vec() }],
    steps: Some(vec!["flaky".to_string()]),
  };
  orchestrator.import_document("idx", request).await.unwrap();

  let summary = orchestrator.read_pipeline_summary("idx", "doc1").await.unwrap();
  assert!(summary.completed);
  assert!(!summary.failed);
  assert_eq!(summary.completed_steps, vec!["flaky".to_string()]);
}

/// Property 3 — idempotence: re-ingesting byte-identical content under the
/// same document id leaves the same set of records behind rather than
/// accumulating duplicates.
#[tokio::test]
async fn reingesting_identical_content_is_idempotent() {
  let h = harness().await;

  h.orchestrator.import_document("idx", upload("doc1", "a.txt", "Idempotent content about rivers.", &[])).await.unwrap();
  let first = h.retrieval.search("idx", "rivers", &[], None, Some(-1.0)).await.unwrap();
  assert_eq!(first.results.len(), 1);
  assert_eq!(first.results[0].partitions.len(), 1);

  h.orchestrator.import_document("idx", upload("doc1", "a.txt", "Idempotent content about rivers.", &[])).await.unwrap();
  let second = h.retrieval.search("idx", "rivers", &[], None, Some(-1.0)).await.unwrap();

  assert_eq!(second.results.len(), first.results.len());
  assert_eq!(second.results[0].partitions.len(), first.results[0].partitions.len());
}

/// Property 6 — filter union is deduplicated: a document matching more than
/// one OR'd filter group appears exactly once in the unioned results, not
/// once per matching group.
#[tokio::test]
async fn overlapping_filter_union_is_deduplicated_by_record_id() {
  let h = harness().await;

  h.orchestrator.import_document("idx", upload("doc1", "a.txt", "The harbor light guided the ship home.", &[("user", "admin"), ("type", "news")])).await.unwrap();

  let single = vec![MemoryFilter::new().by_tag("user", "admin")];
  let single_result = h.retrieval.search("idx", "harbor light", &single, None, Some(-1.0)).await.unwrap();
  assert_eq!(single_result.results[0].partitions.len(), 1);

  let union_filters = vec![MemoryFilter::new().by_tag("user", "admin"), MemoryFilter::new().by_tag("type", "news")];
  let union_result = h.retrieval.search("idx", "harbor light", &union_filters, None, Some(-1.0)).await.unwrap();
  assert_eq!(union_result.results.len(), 1);
  assert_eq!(union_result.results[0].partitions.len(), single_result.results[0].partitions.len());
}

/// Property 7 — score monotonicity: citations come back ordered by
/// non-increasing best-partition relevance, checked across more than two
/// results.
#[tokio::test]
async fn search_results_are_ordered_by_non_increasing_relevance() {
  let h = harness().await;

  h.orchestrator.import_document("idx", upload("doc-high", "a.txt", "comet comet comet galaxy nebula", &[])).await.unwrap();
  h.orchestrator.import_document("idx", upload("doc-mid", "b.txt", "comet galaxy unrelated unrelated unrelated", &[])).await.unwrap();
  h.orchestrator.import_document("idx", upload("doc-low", "c.txt", "comet unrelated unrelated unrelated unrelated", &[])).await.unwrap();

  let result = h.retrieval.search("idx", "comet galaxy nebula", &[], None, Some(-1.0)).await.unwrap();
  assert!(result.results.len() >= 3, "expected at least three distinct citations to assert ordering over");

  let scores: Vec<f32> = result.results.iter().map(|c| c.partitions.first().map(|p| p.relevance).unwrap_or(0.0)).collect();
  for pair in scores.windows(2) {
    assert!(pair[0] >= pair[1], "citations must be non-increasing by best relevance: {scores:?}");
  }
}

/// Checking status for a document that was never imported is not an error,
/// just "not ready".
#[tokio::test]
async fn unknown_document_is_not_ready_and_not_an_error() {
  let h = harness().await;
  assert!(!h.orchestrator.is_document_ready("idx", "never-imported").await.unwrap());
}

/// Reserved tags set by `save_records` must locate the originating document
/// even when the caller supplies no tags at all.
#[tokio::test]
async fn records_carry_reserved_document_id_tag() {
  let h = harness().await;
  h.orchestrator.import_document("idx", upload("doc1", "a.txt", "Traceable content for tagging.", &[])).await.unwrap();

  let filter = MemoryFilter::new().by_tag(km_core::TAG_DOCUMENT_ID, "doc1");
  let result = h.retrieval.search("idx", "traceable content", &[filter], None, Some(-1.0)).await.unwrap();
  assert!(!result.no_result);
}
