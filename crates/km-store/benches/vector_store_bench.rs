//! Benchmarks for vector store operations.
//!
//! Uses synthetic vectors so the numbers isolate store/LanceDB performance
//! from embedding service latency. Run with: cargo bench -p km-store

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use km_core::{MemoryRecord, RecordId, TagSet};
use km_store::connection::VectorDb;
use km_store::vector_store::VectorStore;
use tempfile::TempDir;

const DIM: usize = 768;
const INDEX: &str = "bench";

fn vector_for(seed: usize) -> Vec<f32> {
  (0..DIM).map(|i| ((seed + i) as f32 * 0.001).sin()).collect()
}

async fn new_store(temp_dir: &TempDir) -> VectorStore {
  let db = VectorDb::open(&temp_dir.path().join("test.lancedb")).await.unwrap();
  let store = VectorStore::new(db, "default");
  store.create_index(INDEX, DIM).await.unwrap();
  store
}

fn record(seed: usize) -> MemoryRecord {
  let mut tags = TagSet::new();
  tags.set_reserved(km_core::TAG_DOCUMENT_ID, format!("doc-{seed}"));
  MemoryRecord::new(RecordId::new(format!("rec-{seed}")), vector_for(seed), tags)
}

fn bench_upsert(c: &mut Criterion) {
  let rt = tokio::runtime::Runtime::new().unwrap();

  let mut group = c.benchmark_group("vector_store_upsert");
  group.throughput(Throughput::Elements(1));

  group.bench_function("single", |b| {
    b.iter(|| {
      rt.block_on(async {
        let temp_dir = TempDir::new().unwrap();
        let store = new_store(&temp_dir).await;
        store.upsert(INDEX, black_box(record(0))).await.unwrap();
      });
    });
  });

  group.finish();
}

fn bench_batch_upsert(c: &mut Criterion) {
  let rt = tokio::runtime::Runtime::new().unwrap();

  let mut group = c.benchmark_group("vector_store_batch_upsert");

  for size in [10, 50, 100].iter() {
    group.throughput(Throughput::Elements(*size as u64));
    group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
      b.iter(|| {
        rt.block_on(async {
          let temp_dir = TempDir::new().unwrap();
          let store = new_store(&temp_dir).await;
          for i in 0..size {
            store.upsert(INDEX, record(i)).await.unwrap();
          }
        });
      });
    });
  }

  group.finish();
}

fn bench_similar_search(c: &mut Criterion) {
  let rt = tokio::runtime::Runtime::new().unwrap();

  let (store, _temp_dir) = rt.block_on(async {
    let temp_dir = TempDir::new().unwrap();
    let store = new_store(&temp_dir).await;
    for i in 0..100 {
      store.upsert(INDEX, record(i)).await.unwrap();
    }
    (store, temp_dir)
  });

  let mut group = c.benchmark_group("vector_store_similar_search");

  for limit in [5, 10, 20].iter() {
    group.bench_with_input(BenchmarkId::from_parameter(limit), limit, |b, &limit| {
      let query_vec = vector_for(1000);
      b.iter(|| {
        rt.block_on(async {
          store.get_similar_list(INDEX, black_box(&query_vec), black_box(limit), 0.0, &[], false).await.unwrap();
        });
      });
    });
  }

  group.finish();
}

fn bench_list(c: &mut Criterion) {
  let rt = tokio::runtime::Runtime::new().unwrap();

  let (store, _temp_dir) = rt.block_on(async {
    let temp_dir = TempDir::new().unwrap();
    let store = new_store(&temp_dir).await;
    for i in 0..200 {
      store.upsert(INDEX, record(i)).await.unwrap();
    }
    (store, temp_dir)
  });

  let mut group = c.benchmark_group("vector_store_list");

  group.bench_function("no_filter", |b| {
    b.iter(|| {
      rt.block_on(async { store.get_list(INDEX, &[], 50, false).await.unwrap() });
    });
  });

  group.finish();
}

criterion_group!(benches, bench_upsert, bench_batch_upsert, bench_similar_search, bench_list);
criterion_main!(benches);
