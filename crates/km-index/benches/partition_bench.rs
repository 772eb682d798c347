//! Benchmarks for the deterministic text partitioner.
//!
//! Run with: cargo bench -p km-index

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use km_core::ChunkingConfig;
use km_index::Chunker;

fn paragraphs(n: usize) -> String {
  (0..n).map(|i| format!("Paragraph number {i} discusses a handful of unrelated facts in plain prose.")).collect::<Vec<_>>().join("\n\n")
}

fn bench_partition(c: &mut Criterion) {
  let chunker = Chunker::new(ChunkingConfig::default());

  let mut group = c.benchmark_group("partition");

  for count in [10, 100, 1_000].iter() {
    let text = paragraphs(*count);
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_with_input(BenchmarkId::from_parameter(count), &text, |b, text| {
      b.iter(|| chunker.partition(black_box(text)));
    });
  }

  group.finish();
}

fn bench_partition_multi_section(c: &mut Criterion) {
  let chunker = Chunker::new(ChunkingConfig::default());
  let text = (0..20).map(|_| paragraphs(10)).collect::<Vec<_>>().join("\x0c");

  let mut group = c.benchmark_group("partition_multi_section");
  group.bench_function("20_sections", |b| {
    b.iter(|| chunker.partition(black_box(&text)));
  });
  group.finish();
}

criterion_group!(benches, bench_partition, bench_partition_multi_section);
criterion_main!(benches);
