//! Benchmarks for content decoding and decoder selection.
//!
//! Run with: cargo bench -p km-decode

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use km_decode::{ContentDecoder, DecoderRegistry, PlainTextDecoder};

fn bench_plain_text_decode(c: &mut Criterion) {
  let rt = tokio::runtime::Runtime::new().unwrap();
  let decoder = PlainTextDecoder;

  let mut group = c.benchmark_group("plain_text_decode");

  for size in [100, 1_000, 10_000, 50_000].iter() {
    let content = "word ".repeat(*size / 5 + 1).into_bytes();
    group.throughput(Throughput::Bytes(content.len() as u64));
    group.bench_with_input(BenchmarkId::from_parameter(size), &content, |b, content| {
      b.iter(|| rt.block_on(decoder.decode(black_box(content))).unwrap());
    });
  }

  group.finish();
}

fn bench_registry_select(c: &mut Criterion) {
  let registry = DecoderRegistry::with_defaults();

  let mut group = c.benchmark_group("registry_select");

  group.bench_function("plain_text", |b| {
    b.iter(|| registry.select(black_box("text/plain"), black_box("notes.txt")));
  });

  group.bench_function("content_url", |b| {
    b.iter(|| registry.select(black_box("text/plain"), black_box("content.url")));
  });

  group.bench_function("unknown", |b| {
    b.iter(|| registry.select(black_box("application/octet-stream"), black_box("photo.png")));
  });

  group.finish();
}

criterion_group!(benches, bench_plain_text_decode, bench_registry_select);
criterion_main!(benches);
