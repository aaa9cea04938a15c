//! Codec benchmarks for huddle-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use huddle_protocol::{codec, Envelope};
use serde_json::json;

fn bench_encode_small(c: &mut Criterion) {
    let env = Envelope::message("lobby", "user-1", json!("x".repeat(64)));

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(1));
    group.bench_function("small_64B", |b| b.iter(|| codec::encode(black_box(&env))));
    group.finish();
}

fn bench_decode_small(c: &mut Criterion) {
    let env = Envelope::message("lobby", "user-1", json!("x".repeat(64)));
    let encoded = codec::encode(&env).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("small_64B", |b| {
        b.iter(|| codec::decode(black_box(encoded.as_bytes())))
    });
    group.finish();
}

fn bench_structured_content(c: &mut Criterion) {
    let env = Envelope::message(
        "team:ops",
        "user-42",
        json!({ "text": "deploy finished", "tags": ["prod", "eu"], "seq": 1024 }),
    );

    c.bench_function("structured_content", |b| {
        b.iter(|| {
            let encoded = codec::encode(black_box(&env)).unwrap();
            codec::decode(black_box(encoded.as_bytes())).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_encode_small,
    bench_decode_small,
    bench_structured_content
);
criterion_main!(benches);
