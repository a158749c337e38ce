//! Key-range builder benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use stratadb_core::{build_range, QueryOp};
use stratadb_storage::Value;

fn bench_build_range(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_range");

    let number = Value::from(42);
    let text = Value::from("alice@example.com");
    let between = Value::map([("low", Value::from(10)), ("high", Value::from(20))]);

    group.bench_function("exact_number", |b| {
        b.iter(|| black_box(build_range(black_box(&number), None).unwrap()));
    });
    group.bench_function("exact_text", |b| {
        b.iter(|| black_box(build_range(black_box(&text), None).unwrap()));
    });
    group.bench_function("greater_than", |b| {
        b.iter(|| {
            black_box(build_range(black_box(&number), Some(QueryOp::GreaterThan)).unwrap())
        });
    });
    group.bench_function("between", |b| {
        b.iter(|| black_box(build_range(black_box(&between), Some(QueryOp::Between)).unwrap()));
    });
    group.bench_function("from_symbol", |b| {
        b.iter(|| black_box(QueryOp::from_symbol(black_box(">="))));
    });

    group.finish();
}

criterion_group!(benches, bench_build_range);
criterion_main!(benches);
