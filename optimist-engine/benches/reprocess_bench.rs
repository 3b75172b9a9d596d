//! Benchmarks for reprocessing after events

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use optimist_engine::prelude::*;
use serde_json::{json, Value};

/// Engine with one collection of `size` docs and a handful of listeners on it
fn setup_engine(size: usize) -> Engine {
    let mut engine = Engine::new();
    let docs: Vec<Value> = (0..size)
        .map(|i| json!({"id": format!("d{i:05}"), "rank": i, "group": i % 7}))
        .collect();

    for group in 0..4 {
        let query = QueryDescriptor::collection("items")
            .with_where(WhereClause::new("group", Operator::Eq, json!(group)))
            .with_order(OrderBy::desc("rank"))
            .with_limit(20);
        let members: Vec<Value> = docs
            .iter()
            .rev()
            .filter(|doc| doc["group"] == json!(group))
            .take(20)
            .cloned()
            .collect();
        engine
            .dispatch(
                &Event::new(EventKind::ListenerResponse)
                    .with_meta(query)
                    .with_data(Value::Array(members)),
            )
            .expect("group listener");
    }

    engine
        .dispatch(
            &Event::new(EventKind::ListenerResponse)
                .with_meta("items")
                .with_data(Value::Array(docs)),
        )
        .expect("seed listener");
    engine
}

fn bench_optimistic_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimistic_write");
    for size in [100, 1_000, 10_000] {
        let mut engine = setup_engine(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let event = Event::new(EventKind::MutateStart)
                    .with_args(Write::new("items", "d00001", json!({"rank": ["::increment", 1]})));
                black_box(engine.dispatch(&event).expect("mutate"));
            })
        });
    }
    group.finish();
}

fn bench_confirmed_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("confirmed_write");
    for size in [100, 1_000, 10_000] {
        let mut engine = setup_engine(size);
        let mut rank = 0u64;
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                rank += 1;
                let event = Event::new(EventKind::DocumentModified)
                    .with_meta("items")
                    .with_data(json!({"id": "d00002", "rank": rank, "group": 2}));
                black_box(engine.dispatch(&event).expect("modify"));
            })
        });
    }
    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let engine = setup_engine(1_000);
    c.bench_function("resolve_items", |b| {
        b.iter(|| black_box(engine.resolve(black_box("items"))))
    });
}

criterion_group!(
    benches,
    bench_optimistic_write,
    bench_confirmed_write,
    bench_resolve
);
criterion_main!(benches);
