//! Benchmarks for batch planning and materialization against the in-memory engine.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use prebatch_query::memory::MemoryEngine;
use prebatch_query::{
    AggregateOp, BatchSpec, DatabaseType, FilterValue, GroupedAggregate, LookupRequest, Model,
    PrebatchConfig, Prebatcher, Record, RecordKey, RelationRegistry, RelationSpec,
    ResolvedRelation,
};
use tokio::runtime::Runtime;

#[derive(Clone)]
struct Post {
    id: i64,
    author_id: i64,
}

impl Model for Post {
    const MODEL_NAME: &'static str = "Post";
    const TABLE_NAME: &'static str = "posts";
    const PRIMARY_KEY: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &["id", "author_id"];

    fn key(&self) -> RecordKey {
        RecordKey::Int(self.id)
    }
}

fn create_runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

fn relations() -> Arc<RelationRegistry> {
    Arc::new(
        RelationRegistry::new()
            .with("Post", RelationSpec::one_to_many("comments", "Comment", "comments"))
            .with("Comment", RelationSpec::many_to_one("post", "Post", "posts")),
    )
}

fn posts(n: i64) -> Vec<Post> {
    (1..=n)
        .map(|id| Post {
            id,
            author_id: id % 50,
        })
        .collect()
}

fn engine(n: i64) -> Arc<MemoryEngine> {
    let engine = MemoryEngine::new();
    engine.insert(
        "comments",
        (0..n * 5).map(|i| {
            Record::new()
                .with("post_id", i % n + 1)
                .with("score", i % 17)
        }),
    );
    engine.insert(
        "users",
        (0..50).map(|id| Record::new().with("id", id).with("name", format!("user{}", id))),
    );
    Arc::new(engine)
}

// ============================================================================
// SQL Rendering
// ============================================================================

fn bench_grouped_sql(c: &mut Criterion) {
    let mut group = c.benchmark_group("grouped_sql");
    let relation = ResolvedRelation {
        association: "comments".into(),
        child_model: "Comment".into(),
        child_table: "comments".into(),
        foreign_key: "post_id".into(),
        inverse: "post".into(),
    };

    for size in [10, 100, 1000] {
        let ids: Vec<FilterValue> = (0..size).map(FilterValue::Int).collect();
        let query = GroupedAggregate::new(&relation, AggregateOp::Sum, Some("score"), ids);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("postgres", size), &query, |b, query| {
            b.iter(|| black_box(query.to_sql(DatabaseType::PostgreSQL)))
        });
    }

    group.finish();
}

// ============================================================================
// Materialization
// ============================================================================

fn bench_materialize(c: &mut Criterion) {
    let rt = create_runtime();
    let mut group = c.benchmark_group("materialize");

    for size in [100i64, 1000] {
        let engine = engine(size);
        let parents = posts(size);
        let spec = BatchSpec::<Post>::new()
            .count("comments")
            .sum("comments", "score")
            .lookup(
                "author",
                LookupRequest::one("users", "id", |p: &Post| Some(RecordKey::Int(p.author_id))),
            );

        group.throughput(Throughput::Elements(size as u64));

        for concurrent in [false, true] {
            let label = if concurrent { "concurrent" } else { "sequential" };
            group.bench_with_input(BenchmarkId::new(label, size), &size, |b, _| {
                b.to_async(&rt).iter(|| async {
                    let bound = Prebatcher::new(parents.clone(), engine.clone(), relations())
                        .with_spec(spec.clone())
                        .with_config(PrebatchConfig::new().concurrent_queries(concurrent))
                        .into_records()
                        .await
                        .unwrap();
                    black_box(bound);
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_grouped_sql, bench_materialize);
criterion_main!(benches);
