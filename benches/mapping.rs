use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use quotaroll_core::mapping::{daily_detail_ids, map_buckets};
use quotaroll_core::query::{
    AggregationProfile, GROUP_AGGREGATION, NAMES_AGGREGATION, QUOTAS_AGGREGATION,
    build_aggregate_query,
};
use quotaroll_core::types::Period;
use serde_json::{Value, json};
use std::hint::black_box;

fn create_response(organizations: usize) -> Value {
    let buckets: Vec<Value> = (0..organizations)
        .map(|i| {
            json!({
                "key": format!("org-{i:06}"),
                "doc_count": 720,
                "memory_limit": { "value": (i as f64) * 1024.0 },
                NAMES_AGGREGATION: {
                    "sum_other_doc_count": 0,
                    "buckets": [{ "key": format!("org name {i}"), "doc_count": 720 }]
                },
                QUOTAS_AGGREGATION: {
                    "sum_other_doc_count": 0,
                    "buckets": [
                        { "key": "q-default", "doc_count": 360 },
                        { "key": format!("q-{}", i % 7), "doc_count": 360 }
                    ]
                }
            })
        })
        .collect();

    json!({
        "timed_out": false,
        "aggregations": {
            GROUP_AGGREGATION: { "sum_other_doc_count": 0, "buckets": buckets }
        }
    })
}

fn bench_map_buckets(c: &mut Criterion) {
    let period = Period::new(2024, 3).unwrap();
    let profile = AggregationProfile::quotas();
    let mut group = c.benchmark_group("map_buckets");

    for size in [10, 1_000, 10_000] {
        let response = create_response(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &response, |b, response| {
            b.iter(|| map_buckets(black_box(response), period, &profile).unwrap());
        });
    }
    group.finish();
}

fn bench_query_building(c: &mut Criterion) {
    let period = Period::new(2024, 3).unwrap();
    let profile = AggregationProfile::container_memory();

    c.bench_function("build_aggregate_query", |b| {
        b.iter(|| build_aggregate_query(black_box(period), &profile))
    });
    c.bench_function("daily_detail_ids", |b| {
        b.iter(|| daily_detail_ids(black_box("org-000001"), period))
    });
}

criterion_group!(benches, bench_map_buckets, bench_query_building);
criterion_main!(benches);
