//! Aggregation pipeline tests against the in-process store

mod common;

use common::{PollDocumentBuilder, container_metric, utc};
use quotaroll::pipeline::{AggregationJob, SnapshotOutcome, run_aggregation};
use quotaroll_core::QuotarollError;
use quotaroll_core::memory_store::MemoryStore;
use quotaroll_core::query::AggregationProfile;
use quotaroll_core::snapshot::read_snapshot;
use quotaroll_core::types::Period;
use std::path::PathBuf;
use tempfile::TempDir;

const POLL_INDEX: &str = "quotas-poll";
const MONTHLY_INDEX: &str = "quotas-monthly";

fn quota_job(period: &str) -> AggregationJob {
    AggregationJob {
        period: period.parse().unwrap(),
        profile: AggregationProfile::quotas(),
        source_index: POLL_INDEX.to_string(),
        destination_index: MONTHLY_INDEX.to_string(),
        detail_index: None,
        snapshot_dir: None,
    }
}

/// org-a polled twice (100 then 200), org-b once (50), all in March 2024
fn seed_march(store: &MemoryStore) {
    PollDocumentBuilder::new("org-a")
        .with_name("alpha")
        .with_quota("q-small", 100)
        .at(utc(2024, 3, 1, 6, 0, 0))
        .insert_into(store, POLL_INDEX);
    PollDocumentBuilder::new("org-a")
        .with_name("alpha")
        .with_quota("q-large", 200)
        .at(utc(2024, 3, 2, 6, 0, 0))
        .insert_into(store, POLL_INDEX);
    PollDocumentBuilder::new("org-b")
        .with_name("beta")
        .with_quota("q-tiny", 50)
        .at(utc(2024, 3, 1, 6, 0, 0))
        .insert_into(store, POLL_INDEX);
}

#[tokio::test]
async fn test_monthly_sums_per_organization() {
    let store = MemoryStore::new();
    seed_march(&store);

    let report = run_aggregation(&store, &quota_job("2024-03")).await.unwrap();

    assert_eq!(report.documents.len(), 2);
    let a = &report.documents[0];
    assert_eq!(a.id, "2024-03-org-a");
    assert_eq!(a.metric("memory_limit"), Some(300.0));
    assert_eq!(a.quota_ids, vec!["q-large", "q-small"]);
    assert_eq!(a.organization_names, vec!["alpha"]);
    assert_eq!(a.date, utc(2024, 3, 1, 0, 0, 0));

    let b = &report.documents[1];
    assert_eq!(b.id, "2024-03-org-b");
    assert_eq!(b.metric("memory_limit"), Some(50.0));

    let stored = store.documents(MONTHLY_INDEX);
    assert_eq!(stored.len(), 2);
    assert_eq!(stored["2024-03-org-a"]["memory_limit"], 300.0);
    assert_eq!(stored["2024-03-org-a"]["period"], "2024-03");
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let store = MemoryStore::new();
    seed_march(&store);
    let job = quota_job("2024-03");

    let first = run_aggregation(&store, &job).await.unwrap();
    let stored_after_first = store.documents(MONTHLY_INDEX);
    let second = run_aggregation(&store, &job).await.unwrap();

    assert_eq!(first.documents, second.documents);
    assert_eq!(store.documents(MONTHLY_INDEX), stored_after_first);
    assert_eq!(store.len(MONTHLY_INDEX), 2);
}

#[tokio::test]
async fn test_month_boundary_counts_each_poll_once() {
    let store = MemoryStore::new();
    PollDocumentBuilder::new("org-a")
        .with_quota("q-1", 10)
        .at(utc(2024, 3, 1, 0, 0, 0))
        .insert_into(&store, POLL_INDEX);
    PollDocumentBuilder::new("org-a")
        .with_quota("q-1", 20)
        .at(utc(2024, 3, 31, 23, 59, 59))
        .insert_into(&store, POLL_INDEX);
    PollDocumentBuilder::new("org-a")
        .with_quota("q-1", 40)
        .at(utc(2024, 4, 1, 0, 0, 0))
        .insert_into(&store, POLL_INDEX);

    let march = run_aggregation(&store, &quota_job("2024-03")).await.unwrap();
    let april = run_aggregation(&store, &quota_job("2024-04")).await.unwrap();

    assert_eq!(march.documents[0].metric("memory_limit"), Some(30.0));
    assert_eq!(april.documents[0].metric("memory_limit"), Some(40.0));
    assert_eq!(store.len(MONTHLY_INDEX), 2);
}

#[tokio::test]
async fn test_empty_month_writes_nothing() {
    let store = MemoryStore::new();
    seed_march(&store);

    let report = run_aggregation(&store, &quota_job("2023-12")).await.unwrap();
    assert!(report.documents.is_empty());
    assert_eq!(report.written.written, 0);
    assert_eq!(store.bulk_requests(), 0);
}

#[tokio::test]
async fn test_daily_detail_has_one_entry_per_day() {
    let store = MemoryStore::new();
    PollDocumentBuilder::new("org-a")
        .with_quota("q-1", 10)
        .at(utc(2024, 2, 10, 6, 0, 0))
        .insert_into(&store, POLL_INDEX);
    // Day records keyed by organization and date
    store.insert(POLL_INDEX, "org-a-2024-02-10", serde_json::json!({"memory_limit": 10}));
    store.insert(POLL_INDEX, "org-a-2024-02-29", serde_json::json!({"memory_limit": 10}));

    let mut job = quota_job("2024-02");
    job.detail_index = Some(POLL_INDEX.to_string());
    let report = run_aggregation(&store, &job).await.unwrap();

    let detail = report.documents[0].daily_detail.as_ref().unwrap();
    assert_eq!(detail.len(), 29);
    assert_eq!(detail[0].id, "org-a-2024-02-01");
    assert!(detail[9].found);
    assert!(detail[28].found);
    assert_eq!(detail.iter().filter(|r| r.found).count(), 2);

    let stored = store.documents(MONTHLY_INDEX);
    assert_eq!(
        stored["2024-02-org-a"]["daily_detail"].as_array().unwrap().len(),
        29
    );
}

#[tokio::test]
async fn test_group_cap_truncation_fails_the_run() {
    let store = MemoryStore::new();
    seed_march(&store);

    let mut job = quota_job("2024-03");
    job.profile = AggregationProfile::quotas().with_group_cap(1);

    let err = run_aggregation(&store, &job).await.unwrap_err();
    assert!(matches!(err, QuotarollError::Query(_)));
    assert_eq!(store.bulk_requests(), 0);
}

#[tokio::test]
async fn test_partial_write_reports_failed_ids() {
    let store = MemoryStore::new();
    seed_march(&store);
    store.fail_writes_for("2024-03-org-b");

    let err = run_aggregation(&store, &quota_job("2024-03")).await.unwrap_err();
    match err {
        QuotarollError::BulkWrite(failure) => {
            assert_eq!(failure.failed_ids(), vec!["2024-03-org-b"]);
        }
        other => panic!("expected BulkWrite, got {other:?}"),
    }
    assert_eq!(store.len(MONTHLY_INDEX), 1);
}

#[tokio::test]
async fn test_container_memory_summary() {
    let store = MemoryStore::new();
    store.insert(
        "logs-app-2024.03.01",
        "e1",
        container_metric("org-a", "alpha", utc(2024, 3, 1, 12, 0, 0), 512, 1024),
    );
    store.insert(
        "logs-app-2024.03.02",
        "e2",
        container_metric("org-a", "alpha", utc(2024, 3, 2, 12, 0, 0), 256, 1024),
    );
    let mut other = container_metric("org-a", "alpha", utc(2024, 3, 2, 12, 0, 0), 9999, 9999);
    other["@type"] = serde_json::json!("LogMessage");
    store.insert("logs-app-2024.03.02", "e3", other);
    store.insert(
        "logs-app-2024.04.01",
        "e4",
        container_metric("org-a", "alpha", utc(2024, 4, 1, 12, 0, 0), 1, 1),
    );

    let job = AggregationJob {
        period: Period::new(2024, 3).unwrap(),
        profile: AggregationProfile::container_memory(),
        source_index: "logs-app-2024.03.*".to_string(),
        destination_index: "memory-monthly".to_string(),
        detail_index: None,
        snapshot_dir: None,
    };
    let report = run_aggregation(&store, &job).await.unwrap();

    assert_eq!(report.documents.len(), 1);
    let doc = &report.documents[0];
    assert_eq!(doc.metric("memory_bytes"), Some(768.0));
    assert_eq!(doc.metric("memory_bytes_quota"), Some(2048.0));
    assert!(doc.quota_ids.is_empty());
    assert_eq!(doc.organization_names, vec!["alpha"]);
}

#[tokio::test]
async fn test_container_memory_sums_per_organization() {
    let store = MemoryStore::new();
    let events = [
        ("e1", "org-a", "alpha", utc(2024, 3, 1, 12, 0, 0), 100),
        ("e2", "org-a", "alpha", utc(2024, 3, 15, 12, 0, 0), 200),
        ("e3", "org-b", "beta", utc(2024, 3, 20, 12, 0, 0), 50),
    ];
    for (id, org, name, at, bytes) in events {
        let index = format!("logs-app-{}", at.format("%Y.%m.%d"));
        store.insert(&index, id, container_metric(org, name, at, bytes, 1024));
    }

    let job = AggregationJob {
        period: Period::new(2024, 3).unwrap(),
        profile: AggregationProfile::container_memory(),
        source_index: "logs-app-2024.03.*".to_string(),
        destination_index: "memory-monthly".to_string(),
        detail_index: None,
        snapshot_dir: None,
    };
    let report = run_aggregation(&store, &job).await.unwrap();

    let ids: Vec<&str> = report.documents.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["2024-03-org-a", "2024-03-org-b"]);
    assert_eq!(report.documents[0].metric("memory_bytes"), Some(300.0));
    assert_eq!(report.documents[1].metric("memory_bytes"), Some(50.0));
    assert_eq!(report.documents[1].organization_names, vec!["beta"]);

    let stored = store.documents("memory-monthly");
    assert_eq!(stored.len(), 2);
    assert_eq!(stored["2024-03-org-a"]["memory_bytes"], 300.0);
}

#[tokio::test]
async fn test_snapshot_matches_written_documents() {
    let store = MemoryStore::new();
    seed_march(&store);
    let dir = TempDir::new().unwrap();

    let mut job = quota_job("2024-03");
    job.snapshot_dir = Some(dir.path().to_path_buf());
    let report = run_aggregation(&store, &job).await.unwrap();

    let path = match report.snapshot {
        SnapshotOutcome::Written(path) => path,
        other => panic!("expected a snapshot, got {other:?}"),
    };
    assert_eq!(path, dir.path().join("quotas-202403.json"));

    let loaded = read_snapshot(&path).await.unwrap();
    assert_eq!(loaded, report.documents);
    assert!(loaded.iter().all(|d| d.period.to_string() == "2024-03"));
}

#[tokio::test]
async fn test_snapshot_failure_is_reported_separately() {
    let store = MemoryStore::new();
    seed_march(&store);

    let mut job = quota_job("2024-03");
    job.snapshot_dir = Some(PathBuf::from("/nonexistent/quotaroll/snapshots"));
    let report = run_aggregation(&store, &job).await.unwrap();

    match report.snapshot {
        SnapshotOutcome::Failed(e) => assert_eq!(e.exit_code(), 14),
        other => panic!("expected a failed snapshot, got {other:?}"),
    }
    assert_eq!(store.len(MONTHLY_INDEX), 2);
}
