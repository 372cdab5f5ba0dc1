//! Run pipelines
//!
//! A run is one sequential pass: poll runs fetch, reconcile and write;
//! aggregation runs query, map, optionally join daily detail, write, and
//! optionally persist a snapshot. Each stage fails with its own error
//! variant so the binary can report which one stopped the run.

use chrono::{DateTime, Utc};
use quotaroll_cf::ResourceFetcher;
use quotaroll_core::error::{QuotarollError, Result};
use quotaroll_core::mapping::{join_daily_detail, map_buckets};
use quotaroll_core::query::{AggregationProfile, build_aggregate_query};
use quotaroll_core::reconcile::{DanglingReference, MissingQuotaPolicy, reconcile};
use quotaroll_core::snapshot::write_snapshot;
use quotaroll_core::store::MetricsStore;
use quotaroll_core::types::{Period, PollDocument, SummaryDocument};
use quotaroll_core::writer::{WriteSummary, write_documents};
use std::path::PathBuf;
use tracing::{info, warn};

/// Result of a poll run
#[derive(Debug)]
pub struct PollReport {
    pub documents: Vec<PollDocument>,
    /// Organizations left out under the skip policy
    pub skipped: Vec<DanglingReference>,
    pub written: WriteSummary,
}

/// Fetch organizations and quota definitions, join them, and write one poll
/// document per organization.
///
/// Under the abort policy a dangling quota reference fails the run before
/// anything is written.
pub async fn run_poll<S>(
    fetcher: &ResourceFetcher,
    store: &S,
    index: &str,
    policy: MissingQuotaPolicy,
    now: DateTime<Utc>,
) -> Result<PollReport>
where
    S: MetricsStore + ?Sized,
{
    let organizations = fetcher.organizations().await?;
    let quotas = fetcher.quota_definitions().await?;
    info!(
        "Fetched {} organizations and {} quota definitions",
        organizations.len(),
        quotas.len()
    );

    let reconciliation = reconcile(organizations, quotas, now, policy)?;
    if !reconciliation.skipped.is_empty() {
        warn!(
            "{} organizations skipped for unknown quota definitions",
            reconciliation.skipped.len()
        );
    }

    let written = write_documents(store, index, &reconciliation.documents).await?;
    Ok(PollReport {
        documents: reconciliation.documents,
        skipped: reconciliation.skipped,
        written,
    })
}

/// One monthly roll-up, fully resolved
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationJob {
    pub period: Period,
    pub profile: AggregationProfile,
    /// Index (or pattern) searched for raw documents
    pub source_index: String,
    /// Index receiving the summaries
    pub destination_index: String,
    /// Index the per-day detail records are looked up in, if any
    pub detail_index: Option<String>,
    /// Directory of the snapshot file, if one is wanted
    pub snapshot_dir: Option<PathBuf>,
}

/// What happened to the snapshot of a run
#[derive(Debug)]
pub enum SnapshotOutcome {
    Disabled,
    Written(PathBuf),
    /// The store write stands; only the file is missing
    Failed(QuotarollError),
}

/// Result of an aggregation run
#[derive(Debug)]
pub struct AggregationReport {
    pub period: Period,
    pub documents: Vec<SummaryDocument>,
    pub written: WriteSummary,
    pub snapshot: SnapshotOutcome,
}

/// Run a monthly roll-up against `store`.
///
/// Summaries are written before the snapshot; a snapshot failure is
/// reported in the outcome and leaves the written documents in place.
pub async fn run_aggregation<S>(store: &S, job: &AggregationJob) -> Result<AggregationReport>
where
    S: MetricsStore + ?Sized,
{
    info!(
        "Aggregating {} for {} from {}",
        job.profile.name, job.period, job.source_index
    );

    let query = build_aggregate_query(job.period, &job.profile);
    let response = store.search(&job.source_index, &query).await?;
    let mut documents = map_buckets(&response, job.period, &job.profile)?;
    info!("{} organizations in {}", documents.len(), job.period);

    if let Some(detail_index) = &job.detail_index {
        join_daily_detail(store, detail_index, job.period, &mut documents).await?;
    }

    let written = write_documents(store, &job.destination_index, &documents).await?;

    let snapshot = match &job.snapshot_dir {
        None => SnapshotOutcome::Disabled,
        Some(dir) => {
            match write_snapshot(dir, &job.profile.snapshot_prefix, job.period, &documents).await {
                Ok(path) => SnapshotOutcome::Written(path),
                Err(e) => {
                    warn!("Summaries were written but the snapshot was not: {}", e);
                    SnapshotOutcome::Failed(e)
                }
            }
        }
    };

    Ok(AggregationReport {
        period: job.period,
        documents,
        written,
        snapshot,
    })
}
