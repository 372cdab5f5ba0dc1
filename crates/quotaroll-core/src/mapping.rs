//! Aggregation result mapping
//!
//! Turns the nested bucket structure returned for a
//! [`build_aggregate_query`](crate::query::build_aggregate_query) request
//! into one [`SummaryDocument`] per organization, and attaches per-day detail
//! records fetched by id.
//!
//! [`map_buckets`] is a pure function: it borrows the response and has no
//! side effects. Output ordering is deterministic (documents by id, names and
//! quota ids sorted) so that two runs over the same data produce identical
//! documents.

use crate::error::{QuotarollError, Result};
use crate::query::{AggregationProfile, GROUP_AGGREGATION, NAMES_AGGREGATION, QUOTAS_AGGREGATION};
use crate::store::MetricsStore;
use crate::types::{Period, SummaryDocument};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    timed_out: bool,
    #[serde(default)]
    aggregations: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct TermsAggregation {
    #[serde(default)]
    sum_other_doc_count: u64,
    #[serde(default)]
    buckets: Vec<TermsBucket>,
}

#[derive(Deserialize)]
struct TermsBucket {
    key: Value,
    #[serde(default)]
    doc_count: u64,
    #[serde(flatten)]
    sub_aggregations: Map<String, Value>,
}

#[derive(Deserialize)]
struct SumAggregation {
    value: Option<f64>,
}

/// Map a raw search response to one summary per organization bucket.
///
/// # Errors
///
/// Returns `QuotarollError::Query` when the search timed out, when the
/// grouping aggregation is missing or malformed, or when the store reports
/// organizations beyond the group cap (`sum_other_doc_count > 0`).
pub fn map_buckets(
    response: &Value,
    period: Period,
    profile: &AggregationProfile,
) -> Result<Vec<SummaryDocument>> {
    let response = SearchResponse::deserialize(response)
        .map_err(|e| QuotarollError::Query(format!("malformed search response: {e}")))?;

    if response.timed_out {
        return Err(QuotarollError::Query(
            "search timed out before all shards answered".to_string(),
        ));
    }

    let group = response
        .aggregations
        .as_ref()
        .and_then(|aggs| aggs.get(GROUP_AGGREGATION))
        .ok_or_else(|| {
            QuotarollError::Query(format!(
                "response has no '{GROUP_AGGREGATION}' aggregation"
            ))
        })?;
    let group = parse_terms(group, GROUP_AGGREGATION)?;

    if group.sum_other_doc_count > 0 {
        return Err(QuotarollError::Query(format!(
            "organization grouping truncated at {} buckets ({} documents left out); raise the group cap",
            profile.group_cap, group.sum_other_doc_count
        )));
    }

    let mut documents = Vec::with_capacity(group.buckets.len());
    for bucket in &group.buckets {
        documents.push(map_bucket(bucket, period, profile)?);
    }
    documents.sort_by(|a, b| a.id.cmp(&b.id));

    debug!(
        "Mapped {} {} buckets for {}",
        documents.len(),
        profile.name,
        period
    );
    Ok(documents)
}

fn map_bucket(
    bucket: &TermsBucket,
    period: Period,
    profile: &AggregationProfile,
) -> Result<SummaryDocument> {
    let organization_id = bucket_key(&bucket.key)?;
    let mut doc = SummaryDocument::new(period, organization_id);

    doc.organization_names = distinct_keys(bucket, NAMES_AGGREGATION, &doc.organization_id)?;
    if profile.tracks_quotas() {
        doc.quota_ids = distinct_keys(bucket, QUOTAS_AGGREGATION, &doc.organization_id)?;
    }

    for metric in &profile.metrics {
        let raw = bucket.sub_aggregations.get(&metric.name).ok_or_else(|| {
            QuotarollError::Query(format!(
                "bucket {} has no '{}' aggregation",
                doc.organization_id, metric.name
            ))
        })?;
        let sum = SumAggregation::deserialize(raw).map_err(|e| {
            QuotarollError::Query(format!(
                "bucket {} has a malformed '{}' sum: {e}",
                doc.organization_id, metric.name
            ))
        })?;
        doc.metrics
            .insert(metric.name.clone(), sum.value.unwrap_or(0.0));
    }

    debug!(
        "Summary {}: {} events, metrics {:?}",
        doc.id, bucket.doc_count, doc.metrics
    );
    Ok(doc)
}

fn parse_terms(raw: &Value, name: &str) -> Result<TermsAggregation> {
    TermsAggregation::deserialize(raw)
        .map_err(|e| QuotarollError::Query(format!("malformed '{name}' aggregation: {e}")))
}

fn distinct_keys(bucket: &TermsBucket, name: &str, organization_id: &str) -> Result<Vec<String>> {
    let Some(raw) = bucket.sub_aggregations.get(name) else {
        return Err(QuotarollError::Query(format!(
            "bucket {organization_id} has no '{name}' aggregation"
        )));
    };
    let terms = parse_terms(raw, name)?;
    if terms.sum_other_doc_count > 0 {
        warn!(
            "'{}' for {} truncated ({} documents not represented); raise the distinct cap",
            name, organization_id, terms.sum_other_doc_count
        );
    }

    let mut keys = terms
        .buckets
        .iter()
        .map(|b| bucket_key(&b.key))
        .collect::<Result<Vec<_>>>()?;
    keys.sort();
    keys.dedup();
    Ok(keys)
}

fn bucket_key(key: &Value) -> Result<String> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(QuotarollError::Query(format!(
            "unsupported bucket key {other}"
        ))),
    }
}

/// Ids of the per-day records for an organization, one per calendar day.
///
/// ```
/// use quotaroll_core::mapping::daily_detail_ids;
/// use quotaroll_core::types::Period;
///
/// let ids = daily_detail_ids("org-a", "2024-02".parse().unwrap());
/// assert_eq!(ids.len(), 29);
/// assert_eq!(ids[0], "org-a-2024-02-01");
/// assert_eq!(ids[28], "org-a-2024-02-29");
/// ```
pub fn daily_detail_ids(organization_id: &str, period: Period) -> Vec<String> {
    period
        .days()
        .map(|day| format!("{}-{}", organization_id, day.format("%Y-%m-%d")))
        .collect()
}

/// Attach per-day detail records to each summary.
///
/// Issues one multi-get per document against `index`. The attached list has
/// one entry per calendar day in day order; days without a record are kept
/// as not-found entries.
pub async fn join_daily_detail<S>(
    store: &S,
    index: &str,
    period: Period,
    documents: &mut [SummaryDocument],
) -> Result<()>
where
    S: MetricsStore + ?Sized,
{
    for doc in documents.iter_mut() {
        let ids = daily_detail_ids(&doc.organization_id, period);
        let records = store.multi_get(index, &ids).await?;
        if records.len() != ids.len() {
            return Err(QuotarollError::Query(format!(
                "detail lookup for {} returned {} records for {} ids",
                doc.id,
                records.len(),
                ids.len()
            )));
        }
        let found = records.iter().filter(|r| r.found).count();
        debug!("Daily detail for {}: {}/{} days found", doc.id, found, ids.len());
        doc.daily_detail = Some(records);
    }
    Ok(())
}
