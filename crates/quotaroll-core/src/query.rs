//! Aggregation query builder
//!
//! Builds the single search request a run issues: a half-open time range over
//! one month, grouped by organization, with sums and distinct-value sets
//! nested under each group. The layout of a variant (which fields hold the
//! organization, names, quotas and metrics) is described by an
//! [`AggregationProfile`]; the builder itself is a pure function.
//!
//! # Examples
//!
//! ```
//! use quotaroll_core::query::{AggregationProfile, build_aggregate_query};
//! use quotaroll_core::types::Period;
//!
//! let period: Period = "2024-03".parse().unwrap();
//! let query = build_aggregate_query(period, &AggregationProfile::quotas());
//!
//! let range = &query["query"]["bool"]["filter"][0]["range"]["@timestamp"];
//! assert_eq!(range["gte"], "2024-03-01T00:00:00Z");
//! assert_eq!(range["lt"], "2024-04-01T00:00:00Z");
//! ```

use crate::types::Period;
use chrono::SecondsFormat;
use serde_json::{Map, Value, json};

/// Name of the top-level grouping aggregation
pub const GROUP_AGGREGATION: &str = "org";
/// Name of the nested distinct-organization-names aggregation
pub const NAMES_AGGREGATION: &str = "org_names";
/// Name of the nested distinct-quota-ids aggregation
pub const QUOTAS_AGGREGATION: &str = "quota_ids";

/// Default bucket limit for the organization grouping.
///
/// The store truncates terms aggregations to their `size`, so this has to be
/// at least the number of organizations; truncation is detected by the mapper.
pub const DEFAULT_GROUP_CAP: u32 = i32::MAX as u32;

/// Default bucket limit for the nested name and quota-id sets
pub const DEFAULT_DISTINCT_CAP: u32 = 1_000;

/// A summed metric: `name` in the summary, `field` in the source documents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricField {
    pub name: String,
    pub field: String,
}

impl MetricField {
    pub fn new(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
        }
    }
}

/// Exact-match restriction applied before grouping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFilter {
    pub field: String,
    pub value: String,
}

/// Field layout of one aggregation variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationProfile {
    /// Profile name, shown in logs and reports
    pub name: String,
    pub timestamp_field: String,
    pub org_field: String,
    pub name_field: String,
    /// Set when the source documents carry a quota reference
    pub quota_field: Option<String>,
    pub metrics: Vec<MetricField>,
    pub filter: Option<DocumentFilter>,
    pub group_cap: u32,
    pub distinct_cap: u32,
    /// Snapshot files are named `{snapshot_prefix}-{YYYYMM}.json`
    pub snapshot_prefix: String,
}

impl AggregationProfile {
    /// Roll-up of poll documents: summed `memory_limit` per organization
    pub fn quotas() -> Self {
        Self {
            name: "quotas".to_string(),
            timestamp_field: "@timestamp".to_string(),
            org_field: "org_id.keyword".to_string(),
            name_field: "org_name.keyword".to_string(),
            quota_field: Some("quota_id.keyword".to_string()),
            metrics: vec![MetricField::new("memory_limit", "memory_limit")],
            filter: None,
            group_cap: DEFAULT_GROUP_CAP,
            distinct_cap: DEFAULT_DISTINCT_CAP,
            snapshot_prefix: "quotas".to_string(),
        }
    }

    /// Roll-up of container metric events from the platform log indices
    pub fn container_memory() -> Self {
        Self {
            name: "container-memory".to_string(),
            timestamp_field: "@timestamp".to_string(),
            org_field: "@cf.org_id".to_string(),
            name_field: "@cf.org".to_string(),
            quota_field: None,
            metrics: vec![
                MetricField::new("memory_bytes", "containermetric.memory_bytes"),
                MetricField::new("memory_bytes_quota", "containermetric.memory_bytes_quota"),
            ],
            filter: Some(DocumentFilter {
                field: "@type".to_string(),
                value: "ContainerMetric".to_string(),
            }),
            group_cap: DEFAULT_GROUP_CAP,
            distinct_cap: DEFAULT_DISTINCT_CAP,
            snapshot_prefix: "memory".to_string(),
        }
    }

    pub fn with_group_cap(mut self, group_cap: u32) -> Self {
        self.group_cap = group_cap;
        self
    }

    pub fn with_distinct_cap(mut self, distinct_cap: u32) -> Self {
        self.distinct_cap = distinct_cap;
        self
    }

    pub fn tracks_quotas(&self) -> bool {
        self.quota_field.is_some()
    }
}

/// Build the month aggregation query for a profile.
///
/// The range is `gte` the first instant of the period and `lt` the first
/// instant of the next one, so an event exactly on a month boundary is
/// counted in exactly one month.
pub fn build_aggregate_query(period: Period, profile: &AggregationProfile) -> Value {
    let mut filters = vec![json!({
        "range": {
            profile.timestamp_field.as_str(): {
                "gte": period.start().to_rfc3339_opts(SecondsFormat::Secs, true),
                "lt": period.end().to_rfc3339_opts(SecondsFormat::Secs, true),
                "format": "strict_date_optional_time",
            }
        }
    })];
    if let Some(filter) = &profile.filter {
        filters.push(json!({ "term": { filter.field.as_str(): filter.value } }));
    }

    let mut sub_aggregations = Map::new();
    for metric in &profile.metrics {
        sub_aggregations.insert(
            metric.name.clone(),
            json!({ "sum": { "field": metric.field } }),
        );
    }
    sub_aggregations.insert(
        NAMES_AGGREGATION.to_string(),
        terms(&profile.name_field, profile.distinct_cap),
    );
    if let Some(quota_field) = &profile.quota_field {
        sub_aggregations.insert(
            QUOTAS_AGGREGATION.to_string(),
            terms(quota_field, profile.distinct_cap),
        );
    }

    let mut group = terms(&profile.org_field, profile.group_cap);
    group["aggs"] = Value::Object(sub_aggregations);

    json!({
        "size": 0,
        "query": { "bool": { "filter": filters } },
        "aggs": { GROUP_AGGREGATION: group },
    })
}

fn terms(field: &str, size: u32) -> Value {
    json!({ "terms": { "field": field, "size": size } })
}

/// Expand `{year}` and `{month}` placeholders in an index name.
///
/// ```
/// use quotaroll_core::query::expand_index_pattern;
/// use quotaroll_core::types::Period;
///
/// let period: Period = "2024-03".parse().unwrap();
/// assert_eq!(expand_index_pattern("logs-app-{year}.{month}.*", period), "logs-app-2024.03.*");
/// assert_eq!(expand_index_pattern("quotas-poll", period), "quotas-poll");
/// ```
pub fn expand_index_pattern(pattern: &str, period: Period) -> String {
    pattern
        .replace("{year}", &format!("{:04}", period.year()))
        .replace("{month}", &format!("{:02}", period.month()))
}
