//! In-process metrics store
//!
//! `MemoryStore` keeps documents in ordered maps and answers the subset of
//! the search API the pipeline uses: `bool.filter` with `range` and `term`
//! clauses, and nested `terms`/`sum` aggregations. Terms buckets are ordered
//! by document count then key and truncated to `size`, reporting the rest in
//! `sum_other_doc_count`, so cap handling can be exercised without a cluster.
//!
//! Only compiled for tests and with the `test-support` feature.

use crate::error::{QuotarollError, Result};
use crate::store::{BulkItem, BulkItemResult, BulkResponse, MetricsStore};
use crate::types::DetailRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct State {
    indices: BTreeMap<String, BTreeMap<String, Value>>,
    failing_ids: BTreeSet<String>,
    search_error: Option<String>,
    bulk_requests: usize,
    searches: Vec<(String, Value)>,
}

/// Metrics store backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store a document, replacing any previous one with the same id
    pub fn insert(&self, index: &str, id: &str, source: Value) {
        self.state()
            .indices
            .entry(index.to_string())
            .or_default()
            .insert(id.to_string(), source);
    }

    /// Every document of an index, keyed by id
    pub fn documents(&self, index: &str) -> BTreeMap<String, Value> {
        self.state().indices.get(index).cloned().unwrap_or_default()
    }

    pub fn len(&self, index: &str) -> usize {
        self.state().indices.get(index).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, index: &str) -> bool {
        self.len(index) == 0
    }

    /// Reject any later bulk item with this id
    pub fn fail_writes_for(&self, id: &str) {
        self.state().failing_ids.insert(id.to_string());
    }

    /// Make every later search fail with `message`
    pub fn fail_searches(&self, message: &str) {
        self.state().search_error = Some(message.to_string());
    }

    /// Number of bulk requests received so far
    pub fn bulk_requests(&self) -> usize {
        self.state().bulk_requests
    }

    /// `(index, query)` of every search received so far
    pub fn searches(&self) -> Vec<(String, Value)> {
        self.state().searches.clone()
    }
}

#[async_trait]
impl MetricsStore for MemoryStore {
    async fn search(&self, index: &str, query: &Value) -> Result<Value> {
        let mut state = self.state();
        state.searches.push((index.to_string(), query.clone()));
        if let Some(message) = &state.search_error {
            return Err(QuotarollError::Query(message.clone()));
        }

        let filters = query["query"]["bool"]["filter"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        let mut matched = Vec::new();
        for (name, documents) in &state.indices {
            if !index_matches(index, name) {
                continue;
            }
            for doc in documents.values() {
                if filters.iter().all(|clause| matches_clause(doc, clause)) {
                    matched.push(doc);
                }
            }
        }

        let aggregations = match query.get("aggs").and_then(Value::as_object) {
            Some(aggs) => evaluate(&matched, aggs)?,
            None => Map::new(),
        };

        Ok(json!({
            "took": 0,
            "timed_out": false,
            "hits": {"total": {"value": matched.len(), "relation": "eq"}, "hits": []},
            "aggregations": aggregations,
        }))
    }

    async fn multi_get(&self, index: &str, ids: &[String]) -> Result<Vec<DetailRecord>> {
        let state = self.state();
        let documents = state.indices.get(index);
        Ok(ids
            .iter()
            .map(|id| {
                let source = documents.and_then(|docs| docs.get(id)).cloned();
                DetailRecord {
                    id: id.clone(),
                    found: source.is_some(),
                    source,
                }
            })
            .collect())
    }

    async fn bulk_index(&self, index: &str, items: Vec<BulkItem>) -> Result<BulkResponse> {
        let mut state = self.state();
        state.bulk_requests += 1;

        let mut results = Vec::with_capacity(items.len());
        for item in items {
            if state.failing_ids.contains(&item.id) {
                results.push(BulkItemResult {
                    id: item.id,
                    status: 400,
                    error: Some("document rejected".to_string()),
                });
                continue;
            }
            let previous = state
                .indices
                .entry(index.to_string())
                .or_default()
                .insert(item.id.clone(), item.source);
            results.push(BulkItemResult {
                id: item.id,
                status: if previous.is_some() { 200 } else { 201 },
                error: None,
            });
        }
        Ok(BulkResponse { items: results })
    }
}

/// `*` matches any run of characters; everything else is literal
fn index_matches(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == name;
    }

    let mut rest = name;
    for (i, part) in parts.iter().enumerate() {
        if i == 0 {
            let Some(stripped) = rest.strip_prefix(part) else {
                return false;
            };
            rest = stripped;
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            let Some(pos) = rest.find(part) else {
                return false;
            };
            rest = &rest[pos + part.len()..];
        }
    }
    true
}

/// Field lookup: `.keyword` sub-fields resolve to the field itself, literal
/// dotted keys (`@cf.org_id`) win over nested paths.
fn lookup<'a>(doc: &'a Value, field: &str) -> Option<&'a Value> {
    let field = field.strip_suffix(".keyword").unwrap_or(field);
    if let Some(value) = doc.get(field) {
        return Some(value);
    }
    field
        .split('.')
        .try_fold(doc, |current, segment| current.get(segment))
}

fn matches_clause(doc: &Value, clause: &Value) -> bool {
    if let Some(range) = clause.get("range").and_then(Value::as_object) {
        return range.iter().all(|(field, bounds)| {
            let Some(value) = lookup(doc, field).and_then(as_timestamp) else {
                return false;
            };
            let lower = bounds.get("gte").and_then(as_timestamp);
            let upper = bounds.get("lt").and_then(as_timestamp);
            lower.is_none_or(|gte| value >= gte) && upper.is_none_or(|lt| value < lt)
        });
    }
    if let Some(term) = clause.get("term").and_then(Value::as_object) {
        return term
            .iter()
            .all(|(field, expected)| lookup(doc, field) == Some(expected));
    }
    false
}

fn as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn evaluate(documents: &[&Value], aggs: &Map<String, Value>) -> Result<Map<String, Value>> {
    let mut out = Map::new();
    for (name, definition) in aggs {
        let result = if let Some(terms) = definition.get("terms") {
            evaluate_terms(documents, terms, definition.get("aggs").and_then(Value::as_object))?
        } else if let Some(sum) = definition.get("sum") {
            let field = sum["field"].as_str().unwrap_or_default();
            let total: f64 = documents
                .iter()
                .filter_map(|doc| lookup(doc, field).and_then(Value::as_f64))
                .sum();
            json!({ "value": total })
        } else {
            return Err(QuotarollError::Query(format!(
                "unsupported aggregation '{name}'"
            )));
        };
        out.insert(name.clone(), result);
    }
    Ok(out)
}

fn evaluate_terms(
    documents: &[&Value],
    terms: &Value,
    sub_aggs: Option<&Map<String, Value>>,
) -> Result<Value> {
    let field = terms["field"].as_str().unwrap_or_default();
    let size = terms["size"].as_u64().unwrap_or(10) as usize;

    let mut groups: BTreeMap<String, (Value, Vec<&Value>)> = BTreeMap::new();
    for doc in documents {
        let Some(key) = lookup(doc, field) else {
            continue;
        };
        let sort_key = match key {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        groups
            .entry(sort_key)
            .or_insert_with(|| (key.clone(), Vec::new()))
            .1
            .push(*doc);
    }

    // BTreeMap iteration gives key order; a stable sort keeps it within equal counts
    let mut groups: Vec<_> = groups.into_values().collect();
    groups.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    let sum_other: usize = groups.iter().skip(size).map(|(_, docs)| docs.len()).sum();
    let mut buckets = Vec::new();
    for (key, docs) in groups.into_iter().take(size) {
        let mut bucket = Map::new();
        bucket.insert("key".to_string(), key);
        bucket.insert("doc_count".to_string(), json!(docs.len()));
        if let Some(sub_aggs) = sub_aggs {
            bucket.extend(evaluate(&docs, sub_aggs)?);
        }
        buckets.push(Value::Object(bucket));
    }

    Ok(json!({
        "doc_count_error_upper_bound": 0,
        "sum_other_doc_count": sum_other,
        "buckets": buckets,
    }))
}
