//! Elasticsearch implementation of the quotaroll metrics store
//!
//! [`elasticsearch::ElasticsearchStore`] implements
//! [`quotaroll_core::MetricsStore`] over the HTTP API: `_search` for the
//! monthly aggregation, `_mget` for the daily detail lookups and `_bulk` for
//! idempotent writes. The NDJSON bulk wire format lives in [`bulk`].

pub mod bulk;
pub mod elasticsearch;

pub use elasticsearch::ElasticsearchStore;
