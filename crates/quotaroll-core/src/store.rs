//! Metrics store trait
//!
//! This module defines the `MetricsStore` trait the pipeline talks to. The
//! production implementation lives in `quotaroll-store`; tests use the
//! in-process `memory_store::MemoryStore`.

use crate::error::Result;
use crate::types::{DetailRecord, PollDocument, SummaryDocument};
use async_trait::async_trait;
use serde::Serialize;

/// One document of a bulk request, keyed by its store id
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItem {
    pub id: String,
    pub source: serde_json::Value,
}

/// Per-document outcome of a bulk request
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemResult {
    pub id: String,
    pub status: u16,
    /// Present when the store rejected the document
    pub error: Option<String>,
}

impl BulkItemResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }
}

/// Per-document outcomes of a bulk request, in request order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkResponse {
    pub items: Vec<BulkItemResult>,
}

/// Trait for the store holding raw metrics and receiving summaries.
///
/// Every call is a single blocking round trip from the pipeline's point of
/// view; implementations must not retry on their own.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Run a search with aggregations against an index (or index pattern)
    /// and return the raw response body.
    async fn search(&self, index: &str, query: &serde_json::Value) -> Result<serde_json::Value>;

    /// Look documents up by id. The result has one entry per requested id,
    /// in request order, including not-found markers.
    async fn multi_get(&self, index: &str, ids: &[String]) -> Result<Vec<DetailRecord>>;

    /// Index every item under its id, replacing any existing document.
    async fn bulk_index(&self, index: &str, items: Vec<BulkItem>) -> Result<BulkResponse>;
}

/// A document with a deterministic store id
pub trait IndexDocument: Serialize {
    fn document_id(&self) -> &str;
}

impl IndexDocument for SummaryDocument {
    fn document_id(&self) -> &str {
        &self.id
    }
}

impl IndexDocument for PollDocument {
    fn document_id(&self) -> &str {
        &self.id
    }
}
