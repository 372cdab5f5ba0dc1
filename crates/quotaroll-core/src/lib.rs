//! Core types, traits, and transformations for quotaroll
//!
//! This crate holds everything that does not talk to the network directly:
//! the period and document types, the aggregation query builder, the bucket
//! mapper, the quota reconciliation join, the idempotent writer and snapshot
//! persistence. Network collaborators (the metrics store and the paginated
//! resource API) plug in through the [`store::MetricsStore`] trait and the
//! `quotaroll-cf` crate.

pub mod error;
pub mod mapping;
pub mod query;
pub mod reconcile;
pub mod snapshot;
pub mod store;
pub mod types;
pub mod writer;

#[cfg(any(test, feature = "test-support"))]
pub mod memory_store;

// Re-export commonly used types
pub use error::{QuotarollError, Result};
pub use query::AggregationProfile;
pub use store::MetricsStore;
pub use types::{Guid, Period, PollDocument, SummaryDocument};
