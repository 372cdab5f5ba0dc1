//! quotaroll - monthly billing roll-ups of organization quotas and memory
//!
//! This library provides the pieces behind the `quotaroll` binary:
//! - Command-line definitions and validated run configuration
//! - The poll pipeline (fetch, reconcile, write) and the aggregation
//!   pipeline (query, map, daily detail, write, snapshot)
//! - Failure notifications to a chat webhook
//!
//! # Examples
//!
//! ```no_run
//! use quotaroll::pipeline::{AggregationJob, run_aggregation};
//! use quotaroll_core::AggregationProfile;
//! use quotaroll_store::ElasticsearchStore;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> quotaroll::Result<()> {
//!     let store = ElasticsearchStore::new("http://localhost:9200", Duration::from_secs(300))?;
//!     let job = AggregationJob {
//!         period: "2024-03".parse()?,
//!         profile: AggregationProfile::quotas(),
//!         source_index: "quotas-poll".to_string(),
//!         destination_index: "quotas-monthly".to_string(),
//!         detail_index: Some("quotas-poll".to_string()),
//!         snapshot_dir: None,
//!     };
//!
//!     let report = run_aggregation(&store, &job).await?;
//!     println!("{} summaries written", report.written.written);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod notify;
pub mod pipeline;

// Re-export commonly used types
pub use quotaroll_core::{QuotarollError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
