//! Error types for quotaroll
//!
//! This module defines the error type used throughout the quotaroll crates.
//! Each variant corresponds to one stage of a run so that the binary can map
//! failures to distinct exit statuses.
//!
//! # Example
//!
//! ```
//! use quotaroll_core::error::{QuotarollError, Result};
//!
//! fn example_function() -> Result<()> {
//!     // This will automatically convert io::Error to QuotarollError
//!     let _file = std::fs::read_to_string("nonexistent.txt")?;
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::reconcile::DanglingReference;

/// Main error type for quotaroll operations
#[derive(Error, Debug)]
pub enum QuotarollError {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Network error outside of a specific pipeline stage
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// One or more settings are missing or invalid
    #[error("Configuration error: {0}")]
    Config(ConfigErrors),

    /// A year-month string could not be parsed
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    /// A paginated API request (or the token exchange) failed
    #[error("Fetch of {url} failed: {reason}")]
    Fetch {
        /// The URL that was requested
        url: String,
        /// Transport error or HTTP status description
        reason: String,
    },

    /// A fetched resource lacked an attribute the join needs
    #[error("Invalid resource {guid}: {reason}")]
    InvalidResource {
        /// Guid of the offending resource
        guid: String,
        /// What was missing or malformed
        reason: String,
    },

    /// The aggregation query (or its detail lookups) failed
    #[error("Query error: {0}")]
    Query(String),

    /// Organizations reference quota definitions that were not fetched
    #[error(
        "{} organization(s) reference unknown quota definitions: {}",
        .0.len(),
        format_dangling(.0)
    )]
    MissingReference(Vec<DanglingReference>),

    /// Some documents in a bulk request were rejected
    #[error("Bulk write error: {0}")]
    BulkWrite(BulkWriteFailure),

    /// The snapshot file could not be written or read
    #[error("Snapshot error at {}: {source}", path.display())]
    Snapshot {
        /// The snapshot path
        path: PathBuf,
        /// Underlying IO failure
        #[source]
        source: std::io::Error,
    },
}

impl QuotarollError {
    /// Process exit status for this error.
    ///
    /// Configuration problems use 99 so that a scheduler can tell "never
    /// started" apart from a failed run.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::InvalidPeriod(_) => 99,
            Self::Fetch { .. } | Self::InvalidResource { .. } => 10,
            Self::Query(_) => 11,
            Self::MissingReference(_) => 12,
            Self::BulkWrite(_) => 13,
            Self::Snapshot { .. } | Self::Io(_) => 14,
            Self::Json(_) | Self::Network(_) => 1,
        }
    }
}

fn format_dangling(references: &[DanglingReference]) -> String {
    references
        .iter()
        .map(|r| format!("{} ({}) -> {}", r.org_id, r.org_name, r.quota_id))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A single missing or invalid setting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigProblem {
    /// Setting name as the user sees it (the environment variable)
    pub field: String,
    /// What is wrong with it
    pub message: String,
}

/// Every configuration problem found during validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigErrors {
    pub problems: Vec<ConfigProblem>,
}

impl ConfigErrors {
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.problems.push(ConfigProblem {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    /// Names of the offending settings, in the order they were found
    pub fn fields(&self) -> Vec<&str> {
        self.problems.iter().map(|p| p.field.as_str()).collect()
    }

    /// `Ok(())` when nothing was reported, otherwise a `Config` error
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(QuotarollError::Config(self))
        }
    }
}

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "the following settings must be set correctly to continue:"
        )?;
        for problem in &self.problems {
            write!(f, "\n\t{}: {}", problem.field, problem.message)?;
        }
        Ok(())
    }
}

/// One document the store refused to write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedWrite {
    /// Document id
    pub id: String,
    /// HTTP-style status reported for the item
    pub status: u16,
    /// Store-supplied reason
    pub reason: String,
}

/// Partial failure of a bulk request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkWriteFailure {
    /// Index the batch targeted
    pub index: String,
    /// Number of documents in the batch
    pub attempted: usize,
    /// The documents that were not written
    pub failed: Vec<FailedWrite>,
}

impl BulkWriteFailure {
    /// Ids of the failed documents, safe to resubmit
    pub fn failed_ids(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.id.as_str()).collect()
    }
}

impl fmt::Display for BulkWriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} documents failed to write to {}",
            self.failed.len(),
            self.attempted,
            self.index
        )?;
        for failure in &self.failed {
            write!(f, "\n\t{} ({}): {}", failure.id, failure.status, failure.reason)?;
        }
        Ok(())
    }
}

/// Convenience type alias for Results in quotaroll
pub type Result<T> = std::result::Result<T, QuotarollError>;
