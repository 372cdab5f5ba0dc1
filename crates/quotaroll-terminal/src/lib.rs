//! Terminal output formatting for quotaroll
//!
//! This crate provides the table and JSON formatters used to report the
//! documents a run wrote.

pub mod output;

pub use output::{JsonFormatter, OutputFormatter, TableFormatter, get_formatter};
