//! Output formatting for run reports
//!
//! This module provides formatters for the documents a run produced:
//! - Table format for human-readable terminal output
//! - JSON format for machine-readable output and integration with other tools
//!
//! # Examples
//!
//! ```
//! use quotaroll_core::types::{Period, SummaryDocument};
//! use quotaroll_terminal::get_formatter;
//!
//! let mut doc = SummaryDocument::new("2024-03".parse::<Period>().unwrap(), "org-a");
//! doc.metrics.insert("memory_limit".to_string(), 300.0);
//!
//! let table = get_formatter(false).format_summaries(&[doc.clone()]);
//! assert!(table.contains("2024-03-org-a"));
//!
//! let json = get_formatter(true).format_summaries(&[doc]);
//! assert!(json.contains("\"summaries\""));
//! ```

use prettytable::{Cell, Row, Table, format, row};
use quotaroll_core::types::{PollDocument, SummaryDocument};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};

/// Trait for output formatters
pub trait OutputFormatter {
    /// Format monthly summaries, one per organization
    fn format_summaries(&self, data: &[SummaryDocument]) -> String;

    /// Format the documents written by a poll
    fn format_poll(&self, data: &[PollDocument]) -> String;
}

/// Metric names present in any document, in name order
fn metric_names(data: &[SummaryDocument]) -> Vec<String> {
    data.iter()
        .flat_map(|doc| doc.metrics.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn metric_totals(data: &[SummaryDocument]) -> BTreeMap<String, f64> {
    let mut totals = BTreeMap::new();
    for doc in data {
        for (name, value) in &doc.metrics {
            *totals.entry(name.clone()).or_insert(0.0) += value;
        }
    }
    totals
}

/// Table formatter for human-readable output
///
/// Metric columns follow whatever the documents carry, so the same formatter
/// serves the quota and container-memory roll-ups.
pub struct TableFormatter;

impl TableFormatter {
    /// Format a number with thousands separators
    fn format_number(n: i64) -> String {
        let s = n.unsigned_abs().to_string();
        let mut result = String::new();

        for (count, ch) in s.chars().rev().enumerate() {
            if count > 0 && count % 3 == 0 {
                result.push(',');
            }
            result.push(ch);
        }
        if n < 0 {
            result.push('-');
        }

        result.chars().rev().collect()
    }

    /// Whole values get separators; fractional sums keep two decimals
    fn format_metric(value: f64) -> String {
        if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            Self::format_number(value as i64)
        } else {
            format!("{value:.2}")
        }
    }

    fn title_row(titles: &[String]) -> Row {
        Row::new(
            titles
                .iter()
                .map(|title| Cell::new(title).style_spec("b"))
                .collect(),
        )
    }
}

impl OutputFormatter for TableFormatter {
    fn format_summaries(&self, data: &[SummaryDocument]) -> String {
        let metrics = metric_names(data);
        let show_quotas = data.iter().any(|doc| !doc.quota_ids.is_empty());
        let show_detail = data.iter().any(|doc| doc.daily_detail.is_some());

        let mut titles = vec!["Id".to_string(), "Organization".to_string()];
        if show_quotas {
            titles.push("Quotas".to_string());
        }
        titles.extend(metrics.iter().cloned());
        if show_detail {
            titles.push("Days Found".to_string());
        }

        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
        table.set_titles(Self::title_row(&titles));

        for doc in data {
            let mut cells = vec![
                Cell::new(&doc.id),
                Cell::new(&doc.organization_names.join(", ")),
            ];
            if show_quotas {
                cells.push(Cell::new(&doc.quota_ids.join(", ")));
            }
            for name in &metrics {
                let value = doc.metric(name).unwrap_or(0.0);
                cells.push(Cell::new(&Self::format_metric(value)).style_spec("r"));
            }
            if show_detail {
                let found = match &doc.daily_detail {
                    Some(detail) => format!(
                        "{}/{}",
                        detail.iter().filter(|r| r.found).count(),
                        detail.len()
                    ),
                    None => String::new(),
                };
                cells.push(Cell::new(&found).style_spec("c"));
            }
            table.add_row(Row::new(cells));
        }

        // Add separator
        table.add_row(Row::new(vec![Cell::new(""); titles.len()]));

        let totals = metric_totals(data);
        let mut total_row = vec![
            Cell::new("TOTAL").style_spec("b"),
            Cell::new(&format!("{} organizations", data.len())).style_spec("b"),
        ];
        if show_quotas {
            total_row.push(Cell::new(""));
        }
        for name in &metrics {
            let value = totals.get(name).copied().unwrap_or(0.0);
            total_row.push(Cell::new(&Self::format_metric(value)).style_spec("br"));
        }
        if show_detail {
            total_row.push(Cell::new(""));
        }
        table.add_row(Row::new(total_row));

        table.to_string()
    }

    fn format_poll(&self, data: &[PollDocument]) -> String {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);

        table.set_titles(row![
            b -> "Organization",
            b -> "Name",
            b -> "Quota",
            b -> "Memory Limit (MB)",
            b -> "Polled At"
        ]);

        let mut total: i64 = 0;
        for doc in data {
            total += doc.memory_limit;
            table.add_row(row![
                doc.org_id,
                doc.org_name,
                doc.quota_name,
                r -> Self::format_number(doc.memory_limit),
                doc.timestamp.format("%Y-%m-%d %H:%M:%S")
            ]);
        }

        table.add_row(Row::new(vec![Cell::new(""); 5]));
        table.add_row(row![
            b -> "TOTAL",
            b -> format!("{} organizations", data.len()),
            "",
            br -> Self::format_number(total),
            ""
        ]);

        table.to_string()
    }
}

/// JSON formatter for machine-readable output
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn format_summaries(&self, data: &[SummaryDocument]) -> String {
        let output = json!({
            "summaries": data,
            "totals": {
                "organizations": data.len(),
                "metrics": metric_totals(data),
            }
        });
        serde_json::to_string_pretty(&output).unwrap_or_default()
    }

    fn format_poll(&self, data: &[PollDocument]) -> String {
        let output = json!({
            "documents": data,
            "totals": {
                "organizations": data.len(),
                "memory_limit": data.iter().map(|d| d.memory_limit).sum::<i64>(),
            }
        });
        serde_json::to_string_pretty(&output).unwrap_or_default()
    }
}

/// Get the formatter for the requested output mode
pub fn get_formatter(json: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonFormatter)
    } else {
        Box::new(TableFormatter)
    }
}
