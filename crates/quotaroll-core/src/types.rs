//! Core domain types for quotaroll
//!
//! This module contains the fundamental types used throughout the quotaroll
//! crates: the billing [`Period`], resource records fetched from the paginated
//! API and their typed views, and the two documents the pipeline writes back
//! into the metrics store.

use chrono::{DateTime, Datelike, NaiveDate, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{QuotarollError, Result};

/// Strongly-typed resource guid wrapper
///
/// # Examples
/// ```
/// use quotaroll_core::types::Guid;
///
/// let guid = Guid::new("2f2a2d6e-org");
/// assert_eq!(guid.as_str(), "2f2a2d6e-org");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Guid(String);

impl Guid {
    /// Create a new Guid from any string-like type
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Guid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A calendar month in UTC, the unit every summary covers
///
/// Parsed from and rendered as `YYYY-MM`. The month spans the half-open
/// interval `[start(), end())`.
///
/// # Examples
/// ```
/// use quotaroll_core::types::Period;
///
/// let period: Period = "2024-02".parse().unwrap();
/// assert_eq!(period.to_string(), "2024-02");
/// assert_eq!(period.compact(), "202402");
/// assert_eq!(period.days_in_month(), 29);
/// assert_eq!(period.next().to_string(), "2024-03");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    /// Create a period, validating the month and the year range
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(QuotarollError::InvalidPeriod(format!(
                "month must be between 1-12, got {month}"
            )));
        }
        // Both the first day and the first day of the following month must exist
        let next_year = if month == 12 { year + 1 } else { year };
        if NaiveDate::from_ymd_opt(year, month, 1).is_none()
            || NaiveDate::from_ymd_opt(next_year, 1, 1).is_none()
        {
            return Err(QuotarollError::InvalidPeriod(format!(
                "year {year} is out of range"
            )));
        }
        Ok(Self { year, month })
    }

    /// The period containing a date
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The month before the one containing `now`, the default billing target
    pub fn preceding(now: DateTime<Utc>) -> Self {
        Self::containing(now.date_naive()).previous()
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// First calendar day of the month
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .unwrap_or(NaiveDate::MIN)
    }

    /// First instant of the month (inclusive lower bound)
    pub fn start(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.first_day().and_time(chrono::NaiveTime::MIN))
    }

    /// First instant of the following month (exclusive upper bound)
    pub fn end(&self) -> DateTime<Utc> {
        self.next().start()
    }

    /// Whether a timestamp falls inside `[start, end)`
    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        *timestamp >= self.start() && *timestamp < self.end()
    }

    pub fn days_in_month(&self) -> u32 {
        (self.next().first_day() - self.first_day()).num_days() as u32
    }

    /// Every calendar day of the month, in order
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.first_day()
            .iter_days()
            .take(self.days_in_month() as usize)
    }

    /// `YYYYMM`, used in snapshot file names
    pub fn compact(&self) -> String {
        format!("{:04}{:02}", self.year, self.month)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = QuotarollError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || QuotarollError::InvalidPeriod(format!("expected YYYY-MM, got '{s}'"));

        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let digits =
            |part: &str, len: usize| part.len() == len && part.bytes().all(|b| b.is_ascii_digit());
        if !digits(year, 4) || !digits(month, 2) {
            return Err(invalid());
        }
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Metadata block of a paginated API resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    pub guid: Guid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// A resource as returned by the paginated API
///
/// Only the guid is interpreted here; domain attributes stay in `entity`
/// until a typed view ([`Organization`], [`QuotaDefinition`]) is taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub metadata: ResourceMetadata,
    #[serde(default)]
    pub entity: serde_json::Map<String, serde_json::Value>,
}

impl ResourceRecord {
    pub fn guid(&self) -> &Guid {
        &self.metadata.guid
    }

    fn entity_str(&self, key: &str) -> Result<&str> {
        self.entity
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| QuotarollError::InvalidResource {
                guid: self.guid().to_string(),
                reason: format!("entity.{key} is missing or not a string"),
            })
    }

    fn entity_i64(&self, key: &str) -> Result<i64> {
        self.entity
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| QuotarollError::InvalidResource {
                guid: self.guid().to_string(),
                reason: format!("entity.{key} is missing or not an integer"),
            })
    }
}

/// One page of the paginated API
#[derive(Debug, Clone, Deserialize)]
pub struct ResourcePage {
    #[serde(default)]
    pub total_results: Option<u64>,
    #[serde(default)]
    pub total_pages: Option<u64>,
    #[serde(default)]
    pub next_url: Option<String>,
    #[serde(default)]
    pub resources: Vec<ResourceRecord>,
}

/// An organization and the quota definition it is assigned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    pub guid: Guid,
    pub name: String,
    pub quota_definition_guid: Guid,
}

impl TryFrom<&ResourceRecord> for Organization {
    type Error = QuotarollError;

    fn try_from(record: &ResourceRecord) -> Result<Self> {
        Ok(Self {
            guid: record.guid().clone(),
            name: record.entity_str("name")?.to_string(),
            quota_definition_guid: Guid::new(record.entity_str("quota_definition_guid")?),
        })
    }
}

/// A quota definition; `memory_limit` is in megabytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaDefinition {
    pub guid: Guid,
    pub name: String,
    pub memory_limit: i64,
}

impl TryFrom<&ResourceRecord> for QuotaDefinition {
    type Error = QuotarollError;

    fn try_from(record: &ResourceRecord) -> Result<Self> {
        Ok(Self {
            guid: record.guid().clone(),
            name: record.entity_str("name")?.to_string(),
            memory_limit: record.entity_i64("memory_limit")?,
        })
    }
}

/// One organization's quota assignment at one poll instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollDocument {
    pub id: String,
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
    pub org_id: String,
    pub org_name: String,
    pub quota_id: String,
    pub quota_name: String,
    pub memory_limit: i64,
}

impl PollDocument {
    /// `{org}-{quota}-{timestamp}` with the timestamp truncated to whole seconds
    pub fn build_id(org_id: &Guid, quota_id: &Guid, timestamp: DateTime<Utc>) -> String {
        format!(
            "{}-{}-{}",
            org_id,
            quota_id,
            timestamp.trunc_subsecs(0).format("%Y-%m-%dT%H:%M:%S")
        )
    }
}

/// Result of one per-day lookup attached to a summary
///
/// Lookups that found nothing are kept (`found: false`) so that the detail
/// list always has one entry per calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub found: bool,
    #[serde(rename = "_source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<serde_json::Value>,
}

/// Monthly roll-up for one organization
///
/// `metrics` holds the summed fields of the aggregation profile and is
/// flattened into the document, so a quota summary serializes with a
/// top-level `memory_limit` field.
///
/// # Examples
/// ```
/// use quotaroll_core::types::{Period, SummaryDocument};
///
/// let period: Period = "2024-03".parse().unwrap();
/// let doc = SummaryDocument::new(period, "org-a");
/// assert_eq!(doc.id, "2024-03-org-a");
/// assert_eq!(doc.date.to_rfc3339(), "2024-03-01T00:00:00+00:00");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryDocument {
    pub id: String,
    pub period: Period,
    pub date: DateTime<Utc>,
    #[serde(rename = "org_id")]
    pub organization_id: String,
    #[serde(rename = "org_names", default)]
    pub organization_names: Vec<String>,
    #[serde(default)]
    pub quota_ids: Vec<String>,
    #[serde(flatten)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_detail: Option<Vec<DetailRecord>>,
}

impl SummaryDocument {
    /// Empty summary keyed for `(period, organization_id)`
    pub fn new(period: Period, organization_id: impl Into<String>) -> Self {
        let organization_id = organization_id.into();
        Self {
            id: Self::build_id(period, &organization_id),
            period,
            date: period.start(),
            organization_id,
            organization_names: Vec::new(),
            quota_ids: Vec::new(),
            metrics: BTreeMap::new(),
            daily_detail: None,
        }
    }

    /// `{period}-{organization_id}`
    pub fn build_id(period: Period, organization_id: &str) -> String {
        format!("{period}-{organization_id}")
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}
