//! Run configuration
//!
//! Turns the raw command-line values into validated settings. Validation
//! never stops at the first problem: every missing or malformed setting is
//! collected into one [`ConfigErrors`] so a misconfigured job can be fixed in
//! one go. Nothing here touches the network.

use crate::cli::{AggregateArgs, PeriodArgs, PollArgs, StoreArgs, SummarizeArgs};
use crate::pipeline::AggregationJob;
use chrono::{DateTime, Utc};
use quotaroll_core::error::{ConfigErrors, Result};
use quotaroll_core::query::{AggregationProfile, expand_index_pattern};
use quotaroll_core::reconcile::MissingQuotaPolicy;
use quotaroll_core::types::Period;
use reqwest::Url;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default source of container metrics, one index per day
pub const DEFAULT_SOURCE_INDEX: &str = "logs-app-{year}.{month}.*";

/// Default timeout of the aggregation search
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 300;

/// Settings of the `poll` command
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    pub es_uri: String,
    pub cf_api_url: String,
    pub cf_client_id: String,
    pub cf_client_secret: String,
    pub poll_index: String,
    pub on_missing_quota: MissingQuotaPolicy,
}

impl PollConfig {
    /// Index placeholders are expanded against the month containing `now`,
    /// so a `{year}.{month}` poll index rolls over with the calendar.
    pub fn from_args(args: &PollArgs, now: DateTime<Utc>) -> Result<Self> {
        let mut errors = ConfigErrors::default();

        let es_uri = required_url(&mut errors, "ES_URI", &args.store.es_uri);
        let cf_api_url = required_url(&mut errors, "CF_API_URL", &args.cf_api_url);
        let cf_client_id = required(&mut errors, "CF_CLIENT_ID", &args.cf_client_id);
        let cf_client_secret = required(&mut errors, "CF_CLIENT_SECRET", &args.cf_client_secret);
        let poll_index = required(&mut errors, "POLL_QUOTA_INDEX", &args.poll_index);
        let on_missing_quota = optional_parsed::<MissingQuotaPolicy>(
            &mut errors,
            "ON_MISSING_QUOTA",
            &args.on_missing_quota,
        )
        .unwrap_or_default();

        errors.into_result()?;
        Ok(Self {
            es_uri: es_uri.unwrap_or_default(),
            cf_api_url: cf_api_url.unwrap_or_default(),
            cf_client_id: cf_client_id.unwrap_or_default(),
            cf_client_secret: cf_client_secret.unwrap_or_default(),
            poll_index: expand_index_pattern(
                &poll_index.unwrap_or_default(),
                Period::containing(now.date_naive()),
            ),
            on_missing_quota,
        })
    }
}

/// Settings of the `aggregate` and `summarize` commands
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationConfig {
    pub es_uri: String,
    pub query_timeout: Duration,
    pub job: AggregationJob,
}

/// Values common to both roll-ups, validated into `errors`
struct PeriodSettings {
    es_uri: Option<String>,
    period: Option<Period>,
    query_timeout: Duration,
    group_cap: Option<u32>,
    distinct_cap: Option<u32>,
    snapshot_dir: Option<PathBuf>,
}

impl PeriodSettings {
    fn validate(
        errors: &mut ConfigErrors,
        store: &StoreArgs,
        args: &PeriodArgs,
        now: DateTime<Utc>,
    ) -> Self {
        let es_uri = required_url(errors, "ES_URI", &store.es_uri);
        let period = match non_empty(&args.date) {
            None => Some(Period::preceding(now)),
            Some(raw) => match raw.parse::<Period>() {
                Ok(period) => Some(period),
                Err(_) => {
                    errors.push("DATE", format!("expected YYYY-MM, got '{raw}'"));
                    None
                }
            },
        };
        let query_timeout = positive::<u64>(errors, "QUERY_TIMEOUT_SECS", &args.query_timeout_secs)
            .unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS);
        let group_cap = terms_size(errors, "GROUP_CAP", &args.group_cap);
        let distinct_cap = terms_size(errors, "DISTINCT_CAP", &args.distinct_cap);

        let snapshot_dir = if args.no_snapshot {
            None
        } else {
            Some(args.out_dir.clone().unwrap_or_else(|| PathBuf::from(".")))
        };

        Self {
            es_uri,
            period,
            query_timeout: Duration::from_secs(query_timeout),
            group_cap,
            distinct_cap,
            snapshot_dir,
        }
    }

    fn profile(&self, mut profile: AggregationProfile) -> AggregationProfile {
        if let Some(cap) = self.group_cap {
            profile = profile.with_group_cap(cap);
        }
        if let Some(cap) = self.distinct_cap {
            profile = profile.with_distinct_cap(cap);
        }
        profile
    }
}

impl AggregationConfig {
    /// Settings of `aggregate`: quota profile over the poll index
    pub fn from_aggregate_args(args: &AggregateArgs, now: DateTime<Utc>) -> Result<Self> {
        let mut errors = ConfigErrors::default();
        let settings = PeriodSettings::validate(&mut errors, &args.store, &args.period, now);
        let poll_index = required(&mut errors, "POLL_QUOTA_INDEX", &args.poll_index);
        let aggregate_index = required(&mut errors, "AGG_QUOTA_INDEX", &args.aggregate_index);
        errors.into_result()?;

        let (Some(period), Some(poll_index), Some(aggregate_index)) =
            (settings.period, poll_index, aggregate_index)
        else {
            return Err(incomplete());
        };
        let poll_index = expand_index_pattern(&poll_index, period);

        Ok(Self {
            es_uri: settings.es_uri.clone().unwrap_or_default(),
            query_timeout: settings.query_timeout,
            job: AggregationJob {
                period,
                profile: settings.profile(AggregationProfile::quotas()),
                source_index: poll_index.clone(),
                destination_index: aggregate_index,
                detail_index: (!args.skip_daily_detail).then_some(poll_index),
                snapshot_dir: settings.snapshot_dir,
            },
        })
    }

    /// Settings of `summarize`: container-memory profile over the log indices
    pub fn from_summarize_args(args: &SummarizeArgs, now: DateTime<Utc>) -> Result<Self> {
        let mut errors = ConfigErrors::default();
        let settings = PeriodSettings::validate(&mut errors, &args.store, &args.period, now);
        let source_index =
            non_empty(&args.source_index).unwrap_or_else(|| DEFAULT_SOURCE_INDEX.to_string());
        let bill_index = required(&mut errors, "BILL_INDEX", &args.bill_index);
        errors.into_result()?;

        let (Some(period), Some(bill_index)) = (settings.period, bill_index) else {
            return Err(incomplete());
        };

        Ok(Self {
            es_uri: settings.es_uri.clone().unwrap_or_default(),
            query_timeout: settings.query_timeout,
            job: AggregationJob {
                period,
                profile: settings.profile(AggregationProfile::container_memory()),
                source_index: expand_index_pattern(&source_index, period),
                destination_index: bill_index,
                detail_index: None,
                snapshot_dir: settings.snapshot_dir,
            },
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required(errors: &mut ConfigErrors, field: &str, value: &Option<String>) -> Option<String> {
    let value = non_empty(value);
    if value.is_none() {
        errors.push(field, "is required");
    }
    value
}

fn required_url(errors: &mut ConfigErrors, field: &str, value: &Option<String>) -> Option<String> {
    let value = required(errors, field, value)?;
    match Url::parse(&value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(value),
        Ok(url) => {
            errors.push(field, format!("unsupported scheme '{}'", url.scheme()));
            None
        }
        Err(e) => {
            errors.push(field, format!("invalid URL: {e}"));
            None
        }
    }
}

fn optional_parsed<T>(errors: &mut ConfigErrors, field: &str, value: &Option<String>) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = non_empty(value)?;
    match raw.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            errors.push(field, e.to_string());
            None
        }
    }
}

fn positive<T>(errors: &mut ConfigErrors, field: &str, value: &Option<String>) -> Option<T>
where
    T: FromStr + PartialOrd + Default,
{
    let raw = non_empty(value)?;
    match raw.parse::<T>() {
        Ok(parsed) if parsed > T::default() => Some(parsed),
        _ => {
            errors.push(field, format!("expected a positive integer, got '{raw}'"));
            None
        }
    }
}

/// Terms aggregation sizes are signed 32-bit on the store side
fn terms_size(errors: &mut ConfigErrors, field: &str, value: &Option<String>) -> Option<u32> {
    let size = positive::<u32>(errors, field, value)?;
    if size > i32::MAX as u32 {
        errors.push(field, format!("must be at most {}, got {size}", i32::MAX));
        return None;
    }
    Some(size)
}

// Only reachable if a validator returned None without recording a problem
fn incomplete() -> quotaroll_core::QuotarollError {
    let mut errors = ConfigErrors::default();
    errors.push("configuration", "incomplete settings");
    quotaroll_core::QuotarollError::Config(errors)
}
