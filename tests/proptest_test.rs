//! Property-based tests for period arithmetic and id construction

use chrono::{Datelike, Duration, TimeZone, Utc};
use proptest::prelude::*;
use quotaroll_core::mapping::daily_detail_ids;
use quotaroll_core::query::{AggregationProfile, build_aggregate_query};
use quotaroll_core::types::{Period, SummaryDocument};

prop_compose! {
    fn arb_period()(
        year in 1970i32..2200,
        month in 1u32..=12,
    ) -> Period {
        Period::new(year, month).unwrap()
    }
}

proptest! {
    #[test]
    fn test_next_and_previous_are_inverse(period in arb_period()) {
        prop_assert_eq!(period.next().previous(), period);
        prop_assert_eq!(period.previous().next(), period);
        prop_assert!(period.previous() < period);
        prop_assert!(period < period.next());
    }

    #[test]
    fn test_bounds_are_half_open(period in arb_period()) {
        prop_assert!(period.contains(&period.start()));
        prop_assert!(!period.contains(&period.end()));
        prop_assert!(period.contains(&(period.end() - Duration::seconds(1))));
        prop_assert_eq!(period.end(), period.next().start());
    }

    #[test]
    fn test_every_instant_belongs_to_exactly_one_period(
        secs in 0i64..7_000_000_000,
    ) {
        let instant = Utc.timestamp_opt(secs, 0).unwrap();
        let period = Period::containing(instant.date_naive());

        prop_assert!(period.contains(&instant));
        prop_assert!(!period.previous().contains(&instant));
        prop_assert!(!period.next().contains(&instant));
    }

    #[test]
    fn test_days_cover_the_month(period in arb_period()) {
        let days: Vec<_> = period.days().collect();
        prop_assert!((28..=31).contains(&period.days_in_month()));
        prop_assert_eq!(days.len() as u32, period.days_in_month());
        prop_assert!(days.iter().all(|d| d.month() == period.month()));
        prop_assert_eq!(days[0], period.first_day());
    }

    #[test]
    fn test_detail_ids_are_ordered_and_unique(period in arb_period(), org in "[a-z0-9-]{1,36}") {
        let ids = daily_detail_ids(&org, period);
        prop_assert_eq!(ids.len() as u32, period.days_in_month());
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(sorted, ids);
    }

    #[test]
    fn test_summary_id_is_stable(period in arb_period(), org in "[a-z0-9-]{1,36}") {
        let first = SummaryDocument::new(period, org.clone());
        let second = SummaryDocument::new(period, org.clone());
        prop_assert_eq!(&first.id, &second.id);
        prop_assert_eq!(first.id, format!("{}-{}", period, org));
    }

    #[test]
    fn test_query_range_matches_period(period in arb_period()) {
        let query = build_aggregate_query(period, &AggregationProfile::quotas());
        let range = &query["query"]["bool"]["filter"][0]["range"]["@timestamp"];

        let gte = range["gte"].as_str().unwrap();
        let lt = range["lt"].as_str().unwrap();
        prop_assert_eq!(gte.parse::<chrono::DateTime<Utc>>().unwrap(), period.start());
        prop_assert_eq!(lt.parse::<chrono::DateTime<Utc>>().unwrap(), period.end());
    }
}
