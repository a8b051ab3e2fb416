//! Chart range resolution.
//!
//! The chart API only accepts a fixed set of lookback windows. Given the
//! earliest instant for which data is needed, pick the shortest window that is
//! guaranteed to include it.

use crate::clock::Clock;
use chrono::{DateTime, Datelike, Duration, Months, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Lookback windows supported by the chart API, shortest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChartRange {
    #[serde(rename = "5d")]
    FiveDays,
    #[serde(rename = "1m")]
    OneMonth,
    #[serde(rename = "3m")]
    ThreeMonths,
    #[serde(rename = "6m")]
    SixMonths,
    #[serde(rename = "ytd")]
    YearToDate,
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "2y")]
    TwoYears,
    #[serde(rename = "5y")]
    FiveYears,
    #[serde(rename = "max")]
    Max,
}

impl ChartRange {
    /// Every tier, shortest to longest.
    pub const ALL: [ChartRange; 9] = [
        ChartRange::FiveDays,
        ChartRange::OneMonth,
        ChartRange::ThreeMonths,
        ChartRange::SixMonths,
        ChartRange::YearToDate,
        ChartRange::OneYear,
        ChartRange::TwoYears,
        ChartRange::FiveYears,
        ChartRange::Max,
    ];

    /// Literal used in the API path.
    pub fn as_str(self) -> &'static str {
        match self {
            ChartRange::FiveDays => "5d",
            ChartRange::OneMonth => "1m",
            ChartRange::ThreeMonths => "3m",
            ChartRange::SixMonths => "6m",
            ChartRange::YearToDate => "ytd",
            ChartRange::OneYear => "1y",
            ChartRange::TwoYears => "2y",
            ChartRange::FiveYears => "5y",
            ChartRange::Max => "max",
        }
    }

    /// Earliest instant this tier is guaranteed to cover as of `now`.
    ///
    /// One day is added to every window so a boundary day the API trims is
    /// never relied on.
    pub fn coverage_start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        let start = match self {
            ChartRange::FiveDays => now - Duration::days(5),
            ChartRange::OneMonth => months_back(now, 1),
            ChartRange::ThreeMonths => months_back(now, 3),
            ChartRange::SixMonths => months_back(now, 6),
            ChartRange::YearToDate => Utc
                .with_ymd_and_hms(now.year(), 1, 1, 0, 0, 0)
                .single()
                .unwrap_or(now),
            ChartRange::OneYear => months_back(now, 12),
            ChartRange::TwoYears => months_back(now, 24),
            ChartRange::FiveYears => months_back(now, 60),
            ChartRange::Max => months_back(now, 15 * 12),
        };
        start + Duration::days(1)
    }
}

impl fmt::Display for ChartRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChartRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChartRange::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown chart range '{s}'"))
    }
}

/// Calendar subtraction; the day clamps to the end of a shorter month.
fn months_back(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Pick the shortest tier covering `earliest_needed` as of `now`.
pub fn resolve_at(now: DateTime<Utc>, earliest_needed: Option<DateTime<Utc>>) -> ChartRange {
    let Some(earliest) = earliest_needed else {
        return ChartRange::Max;
    };
    ChartRange::ALL
        .into_iter()
        .find(|tier| tier.coverage_start(now) <= earliest)
        .unwrap_or(ChartRange::Max)
}

/// Range resolution against an injected clock.
#[derive(Clone)]
pub struct RangeResolver {
    clock: Arc<dyn Clock>,
}

impl RangeResolver {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn resolve(&self, earliest_needed: Option<DateTime<Utc>>) -> ChartRange {
        resolve_at(self.clock.now(), earliest_needed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn no_prior_data_means_max() {
        assert_eq!(resolve_at(now(), None), ChartRange::Max);
    }

    #[test]
    fn now_resolves_to_shortest() {
        assert_eq!(resolve_at(now(), Some(now())), ChartRange::FiveDays);
    }

    #[test]
    fn tier_boundaries() {
        let n = now();
        // 5d covers back to now - 4 days.
        assert_eq!(resolve_at(n, Some(n - Duration::days(4))), ChartRange::FiveDays);
        assert_eq!(
            resolve_at(n, Some(n - Duration::days(4) - Duration::seconds(1))),
            ChartRange::OneMonth
        );
        // 1m covers back to 2023-05-16 12:00.
        let one_month = Utc.with_ymd_and_hms(2023, 5, 16, 12, 0, 0).unwrap();
        assert_eq!(resolve_at(n, Some(one_month)), ChartRange::OneMonth);
        assert_eq!(
            resolve_at(n, Some(one_month - Duration::seconds(1))),
            ChartRange::ThreeMonths
        );
    }

    #[test]
    fn year_to_date_sits_between_six_months_and_one_year() {
        // Mid-December: ytd (Jan 2) reaches further back than 6m (mid-June).
        let n = Utc.with_ymd_and_hms(2023, 12, 15, 0, 0, 0).unwrap();
        let feb = Utc.with_ymd_and_hms(2023, 2, 1, 0, 0, 0).unwrap();
        assert_eq!(resolve_at(n, Some(feb)), ChartRange::YearToDate);

        // Early February: ytd is shorter than 1m, so 1m is chosen first.
        let n = Utc.with_ymd_and_hms(2023, 2, 10, 0, 0, 0).unwrap();
        let jan_20 = Utc.with_ymd_and_hms(2023, 1, 20, 0, 0, 0).unwrap();
        assert_eq!(resolve_at(n, Some(jan_20)), ChartRange::OneMonth);
    }

    #[test]
    fn very_old_data_means_max() {
        let ancient = Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(resolve_at(now(), Some(ancient)), ChartRange::Max);
        let four_years = now() - Duration::days(4 * 365);
        assert_eq!(resolve_at(now(), Some(four_years)), ChartRange::FiveYears);
    }

    #[test]
    fn month_subtraction_clamps() {
        let n = Utc.with_ymd_and_hms(2023, 3, 31, 0, 0, 0).unwrap();
        assert_eq!(
            ChartRange::OneMonth.coverage_start(n),
            Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn literals_round_trip() {
        for tier in ChartRange::ALL {
            assert_eq!(tier.as_str().parse::<ChartRange>().unwrap(), tier);
            assert_eq!(
                serde_json::to_value(tier).unwrap(),
                serde_json::Value::String(tier.as_str().to_string())
            );
        }
        assert!("10y".parse::<ChartRange>().is_err());
    }

    #[test]
    fn resolver_uses_injected_clock() {
        let clock = Arc::new(FixedClock::new(now()));
        let resolver = RangeResolver::new(clock.clone());
        let needed = now() - Duration::days(2);
        assert_eq!(resolver.resolve(Some(needed)), ChartRange::FiveDays);

        clock.advance(Duration::days(30));
        assert_eq!(resolver.resolve(Some(needed)), ChartRange::ThreeMonths);
    }

    proptest! {
        #[test]
        fn resolution_is_monotonic(
            now_secs in 946_684_800i64..2_000_000_000i64,
            a in 0i64..(20 * 366 * 86_400),
            b in 0i64..(20 * 366 * 86_400),
        ) {
            let now = DateTime::from_timestamp(now_secs, 0).unwrap();
            let (older, newer) = if a >= b { (a, b) } else { (b, a) };
            let earlier = now - Duration::seconds(older);
            let later = now - Duration::seconds(newer);
            prop_assert!(resolve_at(now, Some(earlier)) >= resolve_at(now, Some(later)));
        }

        #[test]
        fn chosen_tier_covers_the_request(
            now_secs in 946_684_800i64..2_000_000_000i64,
            back in 0i64..(14 * 365 * 86_400),
        ) {
            let now = DateTime::from_timestamp(now_secs, 0).unwrap();
            let needed = now - Duration::seconds(back);
            let tier = resolve_at(now, Some(needed));
            prop_assert!(tier.coverage_start(now) <= needed);
        }
    }
}
