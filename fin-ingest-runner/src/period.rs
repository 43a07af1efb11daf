//! Processing periods from positional `START [END]` arguments.

use chrono::{Days, NaiveDate};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeriodError {
    #[error("invalid date '{value}': {source}")]
    InvalidDate {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("period start {start} is after end {end}")]
    Reversed { start: NaiveDate, end: NaiveDate },

    #[error("lookback of {0} days is out of range")]
    Lookback(u32),
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, PeriodError> {
        if start > end {
            return Err(PeriodError::Reversed { start, end });
        }
        Ok(Self { start, end })
    }

    /// From optional ISO dates: none is `today - lookback_days ..= today`,
    /// one is that single day, two are `start ..= end`.
    pub fn from_args(
        start: Option<&str>,
        end: Option<&str>,
        today: NaiveDate,
        lookback_days: u32,
    ) -> Result<Self, PeriodError> {
        match (start, end) {
            (Some(start), Some(end)) => Self::new(parse_date(start)?, parse_date(end)?),
            (Some(day), None) | (None, Some(day)) => {
                let day = parse_date(day)?;
                Self::new(day, day)
            }
            (None, None) => {
                let start = today
                    .checked_sub_days(Days::new(lookback_days.into()))
                    .ok_or(PeriodError::Lookback(lookback_days))?;
                Self::new(start, today)
            }
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, PeriodError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|source| PeriodError::InvalidDate {
        value: value.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn default_period_looks_back() {
        let p = Period::from_args(None, None, d(2024, 3, 15), 10).unwrap();
        assert_eq!(p, Period { start: d(2024, 3, 5), end: d(2024, 3, 15) });
        assert_eq!(p.to_string(), "2024-03-05 to 2024-03-15");
    }

    #[test]
    fn single_date_is_one_day() {
        let p = Period::from_args(Some("2024-01-02"), None, d(2024, 3, 15), 10).unwrap();
        assert_eq!(p.start, p.end);
        assert_eq!(p.start, d(2024, 1, 2));
    }

    #[test]
    fn explicit_range() {
        let p = Period::from_args(Some("2023-12-29"), Some("2024-01-05"), d(2024, 3, 15), 10).unwrap();
        assert_eq!(p, Period { start: d(2023, 12, 29), end: d(2024, 1, 5) });
    }

    #[test]
    fn rejects_bad_input() {
        let today = d(2024, 3, 15);
        assert!(matches!(
            Period::from_args(Some("2024-13-01"), None, today, 10),
            Err(PeriodError::InvalidDate { .. })
        ));
        assert!(matches!(
            Period::from_args(Some("2024-02-01"), Some("2024-01-01"), today, 10),
            Err(PeriodError::Reversed { .. })
        ));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn default_period_spans_lookback(offset in 0i64..40_000, lookback in 0u32..3_650) {
                let today = d(1990, 1, 1) + chrono::Duration::days(offset);
                let p = Period::from_args(None, None, today, lookback).unwrap();
                prop_assert_eq!(p.end, today);
                prop_assert_eq!((p.end - p.start).num_days(), i64::from(lookback));
            }

            #[test]
            fn iso_round_trip(offset in 0i64..40_000) {
                let day = d(1990, 1, 1) + chrono::Duration::days(offset);
                let text = day.to_string();
                let p = Period::from_args(Some(&text), None, d(2000, 1, 1), 10).unwrap();
                prop_assert_eq!(p, Period { start: day, end: day });
            }
        }
    }
}
