//! Calendar-month arithmetic
//!
//! Forecast horizons advance by whole calendar months. Working on a
//! `(year, month)` pair instead of a fixed day stride keeps month
//! boundaries exact no matter how long each month is.

use crate::error::{ForecastError, Result};
use chrono::{Datelike, NaiveDate};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const MIN_YEAR: i32 = 1;
const MAX_YEAR: i32 = 9999;

/// A calendar month, ordered chronologically
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

/// Reference month trend features are measured from
pub const DEFAULT_TREND_ORIGIN: YearMonth = YearMonth { year: 2022, month: 1 };
/// Last month of training data for unified models that do not record one
pub const DEFAULT_UNIFIED_CUTOFF: YearMonth = YearMonth { year: 2024, month: 11 };

impl YearMonth {
    /// Create a month, validating both components
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(ForecastError::ValidationError(format!(
                "Month must be between 1 and 12, got {}",
                month
            )));
        }
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(ForecastError::ValidationError(format!(
                "Year must be between {} and {}, got {}",
                MIN_YEAR, MAX_YEAR, year
            )));
        }
        Ok(Self { year, month })
    }

    /// The month containing `date`
    pub fn from_date(date: NaiveDate) -> Result<Self> {
        Self::new(date.year(), date.month())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    fn index(&self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    fn from_index(index: i64) -> Option<Self> {
        let year = index.div_euclid(12);
        let month = index.rem_euclid(12) as u32 + 1;
        let year = i32::try_from(year).ok()?;
        Self::new(year, month).ok()
    }

    /// Shift by `months` (negative values go back in time)
    pub fn checked_add_months(&self, months: i64) -> Option<Self> {
        Self::from_index(self.index().checked_add(months)?)
    }

    /// The following month
    pub fn succ(&self) -> Option<Self> {
        self.checked_add_months(1)
    }

    /// The preceding month
    pub fn pred(&self) -> Option<Self> {
        self.checked_add_months(-1)
    }

    /// Signed number of months from `self` to `other`
    pub fn months_until(&self, other: YearMonth) -> i64 {
        other.index() - self.index()
    }

    /// First day of the month
    pub fn first_day(&self) -> NaiveDate {
        // Components were validated in `new`, so the date always exists
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Elapsed time since `origin`, in fractional years of 365 days
    pub fn years_since(&self, origin: YearMonth) -> f64 {
        (self.first_day() - origin.first_day()).num_days() as f64 / 365.0
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = ForecastError;

    /// Accepts `YYYY-MM` or a full `YYYY-MM-DD` date
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Self::from_date(date);
        }

        let (year, month) = s.split_once('-').ok_or_else(|| {
            ForecastError::ValidationError(format!("Expected YYYY-MM, got '{}'", s))
        })?;
        let year = year.parse::<i32>().map_err(|e| {
            ForecastError::ValidationError(format!("Invalid year in '{}': {}", s, e))
        })?;
        let month = month.parse::<u32>().map_err(|e| {
            ForecastError::ValidationError(format!("Invalid month in '{}': {}", s, e))
        })?;
        Self::new(year, month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// The `periods` consecutive months strictly after `cutoff`
pub fn month_horizon(cutoff: YearMonth, periods: usize) -> Result<Vec<YearMonth>> {
    let mut horizon = Vec::with_capacity(periods);
    let mut current = cutoff;

    for _ in 0..periods {
        current = current.succ().ok_or_else(|| {
            ForecastError::ValidationError(format!(
                "Horizon of {} months after {} leaves the supported calendar range",
                periods, cutoff
            ))
        })?;
        horizon.push(current);
    }

    Ok(horizon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ym(year: i32, month: u32) -> YearMonth {
        YearMonth::new(year, month).unwrap()
    }

    #[test]
    fn test_month_arithmetic_crosses_years() {
        assert_eq!(ym(2024, 12).succ(), Some(ym(2025, 1)));
        assert_eq!(ym(2025, 1).pred(), Some(ym(2024, 12)));
        assert_eq!(ym(2024, 3).checked_add_months(-12), Some(ym(2023, 3)));
        assert_eq!(ym(2023, 11).months_until(ym(2025, 2)), 15);
    }

    #[test]
    fn test_horizon_is_gapless() {
        let horizon = month_horizon(ym(2024, 11), 6).unwrap();
        let dates: Vec<String> = horizon.iter().map(|m| m.first_day().to_string()).collect();
        assert_eq!(
            dates,
            vec![
                "2024-12-01",
                "2025-01-01",
                "2025-02-01",
                "2025-03-01",
                "2025-04-01",
                "2025-05-01"
            ]
        );
    }

    #[test]
    fn test_long_horizon_has_no_drift() {
        // A 31-day stride would skip or repeat a month within three years
        let horizon = month_horizon(ym(2024, 1), 36).unwrap();
        for pair in horizon.windows(2) {
            assert_eq!(pair[0].months_until(pair[1]), 1);
        }
        assert_eq!(horizon.last(), Some(&ym(2027, 1)));
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("2024-07".parse::<YearMonth>().unwrap(), ym(2024, 7));
        assert_eq!("2024-07-01".parse::<YearMonth>().unwrap(), ym(2024, 7));
        assert_eq!(ym(2024, 7).to_string(), "2024-07");
        assert!("2024-13".parse::<YearMonth>().is_err());
        assert!("July".parse::<YearMonth>().is_err());
    }

    #[test]
    fn test_years_since() {
        let origin = ym(2022, 1);
        assert_eq!(ym(2022, 1).years_since(origin), 0.0);
        assert!((ym(2023, 1).years_since(origin) - 1.0).abs() < 1e-12);
        assert!(ym(2022, 2).years_since(origin) < ym(2022, 3).years_since(origin));
    }
}
