//! Utility functions for the power_forecast crate

use crate::calendar::YearMonth;
use crate::data::{ConsumptionHistory, CountySeries};
use crate::error::{ForecastError, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::PI;

/// Shape of a synthetic consumption series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticProfile {
    /// Mean kWh per household in the first month
    pub base_kwh: f64,
    /// Change in kWh per household per month
    pub monthly_growth: f64,
    /// Peak-to-mean seasonal swing, highest in July
    pub seasonal_amplitude: f64,
    /// Standard deviation of the monthly noise
    pub noise_std: f64,
}

impl Default for SyntheticProfile {
    fn default() -> Self {
        Self {
            base_kwh: 550.0,
            monthly_growth: 1.5,
            seasonal_amplitude: 120.0,
            noise_std: 15.0,
        }
    }
}

/// Deterministic monthly series for tests and demos
///
/// The same `seed` always yields the same values. Values never go below zero.
pub fn synthetic_series(
    county: &str,
    start: YearMonth,
    months: usize,
    profile: SyntheticProfile,
    seed: u64,
) -> Result<CountySeries> {
    let noise = Normal::new(0.0, profile.noise_std)
        .map_err(|e| ForecastError::InvalidParameter(format!("Noise distribution: {}", e)))?;
    let mut rng = StdRng::seed_from_u64(seed);

    let mut values = Vec::with_capacity(months);
    for i in 0..months {
        let period = start.checked_add_months(i as i64).ok_or_else(|| {
            ForecastError::InvalidParameter(format!("{} months after {} is out of range", i, start))
        })?;
        let season = ((period.month() as f64 - 4.0) * 2.0 * PI / 12.0).sin();
        let value = profile.base_kwh
            + profile.monthly_growth * i as f64
            + profile.seasonal_amplitude * season
            + noise.sample(&mut rng);
        values.push((period, value.max(0.0)));
    }

    CountySeries::from_values(county, &values)
}

/// Synthetic history for several counties, each with its own seed and level
pub fn synthetic_history(
    counties: &[&str],
    start: YearMonth,
    months: usize,
    seed: u64,
) -> Result<ConsumptionHistory> {
    let mut records = Vec::new();
    for (i, county) in counties.iter().enumerate() {
        let profile = SyntheticProfile {
            base_kwh: 450.0 + 60.0 * i as f64,
            ..SyntheticProfile::default()
        };
        let series = synthetic_series(county, start, months, profile, seed + i as u64)?;
        records.extend(series.records().iter().cloned());
    }
    ConsumptionHistory::from_records(records)
}

/// Split a series into its first `len - holdout` months and the rest
pub fn holdout_split(series: &CountySeries, holdout: usize) -> Result<(CountySeries, Vec<(YearMonth, f64)>)> {
    if holdout == 0 || holdout >= series.len() {
        return Err(ForecastError::InvalidParameter(format!(
            "Holdout of {} months needs a longer series than {}",
            holdout,
            series.len()
        )));
    }
    let split = series.records()[series.len() - holdout - 1].period();
    let train = series.truncate_after(split)?;
    let test = series
        .records()
        .iter()
        .filter(|r| r.period() > split)
        .map(|r| (r.period(), r.kwh_per_household()))
        .collect();
    Ok((train, test))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn start() -> YearMonth {
        YearMonth::new(2022, 1).unwrap()
    }

    #[test]
    fn test_synthetic_series_is_seeded() {
        let a = synthetic_series("Napa", start(), 24, SyntheticProfile::default(), 7).unwrap();
        let b = synthetic_series("Napa", start(), 24, SyntheticProfile::default(), 7).unwrap();
        let c = synthetic_series("Napa", start(), 24, SyntheticProfile::default(), 8).unwrap();

        assert_eq!(a.values(), b.values());
        assert_ne!(a.values(), c.values());
        assert_eq!(a.last_period(), YearMonth::new(2023, 12).unwrap());
        assert!(a.values().iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn test_holdout_split() {
        let series = synthetic_series("Napa", start(), 36, SyntheticProfile::default(), 1).unwrap();
        let (train, test) = holdout_split(&series, 6).unwrap();

        assert_eq!(train.len(), 30);
        assert_eq!(test.len(), 6);
        assert_eq!(test[0].0, train.last_period().succ().unwrap());
        assert!(holdout_split(&series, 36).is_err());
    }
}
