//! Feature engineering shared by training and serving
//!
//! Every feature is derived from a single county's own series. Lags are
//! looked up by calendar month, so a gap in the history yields a missing
//! lag instead of silently borrowing a neighbouring month.

use crate::calendar::YearMonth;
use crate::data::CountySeries;
use crate::error::{ForecastError, Result};
use energy_math::CyclicalPair;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cycle length used for the year encoding
pub const YEAR_CYCLE: f64 = 4.0;
/// Cycle length used for the month encoding
pub const MONTH_CYCLE: f64 = 12.0;
/// Months covered by the rolling mean, current month included
pub const ROLLING_WINDOW: i64 = 3;

/// A feature the builder knows how to derive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    CountyEncoded,
    Year,
    Month,
    YearSin,
    YearCos,
    MonthSin,
    MonthCos,
    Trend,
    #[serde(rename = "lag_1")]
    Lag1,
    #[serde(rename = "lag_12")]
    Lag12,
    #[serde(rename = "rolling_mean_3")]
    RollingMean3,
}

impl Feature {
    /// Every derivable feature, in the order the unified model is trained with
    pub const ALL: [Feature; 11] = [
        Feature::CountyEncoded,
        Feature::Year,
        Feature::Month,
        Feature::YearSin,
        Feature::YearCos,
        Feature::MonthSin,
        Feature::MonthCos,
        Feature::Trend,
        Feature::Lag1,
        Feature::Lag12,
        Feature::RollingMean3,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Feature::CountyEncoded => "county_encoded",
            Feature::Year => "year",
            Feature::Month => "month",
            Feature::YearSin => "year_sin",
            Feature::YearCos => "year_cos",
            Feature::MonthSin => "month_sin",
            Feature::MonthCos => "month_cos",
            Feature::Trend => "trend",
            Feature::Lag1 => "lag_1",
            Feature::Lag12 => "lag_12",
            Feature::RollingMean3 => "rolling_mean_3",
        }
    }

    /// True for features that depend on past values of the target
    pub fn is_autoregressive(&self) -> bool {
        matches!(
            self,
            Feature::Lag1 | Feature::Lag12 | Feature::RollingMean3
        )
    }

    /// Names of all features, in `ALL` order
    pub fn all_names() -> Vec<String> {
        Self::ALL.iter().map(|f| f.name().to_string()).collect()
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Feature {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.name() == s)
            .ok_or_else(|| ForecastError::InvalidMetadata(format!("Unknown feature '{}'", s)))
    }
}

/// Supplies values for months without ground truth
///
/// The forecast engine implements this to feed its own predictions back
/// into later horizon steps.
pub trait RecentValueEstimator {
    /// A value that is known for `period`: observed or already predicted
    fn known(&self, period: YearMonth) -> Option<f64>;

    /// A stand-in for `period` when nothing is known about it
    fn estimate(&self, period: YearMonth) -> Option<f64>;
}

/// All features of one month, with autoregressive ones possibly missing
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub county: String,
    pub period: YearMonth,
    pub county_code: Option<i64>,
    pub year_cycle: CyclicalPair,
    pub month_cycle: CyclicalPair,
    pub trend: f64,
    pub lag_1: Option<f64>,
    pub lag_12: Option<f64>,
    pub rolling_mean_3: Option<f64>,
}

impl FeatureRow {
    /// Value of `feature`, or `None` if it could not be derived
    pub fn value(&self, feature: Feature) -> Option<f64> {
        match feature {
            Feature::CountyEncoded => self.county_code.map(|c| c as f64),
            Feature::Year => Some(self.period.year() as f64),
            Feature::Month => Some(self.period.month() as f64),
            Feature::YearSin => Some(self.year_cycle.sin),
            Feature::YearCos => Some(self.year_cycle.cos),
            Feature::MonthSin => Some(self.month_cycle.sin),
            Feature::MonthCos => Some(self.month_cycle.cos),
            Feature::Trend => Some(self.trend),
            Feature::Lag1 => self.lag_1,
            Feature::Lag12 => self.lag_12,
            Feature::RollingMean3 => self.rolling_mean_3,
        }
    }

    /// True when every lag feature is present; training drops other rows
    pub fn is_complete(&self) -> bool {
        self.lag_1.is_some() && self.lag_12.is_some() && self.rolling_mean_3.is_some()
    }
}

/// Ordered feature names and values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    names: Vec<String>,
    values: Vec<f64>,
}

impl FeatureVector {
    /// Create a vector from ordered `(name, value)` pairs
    pub fn new(pairs: Vec<(String, f64)>) -> Result<Self> {
        let mut names = Vec::with_capacity(pairs.len());
        let mut values = Vec::with_capacity(pairs.len());
        for (name, value) in pairs {
            if names.contains(&name) {
                return Err(ForecastError::ValidationError(format!(
                    "Feature '{}' appears twice",
                    name
                )));
            }
            names.push(name);
            values.push(value);
        }
        Ok(Self { names, values })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// Fail unless names equal `contract` exactly, order included
    pub fn ensure_matches(&self, contract: &[String]) -> Result<()> {
        if self.names != contract {
            return Err(ForecastError::FeatureContractMismatch {
                expected: contract.to_vec(),
                actual: self.names.clone(),
            });
        }
        Ok(())
    }
}

/// Derives feature rows and contract-ordered vectors
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBuilder {
    trend_origin: YearMonth,
    county_code: Option<i64>,
}

impl FeatureBuilder {
    /// Builder whose trend counts years since `trend_origin`
    pub fn new(trend_origin: YearMonth) -> Self {
        Self {
            trend_origin,
            county_code: None,
        }
    }

    /// Attach the integer code used for the `county_encoded` feature
    pub fn with_county_code(mut self, code: i64) -> Self {
        self.county_code = Some(code);
        self
    }

    pub fn trend_origin(&self) -> YearMonth {
        self.trend_origin
    }

    /// Feature rows for every observed month of a series
    pub fn history_rows(&self, series: &CountySeries) -> Result<Vec<FeatureRow>> {
        series
            .records()
            .iter()
            .map(|record| {
                let period = record.period();
                let lag = |months: i64| {
                    period
                        .checked_add_months(-months)
                        .and_then(|p| series.value_at(p))
                };
                let window: Vec<f64> = (0..ROLLING_WINDOW)
                    .filter_map(|back| lag(back))
                    .collect();

                self.row(
                    series.county(),
                    period,
                    lag(1),
                    lag(12),
                    mean_of(&window),
                )
            })
            .collect()
    }

    /// Contract-ordered vectors for the complete rows of a series
    ///
    /// These are exactly the inputs a model trained on this series saw.
    pub fn history_vectors(
        &self,
        series: &CountySeries,
        contract: &[String],
    ) -> Result<Vec<(YearMonth, FeatureVector)>> {
        let features = parse_contract(contract)?;
        let needs_lags = features.iter().any(Feature::is_autoregressive);

        self.history_rows(series)?
            .into_iter()
            .filter(|row| !needs_lags || row.is_complete())
            .map(|row| Ok((row.period, self.vector(&row, contract)?)))
            .collect()
    }

    /// Feature row for a month without ground truth
    ///
    /// Lags come from the series first, then from the estimator's known
    /// values, then from its estimates. Without an estimator any gap is an
    /// `InsufficientHistory` error.
    pub fn future_row(
        &self,
        county: &str,
        series: Option<&CountySeries>,
        period: YearMonth,
        estimator: Option<&dyn RecentValueEstimator>,
    ) -> Result<FeatureRow> {
        let known = |p: YearMonth| {
            series
                .and_then(|s| s.value_at(p))
                .or_else(|| estimator.and_then(|e| e.known(p)))
        };
        let missing = |feature: Feature| ForecastError::InsufficientHistory {
            county: county.to_string(),
            period,
            feature: feature.name().to_string(),
        };

        let lag = |months: i64, feature: Feature| -> Result<f64> {
            let target = period
                .checked_add_months(-months)
                .ok_or_else(|| missing(feature))?;
            known(target)
                .or_else(|| estimator.and_then(|e| e.estimate(target)))
                .ok_or_else(|| missing(feature))
        };

        let lag_1 = lag(1, Feature::Lag1)?;
        let lag_12 = lag(12, Feature::Lag12)?;

        let window: Vec<f64> = (0..ROLLING_WINDOW)
            .filter_map(|back| period.checked_add_months(-back).and_then(|p| known(p)))
            .collect();
        let rolling_mean_3 = match mean_of(&window) {
            Some(mean) => mean,
            None => period
                .pred()
                .and_then(|p| estimator.and_then(|e| e.estimate(p)))
                .ok_or_else(|| missing(Feature::RollingMean3))?,
        };

        self.row(county, period, Some(lag_1), Some(lag_12), Some(rolling_mean_3))
    }

    /// Feature row for a month whose lags must all be observed
    pub fn future_row_strict(&self, series: &CountySeries, period: YearMonth) -> Result<FeatureRow> {
        self.future_row(series.county(), Some(series), period, None)
    }

    /// Project a row onto the ordered feature contract
    pub fn vector(&self, row: &FeatureRow, contract: &[String]) -> Result<FeatureVector> {
        let features = parse_contract(contract)?;
        let mut pairs = Vec::with_capacity(features.len());

        for feature in features {
            let value = match row.value(feature) {
                Some(value) => value,
                None if feature == Feature::CountyEncoded => {
                    return Err(ForecastError::FeatureContractMismatch {
                        expected: contract.to_vec(),
                        actual: Feature::ALL
                            .iter()
                            .filter(|f| row.value(**f).is_some())
                            .map(|f| f.name().to_string())
                            .collect(),
                    })
                }
                None => {
                    return Err(ForecastError::InsufficientHistory {
                        county: row.county.clone(),
                        period: row.period,
                        feature: feature.name().to_string(),
                    })
                }
            };
            pairs.push((feature.name().to_string(), value));
        }

        FeatureVector::new(pairs)
    }

    fn row(
        &self,
        county: &str,
        period: YearMonth,
        lag_1: Option<f64>,
        lag_12: Option<f64>,
        rolling_mean_3: Option<f64>,
    ) -> Result<FeatureRow> {
        Ok(FeatureRow {
            county: county.to_string(),
            period,
            county_code: self.county_code,
            year_cycle: CyclicalPair::encode(period.year() as f64, YEAR_CYCLE)?,
            month_cycle: CyclicalPair::encode(period.month() as f64, MONTH_CYCLE)?,
            trend: period.years_since(self.trend_origin),
            lag_1,
            lag_12,
            rolling_mean_3,
        })
    }
}

/// Parse a contract into features, rejecting unknown names
pub fn parse_contract(contract: &[String]) -> Result<Vec<Feature>> {
    contract
        .iter()
        .map(|name| {
            name.parse::<Feature>()
                .map_err(|_| ForecastError::FeatureContractMismatch {
                    expected: contract.to_vec(),
                    actual: Feature::all_names(),
                })
        })
        .collect()
}

fn mean_of(values: &[f64]) -> Option<f64> {
    energy_math::mean(values).ok()
}
