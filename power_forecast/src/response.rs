//! Externally visible payloads
//!
//! Forecasts, county lists and errors are mapped to plain serde structs so
//! any transport can emit them as JSON.

use crate::engine::{ForecastPoint, ForecastResult};
use crate::error::{ErrorCategory, ForecastError, Result};
use serde::{Deserialize, Serialize};

/// Horizon used when a request does not name one
pub const DEFAULT_PERIODS: i64 = 12;
/// Shortest horizon a request may ask for
pub const MIN_PERIODS: usize = 1;
/// Longest horizon a request may ask for
pub const MAX_PERIODS: usize = 36;

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// A validated forecast request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub county: String,
    pub periods: usize,
}

impl ForecastRequest {
    /// Validate a county and optional horizon
    pub fn new(county: &str, periods: Option<i64>) -> Result<Self> {
        let requested = periods.unwrap_or(DEFAULT_PERIODS);
        let periods = usize::try_from(requested)
            .ok()
            .filter(|p| (MIN_PERIODS..=MAX_PERIODS).contains(p))
            .ok_or(ForecastError::InvalidPeriods {
                requested,
                min: MIN_PERIODS,
                max: MAX_PERIODS,
            })?;

        let county = county.trim();
        if county.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "County name must not be empty".to_string(),
            ));
        }

        Ok(Self {
            county: county.to_string(),
            periods,
        })
    }
}

/// One forecast month as emitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    /// First day of the month, `YYYY-MM-DD`
    pub date: String,
    pub predicted_kwh: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

impl From<&ForecastPoint> for ForecastEntry {
    fn from(point: &ForecastPoint) -> Self {
        Self {
            date: point.date.format("%Y-%m-%d").to_string(),
            predicted_kwh: round2(point.predicted_kwh),
            lower_bound: round2(point.lower_bound),
            upper_bound: round2(point.upper_bound),
        }
    }
}

/// Forecast payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResponse {
    pub county: String,
    pub periods: usize,
    pub model_type: String,
    pub forecast: Vec<ForecastEntry>,
}

impl From<&ForecastResult> for ForecastResponse {
    fn from(result: &ForecastResult) -> Self {
        Self {
            county: result.county.clone(),
            periods: result.periods,
            model_type: result.model_kind.as_str().to_string(),
            forecast: result.forecast.iter().map(ForecastEntry::from).collect(),
        }
    }
}

impl ForecastResponse {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// County list payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountiesResponse {
    pub total_counties: usize,
    pub counties: Vec<String>,
}

impl CountiesResponse {
    /// Sorted, de-duplicated list
    pub fn new(mut counties: Vec<String>) -> Self {
        counties.sort();
        counties.dedup();
        Self {
            total_counties: counties.len(),
            counties,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Error payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error kind, e.g. `county_not_found`
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_counties: Option<Vec<String>>,
}

impl From<&ForecastError> for ErrorResponse {
    fn from(err: &ForecastError) -> Self {
        let available_counties = match err {
            ForecastError::CountyNotFound { available, .. } => Some(available.clone()),
            _ => None,
        };
        // Infrastructure and internal details stay in the logs
        let message = match err.category() {
            ErrorCategory::Infrastructure | ErrorCategory::Internal => {
                "The forecast service is not able to serve this request".to_string()
            }
            _ => err.to_string(),
        };
        Self {
            error: err.kind().to_string(),
            message,
            available_counties,
        }
    }
}

impl ErrorResponse {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
