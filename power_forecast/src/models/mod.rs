//! Forecastable model capability and its two variants
//!
//! A trained model is opaque to the serving path: it declares the ordered
//! feature names it was trained on and maps a matching feature vector to a
//! prediction. Per-county time-series models also report a native interval.

use crate::data::CountySeries;
use crate::error::Result;
use crate::features::FeatureVector;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

pub mod regressor;
pub mod seasonal;

pub use regressor::LinearRegressor;
pub use seasonal::SeasonalTrendModel;

/// How the models behind a registry are organised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    /// One time-series model per county
    #[serde(rename = "per_county_timeseries")]
    PerCounty,
    /// One regressor shared by every county
    #[serde(rename = "unified")]
    Unified,
}

impl ModelKind {
    /// Name used in responses and configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::PerCounty => "per_county_timeseries",
            ModelKind::Unified => "unified",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single model output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// Point estimate
    pub value: f64,
    /// Model-provided `(lower, upper)` interval, if the model has one
    pub interval: Option<(f64, f64)>,
}

impl Prediction {
    pub fn point(value: f64) -> Self {
        Self {
            value,
            interval: None,
        }
    }

    pub fn with_interval(value: f64, lower: f64, upper: f64) -> Self {
        Self {
            value,
            interval: Some((lower, upper)),
        }
    }
}

/// Trained model that can be served
pub trait ForecastableModel: Debug + Send + Sync {
    /// Which variant this model is
    fn kind(&self) -> ModelKind;

    /// Ordered feature names the model was trained on
    fn feature_names(&self) -> &[String];

    /// Predict from a vector whose names equal `feature_names`
    fn predict(&self, features: &FeatureVector) -> Result<Prediction>;

    /// Training history carried inside the artifact, if any
    fn history(&self) -> Option<&CountySeries> {
        None
    }

    /// Short human-readable name
    fn name(&self) -> &str;
}
