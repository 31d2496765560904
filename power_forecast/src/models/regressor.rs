//! Unified cross-county linear regressor

use crate::error::{ForecastError, Result};
use crate::features::{parse_contract, FeatureVector};
use crate::models::{ForecastableModel, ModelKind, Prediction};
use energy_math::least_squares;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Linear model over a named, ordered feature set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressor {
    #[serde(skip, default = "default_name")]
    name: String,
    feature_names: Vec<String>,
    intercept: f64,
    coefficients: Vec<f64>,
}

fn default_name() -> String {
    "Unified Linear Regressor".to_string()
}

impl LinearRegressor {
    /// Create a regressor from known coefficients
    pub fn new(feature_names: Vec<String>, intercept: f64, coefficients: Vec<f64>) -> Result<Self> {
        if feature_names.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "A regressor needs at least one feature".to_string(),
            ));
        }
        if feature_names.len() != coefficients.len() {
            return Err(ForecastError::InvalidParameter(format!(
                "{} features but {} coefficients",
                feature_names.len(),
                coefficients.len()
            )));
        }
        if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ForecastError::InvalidParameter(
                "Regressor coefficients must be finite".to_string(),
            ));
        }
        parse_contract(&feature_names)?;

        Ok(Self {
            name: default_name(),
            feature_names,
            intercept,
            coefficients,
        })
    }

    /// Fit by ridge-regularized least squares
    ///
    /// Every vector must follow `feature_names` exactly.
    pub fn fit(
        feature_names: Vec<String>,
        vectors: &[FeatureVector],
        targets: &[f64],
        ridge: f64,
    ) -> Result<Self> {
        if vectors.len() != targets.len() {
            return Err(ForecastError::ValidationError(format!(
                "{} feature vectors but {} targets",
                vectors.len(),
                targets.len()
            )));
        }
        if vectors.len() <= feature_names.len() {
            return Err(ForecastError::DataError(format!(
                "Need more than {} training rows, got {}",
                feature_names.len(),
                vectors.len()
            )));
        }

        let mut design = Vec::with_capacity(vectors.len());
        for vector in vectors {
            vector.ensure_matches(&feature_names)?;
            let mut row = Vec::with_capacity(feature_names.len() + 1);
            row.push(1.0);
            row.extend_from_slice(vector.values());
            design.push(row);
        }

        let beta = least_squares(&design, targets, ridge)?;
        Self::new(feature_names, beta[0], beta[1..].to_vec())
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Restore from JSON, re-validating the coefficients
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: LinearRegressor = serde_json::from_str(json)?;
        Self::new(raw.feature_names, raw.intercept, raw.coefficients)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

impl ForecastableModel for LinearRegressor {
    fn kind(&self) -> ModelKind {
        ModelKind::Unified
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, features: &FeatureVector) -> Result<Prediction> {
        features.ensure_matches(&self.feature_names)?;

        let value = self.intercept
            + features
                .values()
                .iter()
                .zip(&self.coefficients)
                .map(|(x, w)| x * w)
                .sum::<f64>();
        Ok(Prediction::point(value))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
