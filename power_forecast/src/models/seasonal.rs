//! Per-county seasonal trend model
//!
//! A linear trend in fractional years plus an additive offset per calendar
//! month. The residual spread observed during fitting gives a native
//! prediction interval that widens with distance from the training data.

use crate::calendar::YearMonth;
use crate::data::CountySeries;
use crate::error::{ForecastError, Result};
use crate::features::{Feature, FeatureBuilder, FeatureVector};
use crate::metrics::{evaluate, z_score, ErrorMetrics};
use crate::models::{ForecastableModel, ModelKind, Prediction};
use energy_math::LinearTrend;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Features a seasonal trend model is served with
pub const SEASONAL_FEATURES: [Feature; 2] = [Feature::Trend, Feature::Month];

/// Trained seasonal trend model for one county
#[derive(Debug, Clone)]
pub struct SeasonalTrendModel {
    name: String,
    county: String,
    trend_origin: YearMonth,
    trend: LinearTrend,
    seasonal: Vec<f64>,
    residual_std: f64,
    interval_z: f64,
    feature_names: Vec<String>,
    history: CountySeries,
    training_metrics: ErrorMetrics,
}

#[derive(Debug, Serialize, Deserialize)]
struct HistoryPoint {
    period: YearMonth,
    kwh_per_household: f64,
}

/// On-disk form of a seasonal trend model
#[derive(Debug, Serialize, Deserialize)]
struct SeasonalTrendArtifact {
    county: String,
    trend_origin: YearMonth,
    trend: LinearTrend,
    seasonal: Vec<f64>,
    residual_std: f64,
    interval_z: f64,
    feature_names: Vec<String>,
    history: Vec<HistoryPoint>,
    training_metrics: ErrorMetrics,
}

impl SeasonalTrendModel {
    /// Fit a model to one county's history
    pub fn fit(
        series: &CountySeries,
        trend_origin: YearMonth,
        confidence_level: f64,
    ) -> Result<Self> {
        if series.len() < 2 {
            return Err(ForecastError::DataError(format!(
                "Need at least 2 months of history to fit '{}'",
                series.county()
            )));
        }

        let rows = FeatureBuilder::new(trend_origin).history_rows(series)?;
        let xs: Vec<f64> = rows.iter().map(|r| r.trend).collect();
        let ys = series.values();
        let trend = LinearTrend::fit(&xs, &ys)?;

        // Mean de-trended value per calendar month, centred on zero
        let mut sums = [0.0; 12];
        let mut counts = [0usize; 12];
        for (row, &y) in rows.iter().zip(&ys) {
            let slot = row.period.month() as usize - 1;
            sums[slot] += y - trend.value_at(row.trend);
            counts[slot] += 1;
        }
        let observed: Vec<f64> = (0..12)
            .filter(|&m| counts[m] > 0)
            .map(|m| sums[m] / counts[m] as f64)
            .collect();
        let centre = energy_math::mean(&observed)?;
        let seasonal: Vec<f64> = (0..12)
            .map(|m| {
                if counts[m] > 0 {
                    sums[m] / counts[m] as f64 - centre
                } else {
                    0.0
                }
            })
            .collect();
        let trend = LinearTrend {
            slope: trend.slope,
            intercept: trend.intercept + centre,
        };

        let fitted: Vec<f64> = rows
            .iter()
            .map(|r| trend.value_at(r.trend) + seasonal[r.period.month() as usize - 1])
            .collect();
        let residuals: Vec<f64> = ys.iter().zip(&fitted).map(|(y, f)| y - f).collect();
        let residual_std = energy_math::sample_std_dev(&residuals)?;

        Ok(Self {
            name: format!("Seasonal Trend ({})", series.county()),
            county: series.county().to_string(),
            trend_origin,
            trend,
            seasonal,
            residual_std,
            interval_z: z_score(confidence_level)?,
            feature_names: SEASONAL_FEATURES.iter().map(|f| f.name().to_string()).collect(),
            history: series.clone(),
            training_metrics: evaluate(&ys, &fitted)?,
        })
    }

    pub fn county(&self) -> &str {
        &self.county
    }

    pub fn trend_origin(&self) -> YearMonth {
        self.trend_origin
    }

    /// Last month the model was trained on
    pub fn training_cutoff(&self) -> YearMonth {
        self.history.last_period()
    }

    pub fn training_metrics(&self) -> ErrorMetrics {
        self.training_metrics
    }

    pub fn residual_std(&self) -> f64 {
        self.residual_std
    }

    /// Serialize the model as a JSON artifact
    pub fn to_json(&self) -> Result<String> {
        let artifact = SeasonalTrendArtifact {
            county: self.county.clone(),
            trend_origin: self.trend_origin,
            trend: self.trend,
            seasonal: self.seasonal.clone(),
            residual_std: self.residual_std,
            interval_z: self.interval_z,
            feature_names: self.feature_names.clone(),
            history: self
                .history
                .records()
                .iter()
                .map(|r| HistoryPoint {
                    period: r.period(),
                    kwh_per_household: r.kwh_per_household(),
                })
                .collect(),
            training_metrics: self.training_metrics,
        };
        Ok(serde_json::to_string_pretty(&artifact)?)
    }

    /// Restore a model from its JSON artifact
    pub fn from_json(json: &str) -> Result<Self> {
        let artifact: SeasonalTrendArtifact = serde_json::from_str(json)?;

        let expected: Vec<String> = SEASONAL_FEATURES.iter().map(|f| f.name().to_string()).collect();
        if artifact.feature_names != expected {
            return Err(ForecastError::FeatureContractMismatch {
                expected,
                actual: artifact.feature_names,
            });
        }
        if artifact.seasonal.len() != 12 {
            return Err(ForecastError::ValidationError(format!(
                "Seasonal trend artifact needs 12 monthly offsets, found {}",
                artifact.seasonal.len()
            )));
        }
        if !(artifact.residual_std.is_finite() && artifact.residual_std >= 0.0) {
            return Err(ForecastError::ValidationError(
                "Residual standard deviation must be non-negative".to_string(),
            ));
        }
        if !(artifact.interval_z.is_finite() && artifact.interval_z > 0.0) {
            return Err(ForecastError::ValidationError(
                "Interval z-score must be positive".to_string(),
            ));
        }

        let values: Vec<(YearMonth, f64)> = artifact
            .history
            .iter()
            .map(|p| (p.period, p.kwh_per_household))
            .collect();
        let history = CountySeries::from_values(&artifact.county, &values)?;

        Ok(Self {
            name: format!("Seasonal Trend ({})", history.county()),
            county: history.county().to_string(),
            trend_origin: artifact.trend_origin,
            trend: artifact.trend,
            seasonal: artifact.seasonal,
            residual_std: artifact.residual_std,
            interval_z: artifact.interval_z,
            feature_names: artifact.feature_names,
            history,
            training_metrics: artifact.training_metrics,
        })
    }

    /// Write the artifact to `path`
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    fn feature(features: &FeatureVector, feature: Feature) -> Result<f64> {
        features.get(feature.name()).ok_or_else(|| {
            ForecastError::ValidationError(format!("Missing feature '{}'", feature))
        })
    }
}

impl ForecastableModel for SeasonalTrendModel {
    fn kind(&self) -> ModelKind {
        ModelKind::PerCounty
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, features: &FeatureVector) -> Result<Prediction> {
        features.ensure_matches(&self.feature_names)?;

        let t = Self::feature(features, Feature::Trend)?;
        let month = Self::feature(features, Feature::Month)?;
        if month.fract() != 0.0 || !(1.0..=12.0).contains(&month) {
            return Err(ForecastError::ValidationError(format!(
                "Month feature must be a whole number from 1 to 12, got {}",
                month
            )));
        }

        let value = self.trend.value_at(t) + self.seasonal[month as usize - 1];

        let last_trend = self.training_cutoff().years_since(self.trend_origin);
        let years_ahead = (t - last_trend).max(0.0);
        let half_width = self.interval_z * self.residual_std * (1.0 + years_ahead).sqrt();

        Ok(Prediction::with_interval(
            value,
            value - half_width,
            value + half_width,
        ))
    }

    fn history(&self) -> Option<&CountySeries> {
        Some(&self.history)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
