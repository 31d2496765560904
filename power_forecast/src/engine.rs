//! Forecast engine
//!
//! Produces a multi-month forecast for one county. Each horizon month is
//! predicted from a feature vector whose lags come from true history where it
//! exists and from the engine's own earlier predictions where it does not.

use crate::calendar::{month_horizon, YearMonth};
use crate::county::canonical_county;
use crate::data::{CountySeries, HistoryProvider};
use crate::error::{ForecastError, Result};
use crate::features::{FeatureBuilder, RecentValueEstimator};
use crate::metadata::ModelMetadata;
use crate::metrics::z_score;
use crate::models::{ModelKind, Prediction};
use crate::registry::{ModelRegistry, ResolvedModel};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Critical value of the batch dispersion heuristic
const DISPERSION_Z: f64 = 1.96;
/// Share of the batch standard deviation used as the standard error
const DISPERSION_SHARE: f64 = 0.1;

/// Where the lag features of a forecast came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastQuality {
    /// True history plus the forecast's own earlier predictions
    Recursive,
    /// No history was available; lags hold a configured constant
    ConstantFill,
}

/// How the bounds of a forecast were derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalMethod {
    /// Interval reported by the model itself
    Native,
    /// Quantiles of validation residuals stored in the metadata
    ResidualQuantile,
    /// Validation RMSE scaled by the normal critical value
    ValidationRmse,
    /// Spread of the predicted batch; a rough heuristic
    BatchDispersion,
}

/// One forecast month
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// First day of the forecast month
    pub date: NaiveDate,
    pub predicted_kwh: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

impl ForecastPoint {
    /// Assemble a point satisfying `0 <= lower <= predicted <= upper`
    pub fn bounded(period: YearMonth, predicted: f64, lower: f64, upper: f64) -> Self {
        let predicted_kwh = predicted.max(0.0);
        Self {
            date: period.first_day(),
            predicted_kwh,
            lower_bound: lower.max(0.0).min(predicted_kwh),
            upper_bound: upper.max(predicted_kwh),
        }
    }
}

/// A complete forecast for one county
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub county: String,
    pub periods: usize,
    pub model_kind: ModelKind,
    pub quality: ForecastQuality,
    pub interval_method: IntervalMethod,
    pub forecast: Vec<ForecastPoint>,
}

/// Engine settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Longest horizon accepted, in months
    pub max_periods: usize,
    /// Coverage of RMSE-based intervals
    pub confidence_level: f64,
    /// kWh per household used when a county has no history at all
    pub fallback_kwh: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_periods: 36,
            confidence_level: 0.95,
            fallback_kwh: 800.0,
        }
    }
}

/// Known values for the recursion: history first, then fed-back predictions
struct RecursiveEstimator<'a> {
    series: Option<&'a CountySeries>,
    predictions: BTreeMap<YearMonth, f64>,
    fallback: f64,
}

impl<'a> RecursiveEstimator<'a> {
    fn new(series: Option<&'a CountySeries>, fallback: f64) -> Self {
        Self {
            series,
            predictions: BTreeMap::new(),
            fallback,
        }
    }

    fn record(&mut self, period: YearMonth, value: f64) {
        self.predictions.insert(period, value);
    }
}

impl RecentValueEstimator for RecursiveEstimator<'_> {
    fn known(&self, period: YearMonth) -> Option<f64> {
        self.series
            .and_then(|s| s.value_at(period))
            .or_else(|| self.predictions.get(&period).copied())
    }

    fn estimate(&self, period: YearMonth) -> Option<f64> {
        match self.series {
            // Last true value carried forward, also for months before the series starts
            Some(series) => series
                .latest_at_or_before(period)
                .or_else(|| series.latest_at_or_before(series.last_period()))
                .map(|(_, v)| v),
            None => Some(self.fallback),
        }
    }
}

/// Turns registry models into county forecasts
#[derive(Debug)]
pub struct ForecastEngine {
    registry: Arc<ModelRegistry>,
    history: Option<Arc<dyn HistoryProvider>>,
    config: EngineConfig,
}

impl ForecastEngine {
    pub fn new(registry: Arc<ModelRegistry>, config: EngineConfig) -> Self {
        Self {
            registry,
            history: None,
            config,
        }
    }

    /// Recent actuals used as lags by models that carry no history of their own
    pub fn with_history(mut self, history: Arc<dyn HistoryProvider>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Counties this engine can forecast
    pub fn list_counties(&self) -> Result<Vec<String>> {
        self.registry.list_counties()
    }

    /// Forecast `periods` months after the model's training cutoff
    pub fn forecast(&self, county: &str, periods: i64) -> Result<ForecastResult> {
        let periods = self.check_periods(periods)?;
        let ResolvedModel { model, metadata } = self.registry.resolve(county)?;
        let canonical = canonical_county(county);

        let cutoff = metadata.training_cutoff();
        let horizon = month_horizon(cutoff, periods)?;

        let series = self.recent_series(&canonical, model.history(), cutoff)?;
        let quality = if series.is_some() {
            ForecastQuality::Recursive
        } else {
            warn!(
                county = %canonical,
                fallback_kwh = self.config.fallback_kwh,
                "No history available; lags use the constant fallback"
            );
            ForecastQuality::ConstantFill
        };

        let mut builder = FeatureBuilder::new(metadata.trend_origin());
        if let Some(code) = metadata.county_code(&canonical) {
            builder = builder.with_county_code(code);
        }

        let contract = metadata.feature_names();
        let mut estimator = RecursiveEstimator::new(series.as_ref(), self.config.fallback_kwh);
        let mut predictions = Vec::with_capacity(periods);

        for &period in &horizon {
            let estimate: &dyn RecentValueEstimator = &estimator;
            let row = builder.future_row(&canonical, series.as_ref(), period, Some(estimate))?;
            let features = builder.vector(&row, contract)?;
            features.ensure_matches(contract)?;

            let prediction = model.predict(&features)?;
            estimator.record(period, prediction.value.max(0.0));
            predictions.push(prediction);
        }

        let (interval_method, forecast) = self.bound(&metadata, &horizon, &predictions)?;

        info!(
            county = %canonical,
            model_kind = %metadata.model_kind(),
            periods,
            from = %horizon[0],
            ?quality,
            ?interval_method,
            "Forecast generated"
        );

        Ok(ForecastResult {
            county: canonical,
            periods,
            model_kind: metadata.model_kind(),
            quality,
            interval_method,
            forecast,
        })
    }

    fn check_periods(&self, periods: i64) -> Result<usize> {
        match usize::try_from(periods) {
            Ok(p) if (1..=self.config.max_periods).contains(&p) => Ok(p),
            _ => Err(ForecastError::InvalidPeriods {
                requested: periods,
                min: 1,
                max: self.config.max_periods,
            }),
        }
    }

    /// History no later than the cutoff: the model's own, else the provider's
    fn recent_series(
        &self,
        county: &str,
        own: Option<&CountySeries>,
        cutoff: YearMonth,
    ) -> Result<Option<CountySeries>> {
        let series = own.or_else(|| self.history.as_ref().and_then(|h| h.series(county)));
        match series {
            Some(series) if series.first_period() <= cutoff => {
                debug!(county, months = series.len(), "Using recent actuals");
                Ok(Some(series.truncate_after(cutoff)?))
            }
            _ => Ok(None),
        }
    }

    fn bound(
        &self,
        metadata: &ModelMetadata,
        horizon: &[YearMonth],
        predictions: &[Prediction],
    ) -> Result<(IntervalMethod, Vec<ForecastPoint>)> {
        let points = |offsets: &dyn Fn(&Prediction) -> (f64, f64)| -> Vec<ForecastPoint> {
            horizon
                .iter()
                .zip(predictions)
                .map(|(&period, p)| {
                    let (lower, upper) = offsets(p);
                    ForecastPoint::bounded(period, p.value, lower, upper)
                })
                .collect()
        };

        let native: Option<Vec<(f64, f64)>> = predictions.iter().map(|p| p.interval).collect();
        if let Some(intervals) = native {
            let forecast = horizon
                .iter()
                .zip(predictions.iter().zip(intervals))
                .map(|(&period, (p, (lower, upper)))| {
                    ForecastPoint::bounded(period, p.value, lower, upper)
                })
                .collect();
            return Ok((IntervalMethod::Native, forecast));
        }

        if let Some(band) = metadata.residual_band() {
            debug!(lower = band.lower, upper = band.upper, "Residual quantile interval");
            return Ok((
                IntervalMethod::ResidualQuantile,
                points(&|p| (p.value + band.lower, p.value + band.upper)),
            ));
        }

        if let Some(metrics) = metadata.validation_metrics() {
            let half_width = z_score(self.config.confidence_level)? * metrics.rmse;
            debug!(half_width, "Validation RMSE interval");
            return Ok((
                IntervalMethod::ValidationRmse,
                points(&|p| (p.value - half_width, p.value + half_width)),
            ));
        }

        let values: Vec<f64> = predictions.iter().map(|p| p.value).collect();
        let half_width = DISPERSION_Z * DISPERSION_SHARE * energy_math::std_dev(&values)?;
        warn!(
            half_width,
            "No validation residuals in metadata; using batch dispersion interval"
        );
        Ok((
            IntervalMethod::BatchDispersion,
            points(&|p| (p.value - half_width, p.value + half_width)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ym(year: i32, month: u32) -> YearMonth {
        YearMonth::new(year, month).unwrap()
    }

    #[test]
    fn test_bounded_point_orders_values() {
        let point = ForecastPoint::bounded(ym(2025, 1), -5.0, -20.0, 10.0);
        assert_eq!(point.predicted_kwh, 0.0);
        assert_eq!(point.lower_bound, 0.0);
        assert_eq!(point.upper_bound, 10.0);

        let point = ForecastPoint::bounded(ym(2025, 1), 50.0, 60.0, 40.0);
        assert_eq!(point.lower_bound, 50.0);
        assert_eq!(point.upper_bound, 50.0);
        assert_eq!(point.date, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
    }

    #[test]
    fn test_estimator_prefers_history_then_predictions() {
        let series =
            CountySeries::from_values("Kings", &[(ym(2024, 9), 600.0), (ym(2024, 11), 640.0)])
                .unwrap();
        let mut estimator = RecursiveEstimator::new(Some(&series), 800.0);
        estimator.record(ym(2024, 12), 700.0);

        assert_eq!(estimator.known(ym(2024, 11)), Some(640.0));
        assert_eq!(estimator.known(ym(2024, 12)), Some(700.0));
        assert_eq!(estimator.known(ym(2024, 10)), None);
        assert_eq!(estimator.estimate(ym(2024, 10)), Some(600.0));
        // Before the series starts the last true value is carried
        assert_eq!(estimator.estimate(ym(2023, 10)), Some(640.0));
    }

    #[test]
    fn test_estimator_without_history_uses_fallback() {
        let estimator = RecursiveEstimator::new(None, 800.0);
        assert_eq!(estimator.known(ym(2024, 1)), None);
        assert_eq!(estimator.estimate(ym(2024, 1)), Some(800.0));
    }
}
