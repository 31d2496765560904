//! Reference training routines
//!
//! Produce artifacts the registry can serve: one seasonal trend model per
//! county, or one regressor over every county with a held-out validation
//! window that sizes its prediction interval.

use crate::calendar::YearMonth;
use crate::data::ConsumptionHistory;
use crate::error::{ForecastError, Result};
use crate::features::{parse_contract, Feature, FeatureBuilder, FeatureVector};
use crate::metadata::{ModelMetadata, ResidualBand};
use crate::metrics::{evaluate, residual_band};
use crate::models::{ForecastableModel, LinearRegressor, SeasonalTrendModel};
use crate::registry::{publish_per_county, publish_unified, ModelStore};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Features of the reference unified regressor
pub const UNIFIED_FEATURES: [Feature; 7] = [
    Feature::CountyEncoded,
    Feature::MonthSin,
    Feature::MonthCos,
    Feature::Trend,
    Feature::Lag1,
    Feature::Lag12,
    Feature::RollingMean3,
];

/// Fit one seasonal trend model per county
///
/// Counties with fewer than two months of history are skipped with a warning.
pub fn fit_per_county(
    history: &ConsumptionHistory,
    trend_origin: YearMonth,
    confidence_level: f64,
) -> Result<Vec<SeasonalTrendModel>> {
    let mut models = Vec::with_capacity(history.len());
    for series in history.iter() {
        if series.len() < 2 {
            warn!(county = series.county(), months = series.len(), "Too little history, skipping");
            continue;
        }
        let model = SeasonalTrendModel::fit(series, trend_origin, confidence_level)?;
        info!(
            county = series.county(),
            rmse = model.training_metrics().rmse,
            "Fitted seasonal trend model"
        );
        models.push(model);
    }

    if models.is_empty() {
        return Err(ForecastError::DataError(
            "No county has enough history to fit a model".to_string(),
        ));
    }
    Ok(models)
}

/// Settings of the unified fit
#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedFitOptions {
    pub features: Vec<String>,
    pub trend_origin: YearMonth,
    /// Upper bound on the last month used for fitting and validation;
    /// `None` fits through the latest month in the history
    pub training_cutoff: Option<YearMonth>,
    /// Trailing months held out for validation
    pub validation_months: usize,
    pub confidence_level: f64,
    pub ridge: f64,
}

impl Default for UnifiedFitOptions {
    fn default() -> Self {
        Self {
            features: UNIFIED_FEATURES.iter().map(|f| f.name().to_string()).collect(),
            trend_origin: crate::calendar::DEFAULT_TREND_ORIGIN,
            training_cutoff: None,
            validation_months: 6,
            confidence_level: 0.95,
            ridge: 1e-3,
        }
    }
}

/// A fitted unified regressor and its metadata
#[derive(Debug, Clone)]
pub struct UnifiedFit {
    pub model: LinearRegressor,
    pub metadata: ModelMetadata,
}

#[derive(Default)]
struct Rows {
    vectors: Vec<FeatureVector>,
    targets: Vec<f64>,
}

/// Fit one regressor across every county in `history`
pub fn fit_unified(history: &ConsumptionHistory, options: &UnifiedFitOptions) -> Result<UnifiedFit> {
    parse_contract(&options.features)?;
    let latest = history
        .iter()
        .map(|series| series.last_period())
        .max()
        .ok_or_else(|| ForecastError::DataError("Cannot fit on an empty history".to_string()))?;
    let training_cutoff = match options.training_cutoff {
        Some(cap) => latest.min(cap),
        None => latest,
    };
    let validation_start = training_cutoff
        .checked_add_months(1 - options.validation_months as i64)
        .ok_or_else(|| {
            ForecastError::InvalidParameter(format!(
                "Validation window of {} months is out of range",
                options.validation_months
            ))
        })?;

    let county_codes: BTreeMap<String, i64> = history
        .counties()
        .into_iter()
        .enumerate()
        .map(|(code, county)| (county, code as i64))
        .collect();

    let mut train = Rows::default();
    let mut validation = Rows::default();
    for series in history.iter() {
        if series.first_period() > training_cutoff {
            continue;
        }
        let series = series.truncate_after(training_cutoff)?;
        let code = county_codes.get(series.county()).copied().ok_or_else(|| {
            ForecastError::DataError(format!("County '{}' has no code", series.county()))
        })?;
        let builder = FeatureBuilder::new(options.trend_origin).with_county_code(code);

        for (period, vector) in builder.history_vectors(&series, &options.features)? {
            let target = series.value_at(period).ok_or_else(|| {
                ForecastError::DataError(format!("No value for {} at {}", series.county(), period))
            })?;
            let rows = if options.validation_months > 0 && period >= validation_start {
                &mut validation
            } else {
                &mut train
            };
            rows.vectors.push(vector);
            rows.targets.push(target);
        }
    }

    info!(
        train_rows = train.targets.len(),
        validation_rows = validation.targets.len(),
        counties = county_codes.len(),
        cutoff = %training_cutoff,
        "Fitting unified regressor"
    );
    let model = LinearRegressor::fit(
        options.features.clone(),
        &train.vectors,
        &train.targets,
        options.ridge,
    )?;

    let fitted = predict_all(&model, &train.vectors)?;
    let training_metrics = evaluate(&train.targets, &fitted)?;

    let (validation_metrics, band) = if validation.targets.is_empty() {
        warn!("No validation rows; intervals will fall back to batch dispersion");
        (None, None)
    } else {
        let predicted = predict_all(&model, &validation.vectors)?;
        let metrics = evaluate(&validation.targets, &predicted)?;
        let (lower, upper) =
            residual_band(&validation.targets, &predicted, options.confidence_level)?;
        info!(rmse = metrics.rmse, lower, upper, "Validated unified regressor");
        (Some(metrics), Some(ResidualBand { lower, upper }))
    };

    let metadata = ModelMetadata::unified(
        county_codes,
        options.features.clone(),
        training_cutoff,
        options.trend_origin,
        Some(training_metrics),
        validation_metrics,
        band,
    )?;

    Ok(UnifiedFit { model, metadata })
}

fn predict_all(model: &LinearRegressor, vectors: &[FeatureVector]) -> Result<Vec<f64>> {
    vectors
        .iter()
        .map(|v| model.predict(v).map(|p| p.value))
        .collect()
}

/// Fit per-county models and write them to `store`
pub fn train_per_county_store(
    store: &dyn ModelStore,
    history: &ConsumptionHistory,
    trend_origin: YearMonth,
    confidence_level: f64,
) -> Result<usize> {
    let models = fit_per_county(history, trend_origin, confidence_level)?;
    for model in &models {
        publish_per_county(store, model)?;
    }
    Ok(models.len())
}

/// Fit the unified regressor and write it with its metadata to `store`
pub fn train_unified_store(
    store: &dyn ModelStore,
    history: &ConsumptionHistory,
    options: &UnifiedFitOptions,
) -> Result<UnifiedFit> {
    let fit = fit_unified(history, options)?;
    publish_unified(store, &fit.model, &fit.metadata)?;
    Ok(fit)
}
