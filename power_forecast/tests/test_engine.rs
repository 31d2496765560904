use approx::assert_relative_eq;
use power_forecast::calendar::YearMonth;
use power_forecast::data::{ConsumptionHistory, ConsumptionRecord};
use power_forecast::engine::{EngineConfig, ForecastEngine, ForecastQuality, IntervalMethod};
use power_forecast::metadata::{MetadataDefaults, ModelMetadata, ResidualBand};
use power_forecast::metrics::ErrorMetrics;
use power_forecast::models::{LinearRegressor, ModelKind, SeasonalTrendModel};
use power_forecast::registry::{publish_per_county, publish_unified, FileModelStore, ModelRegistry};
use power_forecast::utils::{synthetic_series, SyntheticProfile};
use power_forecast::{ForecastError, ForecastResult};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

fn ym(year: i32, month: u32) -> YearMonth {
    YearMonth::new(year, month).unwrap()
}

fn defaults() -> MetadataDefaults {
    MetadataDefaults {
        training_cutoff: ym(2024, 11),
        trend_origin: ym(2022, 1),
    }
}

/// Eleven months of 2024 ending at `last`, rising by 5 per month
fn history_records(county: &str, last: f64) -> Vec<ConsumptionRecord> {
    (1..=11)
        .map(|m| ConsumptionRecord::new(county, 2024, m, last - 5.0 * (11 - m) as f64).unwrap())
        .collect()
}

fn history(santa_clara_last: f64, alameda_last: f64) -> Arc<ConsumptionHistory> {
    let mut records = history_records("Santa Clara", santa_clara_last);
    records.extend(history_records("Alameda", alameda_last));
    Arc::new(ConsumptionHistory::from_records(records).unwrap())
}

/// Unified regressor over the given features with the given validation record
fn unified_dir(
    features: &[&str],
    intercept: f64,
    coefficients: Vec<f64>,
    validation: Option<ErrorMetrics>,
    band: Option<ResidualBand>,
) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let store = FileModelStore::new(dir.path());
    let features: Vec<String> = features.iter().map(|f| f.to_string()).collect();
    let model = LinearRegressor::new(features.clone(), intercept, coefficients).unwrap();
    let encoding =
        BTreeMap::from([("Alameda".to_string(), 1), ("Santa Clara".to_string(), 0)]);
    let metadata = ModelMetadata::unified(
        encoding,
        features,
        ym(2024, 11),
        ym(2022, 1),
        None,
        validation,
        band,
    )
    .unwrap();
    publish_unified(&store, &model, &metadata).unwrap();
    dir
}

/// A model that adds 10 kWh to last month's value
fn increment_dir() -> TempDir {
    unified_dir(&["lag_1"], 10.0, vec![1.0], None, None)
}

fn unified_engine(dir: &TempDir) -> ForecastEngine {
    let registry = ModelRegistry::new(
        Arc::new(FileModelStore::new(dir.path())),
        ModelKind::Unified,
        defaults(),
    );
    ForecastEngine::new(Arc::new(registry), EngineConfig::default())
}

fn assert_bounds_hold(result: &ForecastResult) {
    for point in &result.forecast {
        assert!(point.lower_bound >= 0.0, "lower bound below zero: {:?}", point);
        assert!(point.lower_bound <= point.predicted_kwh, "lower above predicted: {:?}", point);
        assert!(point.predicted_kwh <= point.upper_bound, "upper below predicted: {:?}", point);
    }
}

fn assert_gapless_after(result: &ForecastResult, cutoff: YearMonth) {
    let mut expected = cutoff;
    for point in &result.forecast {
        expected = expected.succ().unwrap();
        assert_eq!(point.date, expected.first_day());
    }
}

#[test]
fn test_lag_1_is_previous_prediction() {
    let dir = increment_dir();
    let engine = unified_engine(&dir).with_history(history(700.0, 300.0));

    let result = engine.forecast("Santa Clara", 6).unwrap();
    let predicted: Vec<f64> = result.forecast.iter().map(|p| p.predicted_kwh).collect();
    assert_eq!(predicted, vec![710.0, 720.0, 730.0, 740.0, 750.0, 760.0]);
    assert_eq!(result.quality, ForecastQuality::Recursive);
    assert_eq!(result.model_kind, ModelKind::Unified);
}

#[test]
fn test_santa_clara_horizon_after_cutoff() {
    let dir = increment_dir();
    let engine = unified_engine(&dir).with_history(history(700.0, 300.0));

    let result = engine.forecast("Santa Clara", 6).unwrap();
    let dates: Vec<String> = result.forecast.iter().map(|p| p.date.to_string()).collect();
    assert_eq!(
        dates,
        vec!["2024-12-01", "2025-01-01", "2025-02-01", "2025-03-01", "2025-04-01", "2025-05-01"]
    );
    assert_eq!(result.periods, 6);
    assert_bounds_hold(&result);
}

#[test]
fn test_counties_do_not_leak() {
    let dir = increment_dir();
    let low_neighbour = unified_engine(&dir).with_history(history(700.0, 300.0));
    let high_neighbour = unified_engine(&dir).with_history(history(700.0, 2_000.0));

    let a = low_neighbour.forecast("Santa Clara", 4).unwrap();
    let b = high_neighbour.forecast("Santa Clara", 4).unwrap();
    assert_eq!(a, b);

    let alameda = low_neighbour.forecast("Alameda", 1).unwrap();
    assert_eq!(alameda.forecast[0].predicted_kwh, 310.0);
}

#[test]
fn test_lag_12_uses_last_year_then_predictions() {
    let dir = unified_dir(&["lag_12"], 0.0, vec![1.0], None, None);
    let mut records = Vec::new();
    for i in 0..23 {
        let period = ym(2023, 1).checked_add_months(i).unwrap();
        records.push(
            ConsumptionRecord::new("Santa Clara", period.year(), period.month(), 400.0 + i as f64)
                .unwrap(),
        );
    }
    let history = Arc::new(ConsumptionHistory::from_records(records).unwrap());
    let engine = unified_engine(&dir).with_history(history);

    let result = engine.forecast("Santa Clara", 13).unwrap();
    // 2024-12 repeats 2023-12, and 2025-12 repeats the 2024-12 prediction
    assert_eq!(result.forecast[0].predicted_kwh, 411.0);
    assert_eq!(result.forecast[12].predicted_kwh, 411.0);
    assert_eq!(result.forecast[1].predicted_kwh, 412.0);
}

#[test]
fn test_short_history_lag_12_carries_last_value() {
    let dir = unified_dir(&["lag_12"], 0.0, vec![1.0], None, None);
    let records: Vec<ConsumptionRecord> = (6..=11)
        .map(|m| ConsumptionRecord::new("Alameda", 2024, m, 100.0 * (m - 5) as f64).unwrap())
        .collect();
    let history = Arc::new(ConsumptionHistory::from_records(records).unwrap());
    let engine = unified_engine(&dir).with_history(history);

    // 2023-12..2024-02 predate the series, so the 2024-11 value stands in
    let result = engine.forecast("Alameda", 3).unwrap();
    let predicted: Vec<f64> = result.forecast.iter().map(|p| p.predicted_kwh).collect();
    assert_eq!(predicted, vec![600.0, 600.0, 600.0]);
    assert_eq!(result.quality, ForecastQuality::Recursive);
}

#[test]
fn test_no_history_is_constant_fill() {
    let dir = increment_dir();
    let engine = unified_engine(&dir);

    let result = engine.forecast("Alameda", 3).unwrap();
    assert_eq!(result.quality, ForecastQuality::ConstantFill);
    let predicted: Vec<f64> = result.forecast.iter().map(|p| p.predicted_kwh).collect();
    assert_eq!(predicted, vec![810.0, 820.0, 830.0]);
}

#[test]
fn test_batch_dispersion_is_flagged() {
    let dir = increment_dir();
    let engine = unified_engine(&dir).with_history(history(700.0, 300.0));

    let result = engine.forecast("Santa Clara", 6).unwrap();
    assert_eq!(result.interval_method, IntervalMethod::BatchDispersion);

    // 1.96 * 0.1 * population std of 710..=760 in steps of 10
    let half_width = 1.96 * 0.1 * (35.0_f64 / 12.0).sqrt() * 10.0;
    let first = &result.forecast[0];
    assert_relative_eq!(first.upper_bound - first.predicted_kwh, half_width, epsilon = 1e-9);
    assert_relative_eq!(first.predicted_kwh - first.lower_bound, half_width, epsilon = 1e-9);
}

#[test]
fn test_residual_quantiles_preferred() {
    let band = ResidualBand {
        lower: -30.0,
        upper: 45.0,
    };
    let metrics = ErrorMetrics {
        rmse: 20.0,
        mae: 15.0,
        mape: 2.0,
        r2: 0.9,
    };
    let dir = unified_dir(&["lag_1"], 10.0, vec![1.0], Some(metrics), Some(band));
    let engine = unified_engine(&dir).with_history(history(700.0, 300.0));

    let result = engine.forecast("Santa Clara", 2).unwrap();
    assert_eq!(result.interval_method, IntervalMethod::ResidualQuantile);
    assert_eq!(result.forecast[0].lower_bound, 680.0);
    assert_eq!(result.forecast[0].upper_bound, 755.0);
}

#[test]
fn test_validation_rmse_interval() {
    let metrics = ErrorMetrics {
        rmse: 20.0,
        mae: 15.0,
        mape: 2.0,
        r2: 0.9,
    };
    let dir = unified_dir(&["lag_1"], 10.0, vec![1.0], Some(metrics), None);
    let engine = unified_engine(&dir).with_history(history(700.0, 300.0));

    let result = engine.forecast("Santa Clara", 2).unwrap();
    assert_eq!(result.interval_method, IntervalMethod::ValidationRmse);
    let point = &result.forecast[0];
    assert_relative_eq!(point.upper_bound - point.predicted_kwh, 1.959964 * 20.0, epsilon = 1e-3);
}

#[test]
fn test_negative_predictions_are_floored() {
    let dir = unified_dir(&["lag_1"], -500.0, vec![1.0], None, None);
    let engine = unified_engine(&dir).with_history(history(700.0, 300.0));

    let result = engine.forecast("Alameda", 3).unwrap();
    assert_bounds_hold(&result);
    assert!(result.forecast.iter().all(|p| p.predicted_kwh == 0.0));
}

#[rstest]
#[case(0)]
#[case(37)]
#[case(-1)]
fn test_out_of_range_periods_rejected(#[case] periods: i64) {
    let dir = increment_dir();
    let engine = unified_engine(&dir);
    assert!(matches!(
        engine.forecast("Santa Clara", periods),
        Err(ForecastError::InvalidPeriods { .. })
    ));
}

#[test]
fn test_unknown_county() {
    let dir = increment_dir();
    let engine = unified_engine(&dir);
    match engine.forecast("Atlantis", 6) {
        Err(ForecastError::CountyNotFound { available, .. }) => {
            assert_eq!(available, vec!["Alameda", "Santa Clara"]);
        }
        other => panic!("Expected CountyNotFound, got {:?}", other),
    }
}

#[rstest]
#[case(1)]
#[case(12)]
#[case(36)]
fn test_per_county_forecast(#[case] periods: i64) {
    let dir = tempfile::tempdir().unwrap();
    let store = FileModelStore::new(dir.path());
    let series =
        synthetic_series("Santa Clara", ym(2022, 1), 35, SyntheticProfile::default(), 11).unwrap();
    let model = SeasonalTrendModel::fit(&series, ym(2022, 1), 0.95).unwrap();
    publish_per_county(&store, &model).unwrap();

    let registry = ModelRegistry::new(Arc::new(store), ModelKind::PerCounty, defaults());
    let engine = ForecastEngine::new(Arc::new(registry), EngineConfig::default());

    let result = engine.forecast("Santa Clara", periods).unwrap();
    assert_eq!(result.forecast.len(), periods as usize);
    assert_eq!(result.model_kind, ModelKind::PerCounty);
    assert_eq!(result.interval_method, IntervalMethod::Native);
    assert_eq!(result.quality, ForecastQuality::Recursive);
    assert_gapless_after(&result, ym(2024, 11));
    assert_bounds_hold(&result);
}

#[test]
fn test_forecast_is_deterministic_with_and_without_cache() {
    let dir = increment_dir();
    let uncached = unified_engine(&dir).with_history(history(640.0, 300.0));
    let registry = ModelRegistry::new(
        Arc::new(FileModelStore::new(dir.path())),
        ModelKind::Unified,
        defaults(),
    )
    .with_cache();
    let cached = ForecastEngine::new(Arc::new(registry), EngineConfig::default())
        .with_history(history(640.0, 300.0));

    let first = uncached.forecast("Santa Clara", 12).unwrap();
    assert_eq!(first, uncached.forecast("Santa Clara", 12).unwrap());
    assert_eq!(first, cached.forecast("Santa Clara", 12).unwrap());
    assert_eq!(first, cached.forecast("Santa Clara", 12).unwrap());
}
