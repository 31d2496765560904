use approx::assert_relative_eq;
use power_forecast::calendar::YearMonth;
use power_forecast::data::CountySeries;
use power_forecast::features::{Feature, FeatureBuilder, RecentValueEstimator};
use power_forecast::ForecastError;
use pretty_assertions::assert_eq;
use rstest::{fixture, rstest};
use std::collections::BTreeMap;

fn ym(year: i32, month: u32) -> YearMonth {
    YearMonth::new(year, month).unwrap()
}

fn names(features: &[Feature]) -> Vec<String> {
    features.iter().map(|f| f.name().to_string()).collect()
}

/// Two years of history ending 2023-12, value = 100 + month index
#[fixture]
fn series() -> CountySeries {
    let values: Vec<(YearMonth, f64)> = (0..24)
        .map(|i| (ym(2022, 1).checked_add_months(i).unwrap(), 100.0 + i as f64))
        .collect();
    CountySeries::from_values("Santa Clara", &values).unwrap()
}

/// Known predictions keyed by month, with a fixed stand-in
struct FixedEstimator {
    known: BTreeMap<YearMonth, f64>,
    stand_in: f64,
}

impl RecentValueEstimator for FixedEstimator {
    fn known(&self, period: YearMonth) -> Option<f64> {
        self.known.get(&period).copied()
    }

    fn estimate(&self, _period: YearMonth) -> Option<f64> {
        Some(self.stand_in)
    }
}

#[rstest]
fn test_history_rows_use_calendar_lags(series: CountySeries) {
    let rows = FeatureBuilder::new(ym(2022, 1)).history_rows(&series).unwrap();
    assert_eq!(rows.len(), 24);

    assert_eq!(rows[0].lag_1, None);
    assert_eq!(rows[0].lag_12, None);
    assert_eq!(rows[1].lag_1, Some(100.0));
    assert_eq!(rows[12].lag_12, Some(100.0));
    assert_relative_eq!(rows[2].rolling_mean_3.unwrap(), 101.0);

    // Trend never decreases within a series
    assert!(rows.windows(2).all(|w| w[0].trend <= w[1].trend));
    assert_eq!(rows[0].trend, 0.0);
}

#[rstest]
fn test_cyclical_features_on_unit_circle(series: CountySeries) {
    for row in FeatureBuilder::new(ym(2022, 1)).history_rows(&series).unwrap() {
        assert_relative_eq!(row.year_cycle.norm_squared(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(row.month_cycle.norm_squared(), 1.0, epsilon = 1e-9);
    }
}

#[rstest]
fn test_history_vectors_follow_contract(series: CountySeries) {
    let contract = names(&[Feature::Lag12, Feature::Month, Feature::CountyEncoded]);
    let builder = FeatureBuilder::new(ym(2022, 1)).with_county_code(4);
    let vectors = builder.history_vectors(&series, &contract).unwrap();

    // Rows without a 12-month lag are dropped
    assert_eq!(vectors.len(), 12);
    let (period, first) = &vectors[0];
    assert_eq!(*period, ym(2023, 1));
    assert_eq!(first.names(), contract.as_slice());
    assert_eq!(first.values(), &[100.0, 1.0, 4.0]);
}

#[rstest]
fn test_history_vectors_are_deterministic(series: CountySeries) {
    let contract = Feature::all_names();
    let builder = FeatureBuilder::new(ym(2022, 1)).with_county_code(0);
    assert_eq!(
        builder.history_vectors(&series, &contract).unwrap(),
        builder.history_vectors(&series, &contract).unwrap()
    );
}

#[rstest]
fn test_future_row_feeds_back_known_values(series: CountySeries) {
    let estimator = FixedEstimator {
        known: BTreeMap::from([(ym(2024, 1), 500.0), (ym(2024, 2), 510.0)]),
        stand_in: 999.0,
    };
    let builder = FeatureBuilder::new(ym(2022, 1));
    let row = builder
        .future_row("Santa Clara", Some(&series), ym(2024, 3), Some(&estimator))
        .unwrap();

    assert_eq!(row.lag_1, Some(510.0));
    assert_eq!(row.lag_12, Some(114.0));
    // Window [2024-01, 2024-03] holds two known values
    assert_relative_eq!(row.rolling_mean_3.unwrap(), 505.0);
}

#[rstest]
fn test_future_row_falls_back_to_estimate(series: CountySeries) {
    let estimator = FixedEstimator {
        known: BTreeMap::new(),
        stand_in: 321.0,
    };
    let row = FeatureBuilder::new(ym(2022, 1))
        .future_row("Santa Clara", Some(&series), ym(2024, 6), Some(&estimator))
        .unwrap();

    assert_eq!(row.lag_1, Some(321.0));
    assert_eq!(row.lag_12, Some(117.0));
    assert_eq!(row.rolling_mean_3, Some(321.0));
}

#[rstest]
fn test_strict_future_row_needs_history(series: CountySeries) {
    let builder = FeatureBuilder::new(ym(2022, 1));
    let next = builder.future_row_strict(&series, ym(2024, 1)).unwrap();
    assert_eq!(next.lag_1, Some(123.0));

    let result = builder.future_row_strict(&series, ym(2024, 2));
    match result {
        Err(ForecastError::InsufficientHistory { feature, period, .. }) => {
            assert_eq!(feature, "lag_1");
            assert_eq!(period, ym(2024, 2));
        }
        other => panic!("Expected InsufficientHistory, got {:?}", other),
    }
}

#[rstest]
fn test_unknown_feature_is_contract_mismatch(series: CountySeries) {
    let builder = FeatureBuilder::new(ym(2022, 1));
    let contract = vec!["trend".to_string(), "temperature".to_string()];
    let result = builder.history_vectors(&series, &contract);
    assert!(matches!(result, Err(ForecastError::FeatureContractMismatch { .. })));
}

#[rstest]
fn test_county_code_required_when_contracted(series: CountySeries) {
    let builder = FeatureBuilder::new(ym(2022, 1));
    let rows = builder.history_rows(&series).unwrap();
    let result = builder.vector(&rows[0], &names(&[Feature::CountyEncoded]));
    assert!(matches!(result, Err(ForecastError::FeatureContractMismatch { .. })));
}

#[rstest]
fn test_missing_lag_in_vector_is_insufficient_history(series: CountySeries) {
    let builder = FeatureBuilder::new(ym(2022, 1));
    let rows = builder.history_rows(&series).unwrap();
    let result = builder.vector(&rows[0], &names(&[Feature::Lag1]));
    assert!(matches!(result, Err(ForecastError::InsufficientHistory { .. })));
}

#[test]
fn test_vector_contract_check_is_order_sensitive() {
    let series = CountySeries::from_values("Napa", &[(ym(2024, 1), 1.0)]).unwrap();
    let builder = FeatureBuilder::new(ym(2022, 1));
    let rows = builder.history_rows(&series).unwrap();
    let vector = builder
        .vector(&rows[0], &names(&[Feature::Year, Feature::Month]))
        .unwrap();

    assert!(vector.ensure_matches(&names(&[Feature::Year, Feature::Month])).is_ok());
    assert!(matches!(
        vector.ensure_matches(&names(&[Feature::Month, Feature::Year])),
        Err(ForecastError::FeatureContractMismatch { .. })
    ));
}
