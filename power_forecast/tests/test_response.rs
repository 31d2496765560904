use power_forecast::calendar::YearMonth;
use power_forecast::engine::{ForecastPoint, ForecastQuality, ForecastResult, IntervalMethod};
use power_forecast::models::ModelKind;
use power_forecast::response::{CountiesResponse, ErrorResponse, ForecastResponse};
use power_forecast::ForecastError;
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::{json, Value};
use std::path::PathBuf;

fn result(model_kind: ModelKind) -> ForecastResult {
    let first = YearMonth::new(2024, 12).unwrap();
    ForecastResult {
        county: "Santa Clara".to_string(),
        periods: 2,
        model_kind,
        quality: ForecastQuality::Recursive,
        interval_method: IntervalMethod::Native,
        forecast: vec![
            ForecastPoint::bounded(first, 612.3456, 580.004, 650.999),
            ForecastPoint::bounded(first.succ().unwrap(), 640.0, 600.0, 690.0),
        ],
    }
}

#[test]
fn test_forecast_response_shape() {
    let response = ForecastResponse::from(&result(ModelKind::PerCounty));
    let value: Value = serde_json::from_str(&response.to_json().unwrap()).unwrap();

    assert_eq!(
        value,
        json!({
            "county": "Santa Clara",
            "periods": 2,
            "model_type": "per_county_timeseries",
            "forecast": [
                {"date": "2024-12-01", "predicted_kwh": 612.35, "lower_bound": 580.0, "upper_bound": 651.0},
                {"date": "2025-01-01", "predicted_kwh": 640.0, "lower_bound": 600.0, "upper_bound": 690.0}
            ]
        })
    );
}

#[rstest]
#[case(ModelKind::PerCounty, "per_county_timeseries")]
#[case(ModelKind::Unified, "unified")]
fn test_model_type_names(#[case] kind: ModelKind, #[case] expected: &str) {
    assert_eq!(ForecastResponse::from(&result(kind)).model_type, expected);
}

#[test]
fn test_counties_response_sorted_unique() {
    let response = CountiesResponse::new(vec![
        "Santa Clara".to_string(),
        "Alameda".to_string(),
        "Santa Clara".to_string(),
    ]);
    assert_eq!(response.total_counties, 2);
    assert_eq!(response.counties, vec!["Alameda", "Santa Clara"]);
}

#[test]
fn test_user_errors_keep_their_message() {
    let err = ForecastError::InvalidPeriods {
        requested: 37,
        min: 1,
        max: 36,
    };
    let response = ErrorResponse::from(&err);
    assert_eq!(response.error, "invalid_periods");
    assert_eq!(response.message, "Periods must be between 1 and 36, got 37");

    let value: Value = serde_json::from_str(&response.to_json().unwrap()).unwrap();
    assert!(value.get("available_counties").is_none());
}

#[test]
fn test_infrastructure_errors_hide_paths() {
    let err = ForecastError::ModelNotFound {
        path: PathBuf::from("/srv/models/Alameda_model.json"),
        reason: "permission denied".to_string(),
    };
    let response = ErrorResponse::from(&err);
    assert_eq!(response.error, "model_not_found");
    assert!(!response.message.contains("/srv/models"));
}
