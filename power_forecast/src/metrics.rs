//! Metrics for evaluating forecast accuracy and sizing intervals

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

/// Error metrics for forecast evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorMetrics {
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Error
    pub mae: f64,
    /// Mean Absolute Percentage Error, over non-zero actuals
    pub mape: f64,
    /// Coefficient of determination
    pub r2: f64,
}

impl std::fmt::Display for ErrorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Forecast Accuracy Metrics:")?;
        writeln!(f, "  RMSE:  {:.2} kWh/household", self.rmse)?;
        writeln!(f, "  MAE:   {:.2} kWh/household", self.mae)?;
        writeln!(f, "  MAPE:  {:.2}%", self.mape)?;
        writeln!(f, "  R²:    {:.4}", self.r2)?;
        Ok(())
    }
}

fn check_lengths(actual: &[f64], predicted: &[f64]) -> Result<()> {
    if actual.len() != predicted.len() || actual.is_empty() {
        return Err(ForecastError::ValidationError(
            "Actual and predicted values must have the same non-zero length".to_string(),
        ));
    }
    Ok(())
}

/// Calculate accuracy metrics for predictions against actual values
pub fn evaluate(actual: &[f64], predicted: &[f64]) -> Result<ErrorMetrics> {
    check_lengths(actual, predicted)?;

    let n = actual.len() as f64;
    let errors: Vec<f64> = actual
        .iter()
        .zip(predicted)
        .map(|(&a, &p)| a - p)
        .collect();

    let mse = errors.iter().map(|e| e.powi(2)).sum::<f64>() / n;
    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;

    let percentage: Vec<f64> = actual
        .iter()
        .zip(&errors)
        .filter(|(&a, _)| a != 0.0)
        .map(|(&a, &e)| (e / a).abs() * 100.0)
        .collect();
    let mape = if percentage.is_empty() {
        0.0
    } else {
        percentage.iter().sum::<f64>() / percentage.len() as f64
    };

    let mean_actual = actual.iter().sum::<f64>() / n;
    let ss_tot = actual.iter().map(|a| (a - mean_actual).powi(2)).sum::<f64>();
    let ss_res = errors.iter().map(|e| e.powi(2)).sum::<f64>();
    let r2 = if ss_tot == 0.0 { 0.0 } else { 1.0 - ss_res / ss_tot };

    Ok(ErrorMetrics {
        rmse: mse.sqrt(),
        mae,
        mape,
        r2,
    })
}

/// Two-sided standard normal critical value for a confidence level
pub fn z_score(confidence_level: f64) -> Result<f64> {
    if !(confidence_level > 0.0 && confidence_level < 1.0) {
        return Err(ForecastError::InvalidParameter(format!(
            "Confidence level must be between 0 and 1, got {}",
            confidence_level
        )));
    }
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| ForecastError::ValidationError(format!("Standard normal: {}", e)))?;
    Ok(normal.inverse_cdf(0.5 + confidence_level / 2.0))
}

/// Residual offsets bracketing `confidence_level` of the errors
///
/// Returns `(lower, upper)` quantiles of `actual - predicted`; adding them to
/// a new prediction gives an empirical interval.
pub fn residual_band(actual: &[f64], predicted: &[f64], confidence_level: f64) -> Result<(f64, f64)> {
    check_lengths(actual, predicted)?;
    if !(confidence_level > 0.0 && confidence_level < 1.0) {
        return Err(ForecastError::InvalidParameter(format!(
            "Confidence level must be between 0 and 1, got {}",
            confidence_level
        )));
    }

    let residuals: Vec<f64> = actual
        .iter()
        .zip(predicted)
        .map(|(&a, &p)| a - p)
        .collect();
    let tail = (1.0 - confidence_level) / 2.0;

    let lower = energy_math::quantile(&residuals, tail)?;
    let upper = energy_math::quantile(&residuals, 1.0 - tail)?;
    Ok((lower.min(0.0), upper.max(0.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_regression_metrics() {
        let actual = vec![10.0, 20.0, 30.0, 40.0, 50.0];
        let predicted = vec![12.0, 18.0, 33.0, 37.0, 52.0];

        let metrics = evaluate(&actual, &predicted).unwrap();
        assert_relative_eq!(metrics.mae, 2.4, epsilon = 1e-9);
        assert_relative_eq!(metrics.rmse, 6.0_f64.sqrt(), epsilon = 1e-9);
        assert!(metrics.r2 > 0.9 && metrics.r2 < 1.0);
        assert!(metrics.mape > 0.0 && metrics.mape < 15.0);
    }

    #[test]
    fn test_mismatched_lengths() {
        assert!(evaluate(&[1.0, 2.0], &[1.0]).is_err());
        assert!(evaluate(&[], &[]).is_err());
    }

    #[test]
    fn test_z_score() {
        assert_relative_eq!(z_score(0.95).unwrap(), 1.959964, epsilon = 1e-5);
        assert_relative_eq!(z_score(0.80).unwrap(), 1.281552, epsilon = 1e-5);
        assert!(z_score(1.0).is_err());
        assert!(z_score(0.0).is_err());
    }

    #[test]
    fn test_residual_band_brackets_zero() {
        let actual = [10.0, 11.0, 9.0, 10.5, 9.5];
        let predicted = [10.0; 5];
        let (lower, upper) = residual_band(&actual, &predicted, 0.9).unwrap();
        assert!(lower < 0.0 && upper > 0.0);
        assert!(lower >= -1.0 && upper <= 1.0);

        // A biased model still yields a band that contains the prediction
        let (lower, upper) = residual_band(&[5.0, 6.0], &[1.0, 1.0], 0.9).unwrap();
        assert_eq!(lower, 0.0);
        assert!(upper > 4.0);
    }
}
