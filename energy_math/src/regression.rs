//! Least-squares fitting
//!
//! Contains the two solvers the reference models are fitted with:
//! - `LinearTrend`: a simple slope/intercept fit over paired points
//! - `least_squares`: multivariate ordinary least squares with optional ridge penalty

use crate::{MathError, Result};
use serde::{Deserialize, Serialize};

/// Simple linear trend `y = intercept + slope * x`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearTrend {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearTrend {
    /// Fit a trend through paired observations
    pub fn fit(xs: &[f64], ys: &[f64]) -> Result<Self> {
        if xs.len() != ys.len() {
            return Err(MathError::InvalidInput(format!(
                "x has {} values but y has {}",
                xs.len(),
                ys.len()
            )));
        }
        if xs.len() < 2 {
            return Err(MathError::InsufficientData(
                "Need at least 2 points for a linear trend".to_string(),
            ));
        }

        let n = xs.len() as f64;
        let x_mean = xs.iter().sum::<f64>() / n;
        let y_mean = ys.iter().sum::<f64>() / n;

        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for (&x, &y) in xs.iter().zip(ys) {
            numerator += (x - x_mean) * (y - y_mean);
            denominator += (x - x_mean) * (x - x_mean);
        }

        if denominator.abs() < 1e-12 {
            return Err(MathError::CalculationError(
                "Cannot calculate slope: x values are too similar".to_string(),
            ));
        }

        let slope = numerator / denominator;
        Ok(Self {
            slope,
            intercept: y_mean - slope * x_mean,
        })
    }

    /// Evaluate the trend at `x`
    pub fn value_at(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Solve `min ||Xβ - y||² + ridge·||β||²` for β
///
/// Each row of `design` is one observation. No intercept column is added;
/// callers that want one include a constant column themselves.
pub fn least_squares(design: &[Vec<f64>], targets: &[f64], ridge: f64) -> Result<Vec<f64>> {
    if design.len() != targets.len() {
        return Err(MathError::InvalidInput(format!(
            "Design matrix has {} rows but there are {} targets",
            design.len(),
            targets.len()
        )));
    }
    let width = match design.first() {
        Some(row) if !row.is_empty() => row.len(),
        _ => {
            return Err(MathError::InsufficientData(
                "Design matrix is empty".to_string(),
            ))
        }
    };
    if design.iter().any(|row| row.len() != width) {
        return Err(MathError::InvalidInput(
            "Design matrix rows have different lengths".to_string(),
        ));
    }
    if ridge < 0.0 || !ridge.is_finite() {
        return Err(MathError::InvalidInput(format!(
            "Ridge penalty must be non-negative, got {}",
            ridge
        )));
    }

    // Normal equations, augmented with the right-hand side in the last column
    let mut system = vec![vec![0.0; width + 1]; width];
    for (row, &y) in design.iter().zip(targets) {
        for i in 0..width {
            for j in 0..width {
                system[i][j] += row[i] * row[j];
            }
            system[i][width] += row[i] * y;
        }
    }
    for (i, equation) in system.iter_mut().enumerate() {
        equation[i] += ridge;
    }

    solve_augmented(system)
}

/// Gaussian elimination with partial pivoting on an `n × (n+1)` system
fn solve_augmented(mut system: Vec<Vec<f64>>) -> Result<Vec<f64>> {
    let n = system.len();

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&a, &b| system[a][col].abs().total_cmp(&system[b][col].abs()))
            .unwrap_or(col);
        if system[pivot][col].abs() < 1e-12 {
            return Err(MathError::CalculationError(
                "Normal equations are singular; add a ridge penalty or more observations"
                    .to_string(),
            ));
        }
        system.swap(col, pivot);

        for row in col + 1..n {
            let factor = system[row][col] / system[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..=n {
                system[row][k] -= factor * system[col][k];
            }
        }
    }

    let mut solution = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| system[row][k] * solution[k]).sum();
        solution[row] = (system[row][n] - tail) / system[row][row];
    }

    Ok(solution)
}
