//! # Energy Math
//!
//! Numeric building blocks shared by the forecasting crates.
//! This crate provides the cyclical calendar encodings, descriptive
//! statistics and the least-squares solver used to fit reference models.

use thiserror::Error;

pub mod cyclical;
pub mod regression;
pub mod statistics;

/// Errors that can occur in numeric calculations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for numeric operations
pub type Result<T> = std::result::Result<T, MathError>;

pub use cyclical::CyclicalPair;
pub use regression::{least_squares, LinearTrend};
pub use statistics::{mean, quantile, sample_std_dev, std_dev};
