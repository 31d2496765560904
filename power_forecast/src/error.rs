//! Error types for the power_forecast crate

use crate::calendar::YearMonth;
use energy_math::MathError;
use polars::prelude::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

/// Custom error types for the power_forecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// The requested county is not known to the model registry
    #[error(
        "County '{requested}' not found. Available counties: {}",
        .available.join(", ")
    )]
    CountyNotFound {
        requested: String,
        available: Vec<String>,
    },

    /// A model artifact is missing or unreadable
    #[error("Model not found at {}: {reason}", .path.display())]
    ModelNotFound { path: PathBuf, reason: String },

    /// A lag or rolling feature cannot be computed from the available history
    #[error("Insufficient history for '{county}' at {period}: cannot compute {feature}")]
    InsufficientHistory {
        county: String,
        period: YearMonth,
        feature: String,
    },

    /// Serving-time features differ from the features the model was trained on
    #[error(
        "Feature contract mismatch: model expects [{}] but got [{}]",
        .expected.join(", "),
        .actual.join(", ")
    )]
    FeatureContractMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// The requested horizon is outside the supported range
    #[error("Periods must be between {min} and {max}, got {requested}")]
    InvalidPeriods { requested: i64, min: usize, max: usize },

    /// Model metadata failed validation at load time
    #[error("Invalid model metadata: {0}")]
    InvalidMetadata(String),

    /// Error related to data validation or processing
    #[error("Data error: {0}")]
    DataError(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error related to parameter validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),

    /// Error from CSV reading or writing
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Error from JSON (de)serialization
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Error from numeric routines
    #[error("Math error: {0}")]
    Math(#[from] MathError),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Coarse classification a transport layer can map to status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad request parameters
    UserInput,
    /// The requested county does not exist
    NotFound,
    /// The request was valid but could not be processed
    Processing,
    /// Storage or deployment problem; operators should be alerted
    Infrastructure,
    /// A bug: serving and training disagree
    Internal,
}

impl ForecastError {
    /// Classify this error without inspecting its message
    pub fn category(&self) -> ErrorCategory {
        match self {
            ForecastError::InvalidPeriods { .. } | ForecastError::InvalidParameter(_) => {
                ErrorCategory::UserInput
            }
            ForecastError::CountyNotFound { .. } => ErrorCategory::NotFound,
            ForecastError::InsufficientHistory { .. }
            | ForecastError::DataError(_)
            | ForecastError::ValidationError(_)
            | ForecastError::Math(_) => ErrorCategory::Processing,
            ForecastError::ModelNotFound { .. }
            | ForecastError::InvalidMetadata(_)
            | ForecastError::IoError(_)
            | ForecastError::PolarsError(_)
            | ForecastError::CsvError(_)
            | ForecastError::SerializationError(_) => ErrorCategory::Infrastructure,
            ForecastError::FeatureContractMismatch { .. } => ErrorCategory::Internal,
        }
    }

    /// Stable machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ForecastError::CountyNotFound { .. } => "county_not_found",
            ForecastError::ModelNotFound { .. } => "model_not_found",
            ForecastError::InsufficientHistory { .. } => "insufficient_history",
            ForecastError::FeatureContractMismatch { .. } => "feature_contract_mismatch",
            ForecastError::InvalidPeriods { .. } => "invalid_periods",
            ForecastError::InvalidMetadata(_) => "invalid_metadata",
            ForecastError::DataError(_) => "data_error",
            ForecastError::InvalidParameter(_) => "invalid_parameter",
            ForecastError::ValidationError(_) => "validation_error",
            ForecastError::IoError(_) => "io_error",
            ForecastError::PolarsError(_) => "polars_error",
            ForecastError::CsvError(_) => "csv_error",
            ForecastError::SerializationError(_) => "serialization_error",
            ForecastError::Math(_) => "math_error",
        }
    }

    /// True when the caller, not the deployment, caused the failure
    pub fn is_user_error(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::UserInput | ErrorCategory::NotFound
        )
    }
}

impl From<PolarsError> for ForecastError {
    fn from(err: PolarsError) -> Self {
        ForecastError::PolarsError(err.to_string())
    }
}

impl From<csv::Error> for ForecastError {
    fn from(err: csv::Error) -> Self {
        ForecastError::CsvError(err.to_string())
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::SerializationError(err.to_string())
    }
}
