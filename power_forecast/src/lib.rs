//! # Power Forecast
//!
//! A Rust library for forecasting monthly per-household electricity
//! consumption of California counties.
//!
//! ## Features
//!
//! - Normalization of raw sector consumption into kWh per household
//! - A feature builder shared by training and serving
//! - Per-county seasonal trend models and a unified cross-county regressor
//! - A model registry with an optional in-process cache
//! - Recursive multi-month forecasts with uncertainty bounds
//! - Stable JSON response shapes
//!
//! ## Model variants
//!
//! ```rust
//! pub enum ModelKind {
//!     PerCounty,
//!     Unified,
//! }
//! ```
//!
//! Per-county models carry their own history and report native intervals.
//! The unified model relies on a [`HistoryProvider`] for recent actuals and
//! takes its intervals from validation residuals stored in its metadata.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use power_forecast::config::ServingConfig;
//! use power_forecast::response::{ForecastRequest, ForecastResponse};
//!
//! fn main() -> power_forecast::Result<()> {
//!     // Defaults overridden by CALPOWER_* variables
//!     let config = ServingConfig::from_env()?;
//!     let engine = config.engine()?;
//!
//!     // Validate the request at the boundary
//!     let request = ForecastRequest::new("Santa Clara", Some(6))?;
//!
//!     // Forecast and shape the payload
//!     let result = engine.forecast(&request.county, request.periods as i64)?;
//!     println!("{}", ForecastResponse::from(&result).to_json()?);
//!     Ok(())
//! }
//! ```

pub mod calendar;
pub mod config;
pub mod county;
pub mod data;
pub mod engine;
pub mod error;
pub mod features;
pub mod metadata;
pub mod metrics;
pub mod models;
pub mod registry;
pub mod response;
pub mod training;
pub mod utils;

// Re-export commonly used types
pub use crate::calendar::YearMonth;
pub use crate::config::{ModelVariant, ServingConfig};
pub use crate::data::{ConsumptionHistory, ConsumptionRecord, CountySeries, DataLoader, HistoryProvider};
pub use crate::engine::{
    EngineConfig, ForecastEngine, ForecastPoint, ForecastQuality, ForecastResult, IntervalMethod,
};
pub use crate::error::{ErrorCategory, ForecastError, Result};
pub use crate::features::{Feature, FeatureBuilder, FeatureVector};
pub use crate::metadata::ModelMetadata;
pub use crate::models::{ForecastableModel, ModelKind, Prediction};
pub use crate::registry::{FileModelStore, ModelRegistry, ModelStore, ResolvedModel};
pub use crate::response::{CountiesResponse, ErrorResponse, ForecastRequest, ForecastResponse};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
