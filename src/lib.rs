//! # CalPowerCast
//!
//! `cal_power_cast` bundles the CalPowerCast crates: monthly per-household
//! electricity consumption forecasts for California counties.
//!
//! ## Example
//!
//! ```
//! use cal_power_cast::forecast::response::ForecastRequest;
//!
//! let request = ForecastRequest::new("Santa Clara", None).unwrap();
//! assert_eq!(request.periods, 12);
//! assert!(ForecastRequest::new("Santa Clara", Some(37)).is_err());
//! ```

/// Numeric helpers: cyclical encoding, statistics, least squares
pub use energy_math as math;

/// Data, features, models, registry, engine and responses
pub use power_forecast as forecast;

pub use power_forecast::{
    ForecastEngine, ForecastError, ForecastRequest, ForecastResponse, ForecastResult, ServingConfig,
    YearMonth,
};
