//! Serving configuration
//!
//! Read from a JSON file and/or `CALPOWER_*` environment variables. Every
//! field has a default, so an empty file or environment is a valid config.

use crate::calendar::{YearMonth, DEFAULT_TREND_ORIGIN, DEFAULT_UNIFIED_CUTOFF};
use crate::data::{ConsumptionHistory, DataLoader, HistoryProvider};
use crate::engine::{EngineConfig, ForecastEngine};
use crate::error::{ForecastError, Result};
use crate::metadata::MetadataDefaults;
use crate::models::ModelKind;
use crate::registry::{FileModelStore, ModelRegistry};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Prefix of every configuration environment variable
pub const ENV_PREFIX: &str = "CALPOWER_";

/// Which model variant the service answers with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    PerCounty,
    Unified,
}

impl ModelVariant {
    pub fn kind(&self) -> ModelKind {
        match self {
            ModelVariant::PerCounty => ModelKind::PerCounty,
            ModelVariant::Unified => ModelKind::Unified,
        }
    }
}

impl FromStr for ModelVariant {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per_county" | "per-county" | "per_county_timeseries" => Ok(ModelVariant::PerCounty),
            "unified" => Ok(ModelVariant::Unified),
            other => Err(ForecastError::InvalidParameter(format!(
                "Unknown model variant '{}', expected 'per_county' or 'unified'",
                other
            ))),
        }
    }
}

/// Settings of the forecast service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServingConfig {
    /// Directory holding model artifacts
    pub model_dir: PathBuf,
    pub variant: ModelVariant,
    /// Normalized consumption CSV used as recent actuals
    pub history_csv: Option<PathBuf>,
    pub default_periods: usize,
    pub max_periods: usize,
    pub confidence_level: f64,
    /// kWh per household assumed when a county has no history
    pub fallback_kwh: f64,
    /// Training cutoff of unified models whose metadata lacks one
    pub unified_cutoff: YearMonth,
    pub trend_origin: YearMonth,
    pub cache_models: bool,
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            variant: ModelVariant::PerCounty,
            history_csv: None,
            default_periods: 12,
            max_periods: 36,
            confidence_level: 0.95,
            fallback_kwh: 800.0,
            unified_cutoff: DEFAULT_UNIFIED_CUTOFF,
            trend_origin: DEFAULT_TREND_ORIGIN,
            cache_models: true,
        }
    }
}

fn parse_env<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| {
        ForecastError::InvalidParameter(format!("{}{}={}: {}", ENV_PREFIX, key, raw, e))
    })
}

impl ServingConfig {
    /// Load from a JSON file; missing fields take defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: ServingConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    /// Apply overrides looked up by unprefixed key, e.g. `MODEL_DIR`
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("VARIANT") {
            self.variant = parse_env("VARIANT", &v)?;
        }
        if let Some(v) = lookup("HISTORY_CSV") {
            self.history_csv = if v.trim().is_empty() { None } else { Some(PathBuf::from(v)) };
        }
        if let Some(v) = lookup("DEFAULT_PERIODS") {
            self.default_periods = parse_env("DEFAULT_PERIODS", &v)?;
        }
        if let Some(v) = lookup("MAX_PERIODS") {
            self.max_periods = parse_env("MAX_PERIODS", &v)?;
        }
        if let Some(v) = lookup("CONFIDENCE_LEVEL") {
            self.confidence_level = parse_env("CONFIDENCE_LEVEL", &v)?;
        }
        if let Some(v) = lookup("FALLBACK_KWH") {
            self.fallback_kwh = parse_env("FALLBACK_KWH", &v)?;
        }
        if let Some(v) = lookup("UNIFIED_CUTOFF") {
            self.unified_cutoff = parse_env("UNIFIED_CUTOFF", &v)?;
        }
        if let Some(v) = lookup("TREND_ORIGIN") {
            self.trend_origin = parse_env("TREND_ORIGIN", &v)?;
        }
        if let Some(v) = lookup("CACHE_MODELS") {
            self.cache_models = parse_env("CACHE_MODELS", &v)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject settings the engine cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.max_periods == 0 {
            return Err(ForecastError::InvalidParameter(
                "max_periods must be at least 1".to_string(),
            ));
        }
        if self.default_periods == 0 || self.default_periods > self.max_periods {
            return Err(ForecastError::InvalidParameter(format!(
                "default_periods must be between 1 and {}, got {}",
                self.max_periods, self.default_periods
            )));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "confidence_level must be between 0 and 1, got {}",
                self.confidence_level
            )));
        }
        if !(self.fallback_kwh.is_finite() && self.fallback_kwh >= 0.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "fallback_kwh must be a non-negative number, got {}",
                self.fallback_kwh
            )));
        }
        if self.trend_origin > self.unified_cutoff {
            return Err(ForecastError::InvalidParameter(format!(
                "trend_origin {} is after unified_cutoff {}",
                self.trend_origin, self.unified_cutoff
            )));
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_periods: self.max_periods,
            confidence_level: self.confidence_level,
            fallback_kwh: self.fallback_kwh,
        }
    }

    pub fn metadata_defaults(&self) -> MetadataDefaults {
        MetadataDefaults {
            training_cutoff: self.unified_cutoff,
            trend_origin: self.trend_origin,
        }
    }

    /// Registry over `model_dir` for the configured variant
    pub fn registry(&self) -> ModelRegistry {
        let store = Arc::new(FileModelStore::new(&self.model_dir));
        let registry = ModelRegistry::new(store, self.variant.kind(), self.metadata_defaults());
        if self.cache_models {
            registry.with_cache()
        } else {
            registry
        }
    }

    /// Engine wired with the registry and, if configured, recent actuals
    pub fn engine(&self) -> Result<ForecastEngine> {
        let engine = ForecastEngine::new(Arc::new(self.registry()), self.engine_config());
        match &self.history_csv {
            Some(path) => {
                let history: ConsumptionHistory = DataLoader::history_from_csv(path)?;
                info!(
                    path = %path.display(),
                    counties = history.len(),
                    "Loaded recent actuals"
                );
                let history: Arc<dyn HistoryProvider> = Arc::new(history);
                Ok(engine.with_history(history))
            }
            None => Ok(engine),
        }
    }
}
