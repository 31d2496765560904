//! Typed model metadata
//!
//! Metadata arrives as a loosely structured JSON record. It is validated once
//! at load time into [`ModelMetadata`], whose feature list is the ordered
//! contract every serving-time feature vector is checked against.

use crate::calendar::YearMonth;
use crate::county::canonical_county;
use crate::error::{ForecastError, Result};
use crate::features::{parse_contract, Feature};
use crate::metrics::ErrorMetrics;
use crate::models::{ModelKind, SeasonalTrendModel};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Empirical interval offsets learnt from validation residuals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResidualBand {
    /// Offset added to the prediction for the lower bound (≤ 0)
    pub lower: f64,
    /// Offset added to the prediction for the upper bound (≥ 0)
    pub upper: f64,
}

/// Values used when a metadata record leaves them out
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetadataDefaults {
    pub training_cutoff: YearMonth,
    pub trend_origin: YearMonth,
}

/// Validated feature contract and bookkeeping for a trained model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMetadata {
    model_kind: ModelKind,
    counties: BTreeSet<String>,
    feature_names: Vec<String>,
    county_encoding: BTreeMap<String, i64>,
    training_cutoff: YearMonth,
    trend_origin: YearMonth,
    training_metrics: Option<ErrorMetrics>,
    validation_metrics: Option<ErrorMetrics>,
    residual_band: Option<ResidualBand>,
}

/// Metadata as stored next to a unified artifact
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMetadata {
    #[serde(default)]
    pub model_type: Option<String>,
    pub counties: Vec<String>,
    #[serde(default)]
    pub total_counties: Option<usize>,
    pub features: Vec<String>,
    /// Integer code (as a JSON key) to county name
    #[serde(default)]
    pub county_mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub training_cutoff: Option<YearMonth>,
    #[serde(default)]
    pub trend_origin: Option<YearMonth>,
    #[serde(default)]
    pub training_records: Option<usize>,
    #[serde(default)]
    pub validation_records: Option<usize>,
    #[serde(default)]
    pub training_rmse: Option<f64>,
    #[serde(default)]
    pub training_mae: Option<f64>,
    #[serde(default)]
    pub training_mape: Option<f64>,
    #[serde(default)]
    pub training_r2: Option<f64>,
    #[serde(default)]
    pub validation_rmse: Option<f64>,
    #[serde(default)]
    pub validation_mae: Option<f64>,
    #[serde(default)]
    pub validation_mape: Option<f64>,
    #[serde(default)]
    pub validation_r2: Option<f64>,
    #[serde(default)]
    pub residual_quantiles: Option<[f64; 2]>,
    #[serde(default)]
    pub train_date: Option<String>,
}

fn metrics_from(
    rmse: Option<f64>,
    mae: Option<f64>,
    mape: Option<f64>,
    r2: Option<f64>,
) -> Option<ErrorMetrics> {
    Some(ErrorMetrics {
        rmse: rmse?,
        mae: mae?,
        mape: mape.unwrap_or(f64::NAN),
        r2: r2.unwrap_or(f64::NAN),
    })
}

fn finite_or_none(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

impl ModelMetadata {
    /// Parse and validate a unified metadata record
    pub fn from_json(json: &str, defaults: MetadataDefaults) -> Result<Self> {
        let raw: RawMetadata = serde_json::from_str(json)
            .map_err(|e| ForecastError::InvalidMetadata(e.to_string()))?;
        Self::from_raw(raw, defaults)
    }

    /// Validate a raw record into typed metadata
    pub fn from_raw(raw: RawMetadata, defaults: MetadataDefaults) -> Result<Self> {
        let feature_names = validate_features(&raw.features)?;

        let counties: BTreeSet<String> = raw
            .counties
            .iter()
            .map(|c| canonical_county(c))
            .filter(|c| !c.is_empty())
            .collect();
        if counties.is_empty() {
            return Err(ForecastError::InvalidMetadata(
                "Metadata lists no counties".to_string(),
            ));
        }
        if let Some(total) = raw.total_counties {
            if total != counties.len() {
                return Err(ForecastError::InvalidMetadata(format!(
                    "total_counties is {} but {} distinct counties are listed",
                    total,
                    counties.len()
                )));
            }
        }

        let mut county_encoding = BTreeMap::new();
        let mut seen_codes = HashSet::new();
        for (code, name) in &raw.county_mapping {
            let code: i64 = code.trim().parse().map_err(|_| {
                ForecastError::InvalidMetadata(format!("County code '{}' is not an integer", code))
            })?;
            let name = canonical_county(name);
            if !counties.contains(&name) {
                return Err(ForecastError::InvalidMetadata(format!(
                    "County mapping refers to unknown county '{}'",
                    name
                )));
            }
            if !seen_codes.insert(code) || county_encoding.insert(name.clone(), code).is_some() {
                return Err(ForecastError::InvalidMetadata(format!(
                    "County mapping is not one-to-one at '{}' ({})",
                    name, code
                )));
            }
        }

        if feature_names.iter().any(|f| f == Feature::CountyEncoded.name()) {
            if let Some(missing) = counties.iter().find(|c| !county_encoding.contains_key(*c)) {
                return Err(ForecastError::InvalidMetadata(format!(
                    "County '{}' has no code in county_mapping",
                    missing
                )));
            }
        }

        let residual_band = match raw.residual_quantiles {
            Some([lower, upper]) => {
                if !(lower.is_finite() && upper.is_finite() && lower <= 0.0 && upper >= 0.0) {
                    return Err(ForecastError::InvalidMetadata(format!(
                        "Residual quantiles must bracket zero, got [{}, {}]",
                        lower, upper
                    )));
                }
                Some(ResidualBand { lower, upper })
            }
            None => None,
        };

        if let Some(kind) = raw.model_type.as_deref() {
            if kind.contains("per_county") {
                return Err(ForecastError::InvalidMetadata(format!(
                    "Expected unified metadata, found model_type '{}'",
                    kind
                )));
            }
        }

        Ok(Self {
            model_kind: ModelKind::Unified,
            counties,
            feature_names,
            county_encoding,
            training_cutoff: raw.training_cutoff.unwrap_or(defaults.training_cutoff),
            trend_origin: raw.trend_origin.unwrap_or(defaults.trend_origin),
            training_metrics: metrics_from(
                raw.training_rmse,
                raw.training_mae,
                raw.training_mape,
                raw.training_r2,
            ),
            validation_metrics: metrics_from(
                raw.validation_rmse,
                raw.validation_mae,
                raw.validation_mape,
                raw.validation_r2,
            ),
            residual_band,
        })
    }

    /// Metadata for a unified model produced in-process
    #[allow(clippy::too_many_arguments)]
    pub fn unified(
        counties: BTreeMap<String, i64>,
        feature_names: Vec<String>,
        training_cutoff: YearMonth,
        trend_origin: YearMonth,
        training_metrics: Option<ErrorMetrics>,
        validation_metrics: Option<ErrorMetrics>,
        residual_band: Option<ResidualBand>,
    ) -> Result<Self> {
        let raw = RawMetadata {
            model_type: Some(ModelKind::Unified.as_str().to_string()),
            counties: counties.keys().cloned().collect(),
            features: feature_names,
            county_mapping: counties
                .iter()
                .map(|(name, code)| (code.to_string(), name.clone()))
                .collect(),
            training_cutoff: Some(training_cutoff),
            trend_origin: Some(trend_origin),
            training_rmse: training_metrics.map(|m| m.rmse),
            training_mae: training_metrics.map(|m| m.mae),
            training_mape: training_metrics.and_then(|m| finite_or_none(m.mape)),
            training_r2: training_metrics.and_then(|m| finite_or_none(m.r2)),
            validation_rmse: validation_metrics.map(|m| m.rmse),
            validation_mae: validation_metrics.map(|m| m.mae),
            validation_mape: validation_metrics.and_then(|m| finite_or_none(m.mape)),
            validation_r2: validation_metrics.and_then(|m| finite_or_none(m.r2)),
            residual_quantiles: residual_band.map(|b| [b.lower, b.upper]),
            ..RawMetadata::default()
        };
        Self::from_raw(
            raw,
            MetadataDefaults {
                training_cutoff,
                trend_origin,
            },
        )
    }

    /// Metadata describing a single per-county model
    pub fn per_county(model: &SeasonalTrendModel) -> Result<Self> {
        let feature_names = validate_features(
            crate::models::ForecastableModel::feature_names(model),
        )?;
        Ok(Self {
            model_kind: ModelKind::PerCounty,
            counties: BTreeSet::from([model.county().to_string()]),
            feature_names,
            county_encoding: BTreeMap::new(),
            training_cutoff: model.training_cutoff(),
            trend_origin: model.trend_origin(),
            training_metrics: Some(model.training_metrics()),
            validation_metrics: None,
            residual_band: None,
        })
    }

    /// Raw record suitable for writing next to the artifact
    pub fn to_raw(&self) -> RawMetadata {
        RawMetadata {
            model_type: Some(self.model_kind.as_str().to_string()),
            counties: self.counties.iter().cloned().collect(),
            total_counties: Some(self.counties.len()),
            features: self.feature_names.clone(),
            county_mapping: self
                .county_encoding
                .iter()
                .map(|(name, code)| (code.to_string(), name.clone()))
                .collect(),
            training_cutoff: Some(self.training_cutoff),
            trend_origin: Some(self.trend_origin),
            training_rmse: self.training_metrics.map(|m| m.rmse),
            training_mae: self.training_metrics.map(|m| m.mae),
            training_mape: self.training_metrics.and_then(|m| finite_or_none(m.mape)),
            training_r2: self.training_metrics.and_then(|m| finite_or_none(m.r2)),
            validation_rmse: self.validation_metrics.map(|m| m.rmse),
            validation_mae: self.validation_metrics.map(|m| m.mae),
            validation_mape: self.validation_metrics.and_then(|m| finite_or_none(m.mape)),
            validation_r2: self.validation_metrics.and_then(|m| finite_or_none(m.r2)),
            residual_quantiles: self.residual_band.map(|b| [b.lower, b.upper]),
            ..RawMetadata::default()
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_raw())?)
    }

    pub fn model_kind(&self) -> ModelKind {
        self.model_kind
    }

    pub fn counties(&self) -> &BTreeSet<String> {
        &self.counties
    }

    pub fn contains_county(&self, county: &str) -> bool {
        self.counties.contains(county)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn county_code(&self, county: &str) -> Option<i64> {
        self.county_encoding.get(county).copied()
    }

    pub fn county_encoding(&self) -> &BTreeMap<String, i64> {
        &self.county_encoding
    }

    pub fn training_cutoff(&self) -> YearMonth {
        self.training_cutoff
    }

    pub fn trend_origin(&self) -> YearMonth {
        self.trend_origin
    }

    pub fn training_metrics(&self) -> Option<ErrorMetrics> {
        self.training_metrics
    }

    pub fn validation_metrics(&self) -> Option<ErrorMetrics> {
        self.validation_metrics
    }

    pub fn residual_band(&self) -> Option<ResidualBand> {
        self.residual_band
    }
}

fn validate_features(features: &[String]) -> Result<Vec<String>> {
    if features.is_empty() {
        return Err(ForecastError::InvalidMetadata(
            "Feature list is empty".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    if let Some(duplicate) = features.iter().find(|f| !seen.insert(f.as_str())) {
        return Err(ForecastError::InvalidMetadata(format!(
            "Feature '{}' is listed twice",
            duplicate
        )));
    }
    parse_contract(features).map_err(|_| {
        ForecastError::InvalidMetadata(format!(
            "Features [{}] include names the feature builder cannot derive",
            features.join(", ")
        ))
    })?;
    Ok(features.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn defaults() -> MetadataDefaults {
        MetadataDefaults {
            training_cutoff: YearMonth::new(2024, 11).unwrap(),
            trend_origin: YearMonth::new(2022, 1).unwrap(),
        }
    }

    #[test]
    fn test_parses_training_script_output() {
        let json = r#"{
            "model_type": "xgboost_unified",
            "counties": ["Alameda", "Santa Clara"],
            "total_counties": 2,
            "features": ["county_encoded", "year", "month", "lag_1"],
            "county_mapping": {"0": "Alameda", "1": "Santa Clara"},
            "validation_rmse": 12.5,
            "validation_mae": 9.0,
            "validation_r2": 0.91,
            "train_date": "2025-01-04T10:00:00"
        }"#;

        let metadata = ModelMetadata::from_json(json, defaults()).unwrap();
        assert_eq!(metadata.model_kind(), ModelKind::Unified);
        assert_eq!(metadata.county_code("Santa Clara"), Some(1));
        assert_eq!(metadata.training_cutoff(), YearMonth::new(2024, 11).unwrap());
        assert_eq!(metadata.validation_metrics().unwrap().rmse, 12.5);
        assert!(metadata.training_metrics().is_none());
    }

    #[test]
    fn test_rejects_duplicate_features() {
        let raw = RawMetadata {
            counties: vec!["Alameda".to_string()],
            features: vec!["trend".to_string(), "trend".to_string()],
            ..RawMetadata::default()
        };
        assert!(matches!(
            ModelMetadata::from_raw(raw, defaults()),
            Err(ForecastError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_feature() {
        let raw = RawMetadata {
            counties: vec!["Alameda".to_string()],
            features: vec!["trend".to_string(), "temperature".to_string()],
            ..RawMetadata::default()
        };
        assert!(ModelMetadata::from_raw(raw, defaults()).is_err());
    }

    #[test]
    fn test_requires_codes_for_encoded_counties() {
        let raw = RawMetadata {
            counties: vec!["Alameda".to_string(), "Kern".to_string()],
            features: vec!["county_encoded".to_string()],
            county_mapping: BTreeMap::from([("0".to_string(), "Alameda".to_string())]),
            ..RawMetadata::default()
        };
        assert!(ModelMetadata::from_raw(raw, defaults()).is_err());
    }

    #[test]
    fn test_raw_round_trip() {
        let metadata = ModelMetadata::unified(
            BTreeMap::from([("Alameda".to_string(), 0), ("Kern".to_string(), 1)]),
            vec!["county_encoded".to_string(), "trend".to_string()],
            YearMonth::new(2024, 11).unwrap(),
            YearMonth::new(2022, 1).unwrap(),
            None,
            None,
            Some(ResidualBand {
                lower: -20.0,
                upper: 25.0,
            }),
        )
        .unwrap();

        let restored = ModelMetadata::from_json(&metadata.to_json().unwrap(), defaults()).unwrap();
        assert_eq!(metadata, restored);
    }
}
