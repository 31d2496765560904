//! Model registry
//!
//! Resolves a county name to a trained model and its validated metadata.
//! Artifacts are read through a [`ModelStore`]; [`FileModelStore`] keeps them
//! as JSON files in one directory:
//!
//! - `<County_Name>_model.json`: one seasonal trend model per county
//! - `unified_forecast_model.json`: the cross-county regressor
//! - `unified_model_metadata.json`: the regressor's counties and feature contract

use crate::county::{artifact_stem, canonical_county};
use crate::error::{ForecastError, Result};
use crate::metadata::{MetadataDefaults, ModelMetadata};
use crate::models::{ForecastableModel, LinearRegressor, ModelKind, SeasonalTrendModel};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Artifact name of the unified regressor
pub const UNIFIED_MODEL_FILE: &str = "unified_forecast_model.json";
/// Artifact name of the unified regressor's metadata
pub const UNIFIED_METADATA_FILE: &str = "unified_model_metadata.json";
/// Suffix shared by per-county artifacts
pub const PER_COUNTY_SUFFIX: &str = "_model.json";

/// Artifact name of a county's seasonal trend model
pub fn per_county_file(county: &str) -> String {
    format!("{}{}", artifact_stem(county), PER_COUNTY_SUFFIX)
}

/// The county a per-county artifact was trained for
#[derive(Deserialize)]
struct ArtifactCounty {
    county: String,
}

/// Storage holding serialized model artifacts
pub trait ModelStore: Debug + Send + Sync {
    /// Names of all stored artifacts
    fn list(&self) -> Result<Vec<String>>;

    /// Contents of the named artifact
    fn read(&self, name: &str) -> Result<String>;

    /// Create or replace the named artifact
    fn write(&self, name: &str, contents: &str) -> Result<()>;

    /// Where the named artifact lives, for error reports
    fn locate(&self, name: &str) -> PathBuf;
}

/// Artifacts stored as files in one directory
#[derive(Debug, Clone)]
pub struct FileModelStore {
    root: PathBuf,
}

impl FileModelStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ModelStore for FileModelStore {
    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn read(&self, name: &str) -> Result<String> {
        Ok(fs::read_to_string(self.locate(name))?)
    }

    fn write(&self, name: &str, contents: &str) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        fs::write(self.locate(name), contents)?;
        Ok(())
    }

    fn locate(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

/// Store a county's seasonal trend model under its artifact name
pub fn publish_per_county(store: &dyn ModelStore, model: &SeasonalTrendModel) -> Result<()> {
    let name = per_county_file(model.county());
    store.write(&name, &model.to_json()?)?;
    info!(county = model.county(), artifact = %name, "Stored per-county model");
    Ok(())
}

/// Store the unified regressor together with its metadata
pub fn publish_unified(
    store: &dyn ModelStore,
    model: &LinearRegressor,
    metadata: &ModelMetadata,
) -> Result<()> {
    metadata_contract_matches(model, metadata)?;
    store.write(UNIFIED_MODEL_FILE, &model.to_json()?)?;
    store.write(UNIFIED_METADATA_FILE, &metadata.to_json()?)?;
    info!(counties = metadata.counties().len(), "Stored unified model");
    Ok(())
}

fn metadata_contract_matches(model: &dyn ForecastableModel, metadata: &ModelMetadata) -> Result<()> {
    if model.feature_names() != metadata.feature_names() {
        return Err(ForecastError::FeatureContractMismatch {
            expected: metadata.feature_names().to_vec(),
            actual: model.feature_names().to_vec(),
        });
    }
    Ok(())
}

/// A model ready to serve, with the metadata that describes it
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    pub model: Arc<dyn ForecastableModel>,
    pub metadata: Arc<ModelMetadata>,
}

/// Resolves counties to models for one model variant
#[derive(Debug)]
pub struct ModelRegistry {
    store: Arc<dyn ModelStore>,
    kind: ModelKind,
    defaults: MetadataDefaults,
    cache: Option<RwLock<HashMap<String, ResolvedModel>>>,
}

impl ModelRegistry {
    /// Registry without a cache; every resolve reads the store
    pub fn new(store: Arc<dyn ModelStore>, kind: ModelKind, defaults: MetadataDefaults) -> Self {
        Self {
            store,
            kind,
            defaults,
            cache: None,
        }
    }

    /// Keep resolved models in memory until [`invalidate`](Self::invalidate)
    pub fn with_cache(mut self) -> Self {
        self.cache = Some(RwLock::new(HashMap::new()));
        self
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Drop every cached model so the next resolve reloads from the store
    pub fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            let mut cache = cache.write().unwrap_or_else(|e| e.into_inner());
            let dropped = cache.len();
            cache.clear();
            info!(dropped, "Model cache invalidated");
        }
    }

    /// Sorted, de-duplicated canonical names of every servable county
    pub fn list_counties(&self) -> Result<Vec<String>> {
        let counties: BTreeSet<String> = match self.kind {
            ModelKind::PerCounty => self.per_county_artifacts()?.into_keys().collect(),
            ModelKind::Unified => self.load_unified_metadata()?.counties().clone(),
        };
        Ok(counties.into_iter().collect())
    }

    /// Per-county artifact names keyed by the county each one holds
    ///
    /// File names drop commas, so the county is read from the artifact.
    /// Unreadable artifacts are keyed by their file name so that resolving
    /// them reports the damaged file.
    fn per_county_artifacts(&self) -> Result<BTreeMap<String, String>> {
        let mut names = self.store.list().map_err(|e| ForecastError::ModelNotFound {
            path: self.store.locate(""),
            reason: e.to_string(),
        })?;
        names.sort();

        let mut artifacts = BTreeMap::new();
        for name in names {
            if name == UNIFIED_MODEL_FILE {
                continue;
            }
            let Some(stem) = name.strip_suffix(PER_COUNTY_SUFFIX) else {
                continue;
            };
            let county = match self
                .store
                .read(&name)
                .ok()
                .and_then(|json| serde_json::from_str::<ArtifactCounty>(&json).ok())
            {
                Some(artifact) => canonical_county(&artifact.county),
                None => {
                    debug!(artifact = %name, "Unreadable artifact listed by file name");
                    canonical_county(stem)
                }
            };
            if !county.is_empty() {
                artifacts.insert(county, name);
            }
        }
        Ok(artifacts)
    }

    /// Model and metadata for `county`
    ///
    /// The name is canonicalized first; matching is case-sensitive.
    pub fn resolve(&self, county: &str) -> Result<ResolvedModel> {
        let canonical = canonical_county(county);

        if let Some(cache) = &self.cache {
            let cache = cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(resolved) = cache.get(&canonical) {
                debug!(county = %canonical, "Model cache hit");
                return Ok(resolved.clone());
            }
        }

        let resolved = match self.kind {
            ModelKind::PerCounty => self.load_per_county(county, &canonical)?,
            ModelKind::Unified => self.load_unified(county, &canonical)?,
        };
        debug!(
            county = %canonical,
            kind = %self.kind,
            model = resolved.model.name(),
            "Resolved model"
        );

        if let Some(cache) = &self.cache {
            let mut cache = cache.write().unwrap_or_else(|e| e.into_inner());
            cache.insert(canonical, resolved.clone());
        }
        Ok(resolved)
    }

    fn not_found(&self, requested: &str) -> ForecastError {
        ForecastError::CountyNotFound {
            requested: requested.to_string(),
            available: self.list_counties().unwrap_or_default(),
        }
    }

    fn read_artifact(&self, name: &str) -> Result<String> {
        self.store.read(name).map_err(|e| ForecastError::ModelNotFound {
            path: self.store.locate(name),
            reason: e.to_string(),
        })
    }

    fn load_per_county(&self, requested: &str, canonical: &str) -> Result<ResolvedModel> {
        let name = match self.per_county_artifacts()?.remove(canonical) {
            Some(name) => name,
            None => return Err(self.not_found(requested)),
        };
        let json = self.read_artifact(&name)?;
        let model = SeasonalTrendModel::from_json(&json).map_err(|e| ForecastError::ModelNotFound {
            path: self.store.locate(&name),
            reason: format!("unreadable artifact: {}", e),
        })?;
        if canonical_county(model.county()) != canonical {
            return Err(ForecastError::InvalidMetadata(format!(
                "Artifact {} holds a model for '{}', not '{}'",
                name,
                model.county(),
                canonical
            )));
        }

        let metadata = ModelMetadata::per_county(&model)?;
        Ok(ResolvedModel {
            model: Arc::new(model),
            metadata: Arc::new(metadata),
        })
    }

    fn load_unified_metadata(&self) -> Result<ModelMetadata> {
        let json = self.read_artifact(UNIFIED_METADATA_FILE)?;
        ModelMetadata::from_json(&json, self.defaults)
    }

    fn load_unified(&self, requested: &str, canonical: &str) -> Result<ResolvedModel> {
        let metadata = self.load_unified_metadata()?;
        if !metadata.contains_county(canonical) {
            return Err(ForecastError::CountyNotFound {
                requested: requested.to_string(),
                available: metadata.counties().iter().cloned().collect(),
            });
        }

        let json = self.read_artifact(UNIFIED_MODEL_FILE)?;
        let model = LinearRegressor::from_json(&json).map_err(|e| ForecastError::ModelNotFound {
            path: self.store.locate(UNIFIED_MODEL_FILE),
            reason: format!("unreadable artifact: {}", e),
        })?;
        metadata_contract_matches(&model, &metadata)?;

        Ok(ResolvedModel {
            model: Arc::new(model),
            metadata: Arc::new(metadata),
        })
    }
}
