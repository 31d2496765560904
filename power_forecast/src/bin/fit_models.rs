//! Build reference model artifacts from a normalized consumption CSV
//!
//! Usage:
//!   fit_models <normalized.csv> [per_county|unified|all]
//!
//! Artifacts are written to `CALPOWER_MODEL_DIR` (default `models`).

use power_forecast::config::ServingConfig;
use power_forecast::data::DataLoader;
use power_forecast::registry::FileModelStore;
use power_forecast::training::{train_per_county_store, train_unified_store, UnifiedFitOptions};
use power_forecast::{ForecastError, Result};
use std::env;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn run(args: &[String]) -> Result<()> {
    let csv = args.first().ok_or_else(|| {
        ForecastError::InvalidParameter(
            "usage: fit_models <normalized.csv> [per_county|unified|all]".to_string(),
        )
    })?;
    let which = args.get(1).map(String::as_str).unwrap_or("all");
    let (per_county, unified) = match which {
        "per_county" => (true, false),
        "unified" => (false, true),
        "all" => (true, true),
        other => {
            return Err(ForecastError::InvalidParameter(format!(
                "Unknown model set '{}'",
                other
            )))
        }
    };

    let config = ServingConfig::from_env()?;
    let history = DataLoader::history_from_csv(csv)?;
    let store = FileModelStore::new(&config.model_dir);
    info!(counties = history.len(), dir = %config.model_dir.display(), "Training");

    if per_county {
        let written =
            train_per_county_store(&store, &history, config.trend_origin, config.confidence_level)?;
        info!(models = written, "Per-county models written");
    }
    if unified {
        let options = UnifiedFitOptions {
            trend_origin: config.trend_origin,
            confidence_level: config.confidence_level,
            ..UnifiedFitOptions::default()
        };
        let fit = train_unified_store(&store, &history, &options)?;
        if let Some(metrics) = fit.metadata.validation_metrics() {
            println!("Unified model validation\n{}", metrics);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("power_forecast=info")),
        )
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(kind = err.kind(), "{}", err);
            ExitCode::FAILURE
        }
    }
}
