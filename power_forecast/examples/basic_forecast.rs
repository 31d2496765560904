use power_forecast::calendar::YearMonth;
use power_forecast::registry::FileModelStore;
use power_forecast::response::{CountiesResponse, ForecastResponse};
use power_forecast::training::{train_per_county_store, train_unified_store, UnifiedFitOptions};
use power_forecast::utils::synthetic_history;
use power_forecast::{ModelVariant, ServingConfig};
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Power Forecast: Basic Forecasting Example");
    println!("=========================================\n");

    // Create sample data
    println!("Creating sample history...");
    let counties = ["Alameda", "Fresno", "Santa Clara"];
    let history = synthetic_history(&counties, YearMonth::new(2022, 1)?, 35, 42)?;
    println!("Sample history created for {} counties\n", history.len());

    // Train both model variants into a scratch directory
    let model_dir = std::env::temp_dir().join("power_forecast_basic_example");
    let store = FileModelStore::new(&model_dir);
    println!("Training models into {}...", model_dir.display());

    let written = train_per_county_store(&store, &history, YearMonth::new(2022, 1)?, 0.95)?;
    let fit = train_unified_store(&store, &history, &UnifiedFitOptions::default())?;
    println!("{} per-county models and one unified model trained", written);
    if let Some(metrics) = fit.metadata.validation_metrics() {
        println!("\nUnified model validation\n{}", metrics);
    }

    // Per-county forecast: the model carries its own history
    let config = ServingConfig {
        model_dir: model_dir.clone(),
        ..ServingConfig::default()
    };
    let engine = config.engine()?;
    println!("{}", CountiesResponse::new(engine.list_counties()?).to_json()?);

    let result = engine.forecast("Santa Clara", 6)?;
    println!("\nPer-county forecast ({:?} bounds):", result.interval_method);
    println!("{}", ForecastResponse::from(&result).to_json()?);

    // Unified forecast: recent actuals come from the history provider
    let config = ServingConfig {
        model_dir,
        variant: ModelVariant::Unified,
        ..ServingConfig::default()
    };
    let engine = power_forecast::ForecastEngine::new(Arc::new(config.registry()), config.engine_config())
        .with_history(Arc::new(history));
    let result = engine.forecast("Santa_Clara", 6)?;
    println!("\nUnified forecast ({:?} bounds):", result.interval_method);
    for point in &result.forecast {
        println!(
            "  {}: {:.2} kWh ({:.2} - {:.2})",
            point.date, point.predicted_kwh, point.lower_bound, point.upper_bound
        );
    }

    println!("\nForecasting complete!");
    Ok(())
}
