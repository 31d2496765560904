//! Query the forecast service from the command line
//!
//! Usage:
//!   forecast <county> [periods]
//!   forecast --list
//!
//! Settings come from `CALPOWER_*` variables (a `.env` file is honoured).

use power_forecast::config::ServingConfig;
use power_forecast::response::{CountiesResponse, ErrorResponse, ForecastRequest, ForecastResponse};
use power_forecast::{ForecastError, Result};
use std::env;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn run(args: &[String]) -> Result<String> {
    let config = ServingConfig::from_env()?;
    let engine = config.engine()?;

    match args.first().map(String::as_str) {
        None | Some("--help") | Some("-h") => Err(ForecastError::InvalidParameter(
            "usage: forecast <county> [periods] | forecast --list".to_string(),
        )),
        Some("--list") => CountiesResponse::new(engine.list_counties()?).to_json(),
        Some(county) => {
            let periods = match args.get(1) {
                Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
                    ForecastError::InvalidParameter(format!("periods must be an integer, got '{}'", raw))
                })?),
                None => Some(config.default_periods as i64),
            };
            let request = ForecastRequest::new(county, periods)?;
            let result = engine.forecast(&request.county, request.periods as i64)?;
            ForecastResponse::from(&result).to_json()
        }
    }
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("power_forecast=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    match run(&args) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(kind = err.kind(), category = ?err.category(), "{}", err);
            match ErrorResponse::from(&err).to_json() {
                Ok(json) => println!("{}", json),
                Err(_) => eprintln!("{}", err),
            }
            if err.is_user_error() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
