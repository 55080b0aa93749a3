//! NOAA daily observation loader.
//!
//! Fetches GHCN-Daily observations for every candidate station in
//! `weather.weather_stations` and upserts them into
//! `weather.weather_observations`, staying inside the CDO API's per-second
//! and daily quotas. Safe to re-run: loaded stations are skipped, and with
//! `--rerun-failures` stations with errors in the failure log are fetched
//! again.
//!
//! Usage:
//!   cargo run --release                            # Load all pending stations
//!   cargo run --release -- --single-station        # Load one station and stop
//!   cargo run --release -- --rerun-failures        # Also retry failed stations
//!   cargo run --release -- --config other.toml     # Alternate configuration
//!
//! Environment:
//!   DATABASE_URL - PostgreSQL connection string
//!   NOAA_TOKEN   - CDO API token

use chrono::Local;
use noaa_ingest::config::{self, DEFAULT_CONFIG_PATH};
use noaa_ingest::db;
use noaa_ingest::ingest::NoaaClient;
use noaa_ingest::ledger::QuotaLedger;
use noaa_ingest::logging;
use noaa_ingest::ratelimit::RateLimiter;
use noaa_ingest::runner;
use noaa_ingest::store::PostgresStore;
use std::env;
use std::path::PathBuf;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();
    let mut config_path = PathBuf::from(DEFAULT_CONFIG_PATH);
    let mut explicit_config = false;
    let mut single_station = false;
    let mut rerun_failures = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if i + 1 < args.len() {
                    config_path = PathBuf::from(&args[i + 1]);
                    explicit_config = true;
                    i += 2;
                } else {
                    eprintln!("Error: --config requires a path");
                    process::exit(1);
                }
            }
            "--single-station" => {
                single_station = true;
                i += 1;
            }
            "--rerun-failures" => {
                rerun_failures = true;
                i += 1;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                eprintln!("Usage: {} [--config PATH] [--single-station] [--rerun-failures]", args[0]);
                process::exit(1);
            }
        }
    }

    let mut config = match config::load_config(&config_path, explicit_config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            if let Some(source) = std::error::Error::source(&e) {
                eprintln!("  {}", source);
            }
            process::exit(1);
        }
    };
    config.run.single_station |= single_station;
    config.run.rerun_failures |= rerun_failures;

    let run_started = logging::run_timestamp();
    if let Err(e) = logging::init(&config.logging, &config.run.failure_log_path, run_started) {
        eprintln!("Logging setup failed: {}", e);
        process::exit(1);
    }

    let token = match config::noaa_token() {
        Ok(token) => token,
        Err(e) => {
            log::error!("{}", e);
            process::exit(1);
        }
    };

    let mut provider = match NoaaClient::new(token, &config.provider) {
        Ok(client) => client,
        Err(e) => {
            log::error!("Failed to build HTTP client: {}", e);
            process::exit(1);
        }
    };

    let client = match db::connect_weather() {
        Ok(client) => client,
        Err(e) => {
            log::error!("{}", e);
            process::exit(1);
        }
    };
    log::info!("Database connection successful");
    let mut store = PostgresStore::new(client);

    let ledger = QuotaLedger::new(&config.run.ledger_path);
    let mut limiter = RateLimiter::new(&config.rate_limit, ledger.load());
    log::info!("Daily API calls remaining: {}", limiter.remaining_daily());

    let today = Local::now().date_naive();
    let result = runner::run(&config, &mut provider, &mut limiter, &mut store, &ledger, today);

    if let Err(e) = store.close() {
        log::warn!("Error closing database connection: {}", e);
    }

    match result {
        Ok(summary) => {
            log::info!(
                "Loaded {} observations from {} stations ({} station-years failed)",
                summary.observations_written,
                summary.stations_fetched,
                summary.spans_failed
            );
        }
        Err(e) => {
            eprintln!("Ingest stopped: {}", e);
            log::logger().flush();
            process::exit(1);
        }
    }
}
