//! Station catalog loader.
//!
//! Walks the CDO `stations` endpoint for the configured dataset, upserts
//! every station into `weather.weather_stations`, then tags stations that
//! have no country code yet with their country and world region.
//!
//! Shares the quota ledger with the observation loader, so a catalog load
//! counts against the same daily limit.
//!
//! Usage:
//!   cargo run --release --bin load_stations
//!   cargo run --release --bin load_stations -- --offset 48001   # Resume a stopped load
//!   cargo run --release --bin load_stations -- --regions-only   # Skip the fetch
//!
//! Environment:
//!   DATABASE_URL - PostgreSQL connection string
//!   NOAA_TOKEN   - CDO API token

use noaa_ingest::catalog::{self, CatalogError};
use noaa_ingest::config::{self, DEFAULT_CONFIG_PATH};
use noaa_ingest::db;
use noaa_ingest::ingest::NoaaClient;
use noaa_ingest::ledger::QuotaLedger;
use noaa_ingest::logging;
use noaa_ingest::ratelimit::RateLimiter;
use noaa_ingest::regions::{self, GhcndIdGeocoder};
use noaa_ingest::store::PostgresStore;
use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    let offset: u32 = args.iter()
        .position(|a| a == "--offset")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.parse())
        .transpose()?
        .unwrap_or(1);
    let regions_only = args.contains(&"--regions-only".to_string());
    let config_path = args.iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from);

    let config = match &config_path {
        Some(path) => config::load_config(path, true)?,
        None => config::load_config(&PathBuf::from(DEFAULT_CONFIG_PATH), false)?,
    };
    logging::init_console(&config.logging, logging::run_timestamp())?;

    let mut store = PostgresStore::new(db::connect_weather()?);
    log::info!("Database connection successful");

    if !regions_only {
        let mut provider = NoaaClient::new(config::noaa_token()?, &config.provider)?;
        let ledger = QuotaLedger::new(&config.run.ledger_path);
        let mut limiter = RateLimiter::new(&config.rate_limit, ledger.load());

        let result = catalog::load_catalog(&config.provider, &mut provider, &mut limiter, &mut store, offset);
        ledger.save(limiter.long_window())?;

        match result {
            Ok(summary) => log::info!(
                "Station catalog loaded: {} stations in {} pages (provider reports {})",
                summary.stations,
                summary.pages,
                summary.total
            ),
            Err(CatalogError::Fetch { offset, source }) if !source.is_fatal() => {
                log::warn!("Resume with: load_stations --offset {}", offset);
                return Err(source.into());
            }
            Err(e) => return Err(e.into()),
        }
    }

    let summary = regions::assign_regions(&mut store, &mut GhcndIdGeocoder)?;
    log::info!(
        "Regions: {} tagged, {} without region, {} unresolved",
        summary.updated,
        summary.unknown_region,
        summary.ungeocoded
    );

    store.close()?;
    Ok(())
}
