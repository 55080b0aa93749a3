/// End-to-end test of the failure log
///
/// Installs the process-wide logger, so this file holds a single test.
///
/// Verifies:
/// 1. A page that keeps answering 503 is requested exactly `max_attempts` times
/// 2. Retry exhaustion writes exactly one ERROR record carrying the station,
///    URL, status code and attempt count
/// 3. Nothing reaches the store for that station-year
/// 4. The record is what a rerun uses to pick the station up again
///
/// Run with: cargo test --test failure_logging

use noaa_ingest::config::{IngestConfig, LoggingConfig};
use noaa_ingest::ingest::{Provider, ProviderResponse, TransportError};
use noaa_ingest::ledger::QuotaLedger;
use noaa_ingest::logging::{self, FailureRecord};
use noaa_ingest::model::Station;
use noaa_ingest::ratelimit::{Clock, RateLimiter};
use noaa_ingest::resume::read_failed_stations;
use noaa_ingest::runner;
use noaa_ingest::store::MemoryStore;

use chrono::NaiveDate;
use std::cell::Cell;
use std::fs;

struct InstantClock(Cell<f64>);

impl Clock for InstantClock {
    fn now(&self) -> f64 {
        self.0.get()
    }

    fn sleep(&self, secs: f64) {
        self.0.set(self.0.get() + secs);
    }
}

struct AlwaysUnavailable {
    calls: usize,
}

impl Provider for AlwaysUnavailable {
    fn get(&mut self, _url: &str) -> Result<ProviderResponse, TransportError> {
        self.calls += 1;
        Ok(ProviderResponse::new(503, "<html>Service Unavailable</html>"))
    }
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

#[test]
fn test_retry_exhaustion_logs_one_error_and_enables_rerun() {
    let dir = tempfile::tempdir().unwrap();
    let station_id = "GHCND:USC00116610";

    let mut config = IngestConfig::default();
    config.run.start_date = d(2021, 1, 1);
    config.run.end_date = Some(d(2021, 12, 31));
    config.run.ledger_path = dir.path().join("api_calls.json");
    config.run.failure_log_path = dir.path().join("populate_weather_log.json");
    config.logging = LoggingConfig {
        console_level: log::LevelFilter::Off,
        file_level: log::LevelFilter::Warn,
    };

    logging::init(&config.logging, &config.run.failure_log_path, 1747144931.5).unwrap();

    let mut store = MemoryStore::new();
    store.add_station(
        Station {
            station_id: station_id.to_string(),
            latitude: 40.69,
            longitude: -89.58,
            data_coverage: 0.98,
            min_date: d(1900, 1, 1),
            max_date: d(2025, 6, 1),
        },
        Some("US"),
    );

    let mut provider = AlwaysUnavailable { calls: 0 };
    let mut limiter = RateLimiter::with_clock(&config.rate_limit, Vec::new(), InstantClock(Cell::new(0.0)));
    let ledger = QuotaLedger::new(&config.run.ledger_path);

    let summary = runner::run(&config, &mut provider, &mut limiter, &mut store, &ledger, d(2030, 1, 1)).unwrap();
    log::logger().flush();

    assert_eq!(provider.calls, 4);
    assert_eq!(summary.spans_failed, 1);
    assert_eq!(store.observation_count(), 0);
    assert_eq!(store.upsert_calls(), 0);

    let records: Vec<FailureRecord> = fs::read_to_string(&config.run.failure_log_path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let errors: Vec<&FailureRecord> = records.iter().filter(|r| r.level == "ERROR").collect();

    assert_eq!(errors.len(), 1);
    let error = errors[0];
    assert_eq!(error.message, "Exceeded retries");
    assert_eq!(error.context_str("station"), Some(station_id));
    assert_eq!(error.context["status_code"], serde_json::json!(503));
    assert_eq!(error.context["attempts"], serde_json::json!(4));
    assert_eq!(error.context["script_run_datetime"], serde_json::json!(1747144931.5));
    assert!(error.context_str("url").unwrap().contains("stationid=GHCND%3AUSC00116610"));
    assert!(error.line.is_some());

    let failed = read_failed_stations(&config.run.failure_log_path);
    assert_eq!(failed.into_iter().collect::<Vec<_>>(), vec![station_id.to_string()]);
}
