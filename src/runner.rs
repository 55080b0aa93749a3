/// The observation ingest run.
///
/// One run selects candidate stations from the catalog, optionally thins
/// them geographically, drops stations already loaded (unless the failure
/// log says they failed), and walks each remaining station one calendar
/// year at a time, upserting every page as it arrives.
///
/// Errors local to one year of one station (5xx after all retries, network
/// failure) are logged with the station id and the run moves on. Anything
/// else ends the run: exactly one error record is logged, the quota ledger
/// is saved, and the error is returned so the caller can release the store
/// and exit non-zero.

use chrono::NaiveDate;
use thiserror::Error;

use crate::cluster;
use crate::config::IngestConfig;
use crate::ingest::noaa::ObservationRecord;
use crate::ingest::{year_spans, FetchError, Pages, Provider, ProviderQuery};
use crate::ledger::{LedgerError, QuotaLedger};
use crate::model::{Observation, Station};
use crate::ratelimit::{Clock, RateLimiter};
use crate::resume::{pending_stations, read_failed_stations};
use crate::store::{ObservationSink, SinkError, StationStore};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Ingest stopped while fetching {station}")]
    Fetch {
        station: String,
        #[source]
        source: FetchError,
    },

    #[error("Unable to load database")]
    Store {
        station: Option<String>,
        #[source]
        source: SinkError,
    },

    #[error("Failed to save quota ledger")]
    Ledger(#[from] LedgerError),
}

/// What a run did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Stations left to load when the run started.
    pub pending: usize,
    /// Stations whose spans were all requested.
    pub stations_fetched: usize,
    /// Station-years given up on after a recoverable error.
    pub spans_failed: usize,
    pub observations_written: usize,
    pub api_calls: u32,
}

/// Runs the ingest against the given provider, limiter and store.
///
/// `today` closes the date window when the configuration leaves
/// `run.end_date` open.
pub fn run<P, C, S>(
    config: &IngestConfig,
    provider: &mut P,
    limiter: &mut RateLimiter<C>,
    store: &mut S,
    ledger: &QuotaLedger,
    today: NaiveDate,
) -> Result<RunSummary, RunError>
where
    P: Provider,
    C: Clock,
    S: ObservationSink + StationStore,
{
    let result = ingest(config, provider, limiter, store, today);

    match result {
        Ok(summary) => {
            if let Err(e) = ledger.save(limiter.long_window()) {
                log::error!("{}: {}", e, ledger.path().display());
                return Err(e.into());
            }
            Ok(summary)
        }
        Err(e) => {
            // The fatal error is already logged; a ledger failure here only warns.
            if let Err(ledger_err) = ledger.save(limiter.long_window()) {
                log::warn!("{}: {}", ledger_err, ledger.path().display());
            }
            Err(e)
        }
    }
}

fn ingest<P, C, S>(
    config: &IngestConfig,
    provider: &mut P,
    limiter: &mut RateLimiter<C>,
    store: &mut S,
    today: NaiveDate,
) -> Result<RunSummary, RunError>
where
    P: Provider,
    C: Clock,
    S: ObservationSink + StationStore,
{
    let mut catalog = store
        .candidate_stations(&config.catalog)
        .map_err(|source| store_failure(None, source))?;
    log::info!("Candidate stations: {}", catalog.len());

    let radii = config.cluster.active_radii();
    if !radii.is_empty() {
        catalog = cluster::refine(&catalog, radii);
        log::info!("Stations after clustering up to {} km: {}", radii[radii.len() - 1], catalog.len());
    }

    let loaded = store
        .loaded_station_ids()
        .map_err(|source| store_failure(None, source))?;
    let failed = if config.run.rerun_failures {
        read_failed_stations(&config.run.failure_log_path)
    } else {
        Default::default()
    };

    let pending = pending_stations(&catalog, &loaded, &failed);
    log::info!("Number of stations to load: {}", pending.len());

    let end = config.run.end_date.unwrap_or(today);
    let mut summary = RunSummary { pending: pending.len(), ..Default::default() };

    for (index, station) in pending.iter().enumerate() {
        let Some((from, to)) = station.clamp_dates(config.run.start_date, end) else {
            log::info!("Skipping {}: no data between {} and {}", station.station_id, config.run.start_date, end);
            continue;
        };

        log::info!(
            "Retrieving data for station {} ({} of {}): {} to {}",
            station.station_id,
            index + 1,
            pending.len(),
            from,
            to
        );

        fetch_station(config, provider, limiter, store, station, from, to, &mut summary)?;
        summary.stations_fetched += 1;

        if config.run.single_station {
            log::info!("Single station run complete");
            break;
        }
    }

    log::info!(
        "Run complete: {} stations, {} observations, {} API calls, {} failed station-years",
        summary.stations_fetched,
        summary.observations_written,
        summary.api_calls,
        summary.spans_failed
    );
    Ok(summary)
}

#[allow(clippy::too_many_arguments)]
fn fetch_station<P, C, S>(
    config: &IngestConfig,
    provider: &mut P,
    limiter: &mut RateLimiter<C>,
    store: &mut S,
    station: &Station,
    from: NaiveDate,
    to: NaiveDate,
    summary: &mut RunSummary,
) -> Result<(), RunError>
where
    P: Provider,
    C: Clock,
    S: ObservationSink,
{
    for span in year_spans(from, to) {
        let query = ProviderQuery::observations(&config.provider, &station.station_id, span.start, span.end);
        let mut pages: Pages<'_, ObservationRecord, P, C> =
            Pages::new(provider, limiter, &query, config.provider.max_attempts);

        let outcome = loop {
            match pages.next() {
                None => break Ok(()),
                Some(Ok(page)) => {
                    let batch: Vec<Observation> = page.records.into_iter().map(Observation::from).collect();
                    let written = store
                        .upsert_observations(&batch)
                        .map_err(|source| store_failure(Some(&station.station_id), source))?;
                    summary.observations_written += written;
                }
                Some(Err(e)) => break Err(e),
            }
        };
        summary.api_calls += pages.calls();

        if let Err(e) = outcome {
            log_fetch_error(&station.station_id, &e);
            if e.is_fatal() {
                return Err(RunError::Fetch { station: station.station_id.clone(), source: e });
            }
            summary.spans_failed += 1;
        }
    }
    Ok(())
}

fn store_failure(station: Option<&str>, source: SinkError) -> RunError {
    match station {
        Some(id) => log::error!(station = id; "Unable to load database: {}", source),
        None => log::error!("Unable to load database: {}", source),
    }
    RunError::Store { station: station.map(str::to_string), source }
}

/// Writes the failure log record for a fetch error.
fn log_fetch_error(station: &str, error: &FetchError) {
    match error {
        FetchError::RetriesExhausted { url, status, attempts } => log::error!(
            station = station,
            url = url.as_str(),
            status_code = *status,
            attempts = *attempts;
            "Exceeded retries"
        ),
        FetchError::UnexpectedStatus { url, status } => log::error!(
            station = station,
            url = url.as_str(),
            status_code = *status;
            "{}", error.summary()
        ),
        FetchError::QuotaExhausted { url, source } => {
            log::info!("{}", source);
            log::error!(station = station, url = url.as_str(); "Daily API Limit Exceeded");
        }
        FetchError::Transport { url, source } => log::error!(
            station = station,
            url = url.as_str(),
            error = source.to_string().as_str();
            "Request failed"
        ),
        FetchError::MalformedBody { url, source } => log::error!(
            station = station,
            url = url.as_str(),
            error = source.to_string().as_str();
            "Malformed response"
        ),
    }
}
