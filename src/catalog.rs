/// Station catalog load: walks the provider's `stations` endpoint and
/// upserts every page into `weather.weather_stations`.
///
/// Uses the same page walker, rate limiter and retry policy as the
/// observation ingest. Any fetch error ends the load; pages already
/// written stay written, and the error carries the offset to resume from.

use thiserror::Error;

use crate::config::ProviderConfig;
use crate::ingest::noaa::StationRecord;
use crate::ingest::{FetchError, Pages, Provider, ProviderQuery};
use crate::ratelimit::{Clock, RateLimiter};
use crate::store::{SinkError, StationStore};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Station catalog fetch stopped at offset {offset}")]
    Fetch {
        offset: u32,
        #[source]
        source: FetchError,
    },

    #[error("Failed to store station catalog page at offset {offset}")]
    Store {
        offset: u32,
        #[source]
        source: SinkError,
    },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CatalogSummary {
    pub pages: usize,
    pub stations: usize,
    /// Size of the provider's catalog as last reported.
    pub total: u64,
}

/// Loads the station catalog starting at the 1-based `offset`.
pub fn load_catalog<P, C, S>(
    provider_config: &ProviderConfig,
    provider: &mut P,
    limiter: &mut RateLimiter<C>,
    store: &mut S,
    offset: u32,
) -> Result<CatalogSummary, CatalogError>
where
    P: Provider,
    C: Clock,
    S: StationStore,
{
    let query = ProviderQuery::stations(provider_config);
    let mut pages: Pages<'_, StationRecord, P, C> =
        Pages::starting_at(provider, limiter, &query, provider_config.max_attempts, offset);
    let mut summary = CatalogSummary::default();

    loop {
        let requested = pages.next_offset();
        let page = match pages.next() {
            None => break,
            Some(Ok(page)) => page,
            Some(Err(source)) => {
                log::error!(
                    url = source.url(),
                    offset = requested;
                    "{}", source.summary()
                );
                return Err(CatalogError::Fetch { offset: requested, source });
            }
        };

        let written = store
            .upsert_stations(&page.records)
            .map_err(|source| CatalogError::Store { offset: page.offset, source })?;

        summary.pages += 1;
        summary.stations += written;
        summary.total = page.total;
        log::info!(
            "Stations {}..{} of {} stored",
            page.offset,
            u64::from(page.offset) + page.records.len() as u64 - 1,
            page.total
        );
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::ingest::{ProviderResponse, TransportError};
    use crate::ratelimit::ManualClock;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<ProviderResponse>);

    impl Provider for Scripted {
        fn get(&mut self, _url: &str) -> Result<ProviderResponse, TransportError> {
            self.0.pop_front().ok_or_else(|| TransportError::Other("script exhausted".into()))
        }
    }

    fn station_page(first: usize, count: usize, total: usize) -> ProviderResponse {
        let results: Vec<_> = (first..first + count)
            .map(|i| {
                json!({
                    "id": format!("GHCND:US{:09}", i),
                    "name": format!("STATION {}", i),
                    "latitude": 40.0, "longitude": -90.0,
                    "mindate": "1900-01-01", "maxdate": "2025-05-20",
                    "datacoverage": 0.99,
                })
            })
            .collect();
        let body = json!({
            "metadata": { "resultset": { "offset": first, "count": total, "limit": 1000 } },
            "results": results,
        });
        ProviderResponse::new(200, body.to_string())
    }

    fn limiter() -> RateLimiter<ManualClock> {
        RateLimiter::with_clock(&RateLimitConfig::default(), Vec::new(), ManualClock::starting_at(0.0))
    }

    #[test]
    fn test_loads_every_page() {
        let mut provider = Scripted(vec![station_page(1, 1000, 1200), station_page(1001, 200, 1200)].into());
        let mut store = MemoryStore::new();

        let summary =
            load_catalog(&ProviderConfig::default(), &mut provider, &mut limiter(), &mut store, 1).unwrap();

        assert_eq!(summary, CatalogSummary { pages: 2, stations: 1200, total: 1200 });
        assert!(store.station("GHCND:US000001200").is_some());
        assert_eq!(store.stations_without_country().unwrap().len(), 1200);
    }

    #[test]
    fn test_fetch_error_reports_resume_offset() {
        let mut provider = Scripted(
            vec![
                station_page(1, 1000, 3000),
                ProviderResponse::new(503, ""),
                ProviderResponse::new(503, ""),
                ProviderResponse::new(503, ""),
                ProviderResponse::new(503, ""),
            ]
            .into(),
        );
        let mut store = MemoryStore::new();

        let err = load_catalog(&ProviderConfig::default(), &mut provider, &mut limiter(), &mut store, 1)
            .unwrap_err();

        match err {
            CatalogError::Fetch { offset, source } => {
                assert_eq!(offset, 1001);
                assert!(matches!(source, FetchError::RetriesExhausted { attempts: 4, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(store.station("GHCND:US000001000").is_some());
    }

    #[test]
    fn test_store_failure_stops_load() {
        let mut provider = Scripted(vec![station_page(1, 10, 10)].into());
        let mut store = MemoryStore::new();
        store.fail_writes("read-only");

        let err = load_catalog(&ProviderConfig::default(), &mut provider, &mut limiter(), &mut store, 1)
            .unwrap_err();
        assert!(matches!(err, CatalogError::Store { offset: 1, .. }));
    }
}
