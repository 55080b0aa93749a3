/// Resumability: deciding which stations still need fetching.
///
/// Two sources of truth survive a run: the observations table (stations
/// with any stored rows count as loaded) and the failure log (stations with
/// an ERROR record were only partially loaded). The pending set is
///
///   catalog − loaded ∪ (loaded ∩ failed)
///
/// in catalog order. A partially loaded station is fetched again in full;
/// the store's upsert makes that safe.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use crate::logging::FailureRecord;
use crate::model::Station;

/// Character range of the station id inside request URLs written by the
/// first version of the loader, which logged no `station` field.
const LEGACY_STATION_SLICE: std::ops::Range<usize> = 108..125;

/// Station ids with at least one ERROR record in the failure log.
///
/// A missing or unreadable file gives an empty set. Lines that are not
/// valid records are skipped with a warning.
pub fn read_failed_stations(path: &Path) -> BTreeSet<String> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return BTreeSet::new(),
        Err(e) => {
            log::warn!("Could not read failure log {}: {}", path.display(), e);
            return BTreeSet::new();
        }
    };

    let mut seen = BTreeSet::new();
    let mut failed = BTreeSet::new();

    for (number, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: FailureRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Skipping failure log line {}: {}", number + 1, e);
                continue;
            }
        };

        // Identical records (same run, same failure) count once.
        if !seen.insert(line.trim().to_string()) {
            continue;
        }

        if record.level != "ERROR" {
            continue;
        }
        if let Some(station) = station_of(&record) {
            failed.insert(station);
        }
    }

    failed
}

/// Station a failure record refers to.
///
/// Prefers the structured `station` field, then the `stationid` query
/// parameter of `url`, then the legacy fixed slice of `url`.
pub fn station_of(record: &FailureRecord) -> Option<String> {
    if let Some(station) = record.context_str("station").filter(|s| !s.is_empty()) {
        return Some(station.to_string());
    }

    let url = record.context_str("url")?;
    station_from_url(url).or_else(|| url.get(LEGACY_STATION_SLICE).map(str::to_string))
}

/// Decoded `stationid` query parameter of a request URL.
pub fn station_from_url(url: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == "stationid")
        .and_then(|(_, value)| urlencoding::decode(value).ok())
        .map(|value| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Stations to fetch this run, in catalog order.
pub fn pending_stations<'a>(
    catalog: &'a [Station],
    loaded: &BTreeSet<String>,
    failed: &BTreeSet<String>,
) -> Vec<&'a Station> {
    catalog
        .iter()
        .filter(|s| !loaded.contains(&s.station_id) || failed.contains(&s.station_id))
        .collect()
}
