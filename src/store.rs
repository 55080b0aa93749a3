/// Persistence for stations and observations in the `weather` schema.
///
/// Tables (see `sql/001_weather_schema.sql`):
///   weather.weather_stations      — station catalog, keyed by station_id
///   weather.weather_observations  — daily values, keyed by (station_id, date, datatype)
///
/// Both writes are upserts, so re-running a station or re-loading the
/// catalog never duplicates rows.

use chrono::NaiveDate;
use postgres::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::config::CatalogFilter;
use crate::ingest::noaa::StationRecord;
use crate::model::{Observation, Station};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Database error")]
    Postgres(#[from] postgres::Error),

    #[error("Value {value} for {station_id} {date} {datatype} does not fit NUMERIC")]
    UnrepresentableValue {
        station_id: String,
        date: NaiveDate,
        datatype: String,
        value: f64,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Idempotent writer for observation batches.
pub trait ObservationSink {
    /// Inserts or updates every observation in `batch` atomically.
    ///
    /// Conflicts on `(station_id, date, datatype)` overwrite `value` and
    /// `attributes`. Returns the number of rows written.
    fn upsert_observations(&mut self, batch: &[Observation]) -> Result<usize, SinkError>;
}

/// Station catalog queries and maintenance.
pub trait StationStore {
    /// Stations matching the catalog filter, ordered by station id.
    fn candidate_stations(&mut self, filter: &CatalogFilter) -> Result<Vec<Station>, SinkError>;

    /// Stations with at least one stored observation.
    fn loaded_station_ids(&mut self) -> Result<BTreeSet<String>, SinkError>;

    /// Inserts or refreshes catalog rows; country and region are kept.
    fn upsert_stations(&mut self, batch: &[StationRecord]) -> Result<usize, SinkError>;

    /// Stations whose country code has not been assigned yet.
    fn stations_without_country(&mut self) -> Result<Vec<Station>, SinkError>;

    fn set_station_region(
        &mut self,
        station_id: &str,
        country_code: &str,
        region: Option<&str>,
    ) -> Result<(), SinkError>;
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

pub struct PostgresStore {
    client: Client,
}

impl PostgresStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Closes the connection, reporting any error from the server.
    pub fn close(self) -> Result<(), SinkError> {
        self.client.close()?;
        Ok(())
    }
}

fn to_numeric(obs: &Observation) -> Result<Option<Decimal>, SinkError> {
    match obs.value {
        None => Ok(None),
        Some(v) => Decimal::from_f64(v).map(Some).ok_or_else(|| SinkError::UnrepresentableValue {
            station_id: obs.station_id.clone(),
            date: obs.date,
            datatype: obs.datatype.clone(),
            value: v,
        }),
    }
}

fn station_from_row(row: &postgres::Row) -> Station {
    Station {
        station_id: row.get(0),
        latitude: row.get(1),
        longitude: row.get(2),
        data_coverage: row.get(3),
        min_date: row.get(4),
        max_date: row.get(5),
    }
}

impl ObservationSink for PostgresStore {
    fn upsert_observations(&mut self, batch: &[Observation]) -> Result<usize, SinkError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut transaction = self.client.transaction()?;
        let stmt = transaction.prepare(
            "INSERT INTO weather.weather_observations \
             (station_id, date, datatype, value, attributes) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (station_id, date, datatype) \
             DO UPDATE SET value = EXCLUDED.value, attributes = EXCLUDED.attributes",
        )?;

        let mut written = 0;
        for obs in batch {
            let value = to_numeric(obs)?;
            written += transaction.execute(
                &stmt,
                &[&obs.station_id, &obs.date, &obs.datatype, &value, &obs.attributes],
            )?;
        }

        transaction.commit()?;
        Ok(written as usize)
    }
}

impl StationStore for PostgresStore {
    fn candidate_stations(&mut self, filter: &CatalogFilter) -> Result<Vec<Station>, SinkError> {
        let rows = self.client.query(
            "SELECT station_id, latitude, longitude, data_coverage, min_date, max_date \
             FROM weather.weather_stations \
             WHERE country_code = $1 AND max_date >= $2 AND min_date <= $3 AND data_coverage >= $4 \
             ORDER BY station_id",
            &[&filter.country_code, &filter.active_since, &filter.starts_before, &filter.min_coverage],
        )?;
        Ok(rows.iter().map(station_from_row).collect())
    }

    fn loaded_station_ids(&mut self) -> Result<BTreeSet<String>, SinkError> {
        let rows = self
            .client
            .query("SELECT DISTINCT station_id FROM weather.weather_observations", &[])?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    fn upsert_stations(&mut self, batch: &[StationRecord]) -> Result<usize, SinkError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut transaction = self.client.transaction()?;
        let stmt = transaction.prepare(
            "INSERT INTO weather.weather_stations \
             (station_id, name, latitude, longitude, elevation, elevation_unit, \
              min_date, max_date, data_coverage) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (station_id) DO UPDATE SET \
               name = EXCLUDED.name, latitude = EXCLUDED.latitude, longitude = EXCLUDED.longitude, \
               elevation = EXCLUDED.elevation, elevation_unit = EXCLUDED.elevation_unit, \
               min_date = EXCLUDED.min_date, max_date = EXCLUDED.max_date, \
               data_coverage = EXCLUDED.data_coverage",
        )?;

        let mut written = 0;
        for s in batch {
            written += transaction.execute(
                &stmt,
                &[
                    &s.id,
                    &s.name,
                    &s.latitude,
                    &s.longitude,
                    &s.elevation,
                    &s.elevation_unit,
                    &s.mindate,
                    &s.maxdate,
                    &s.datacoverage,
                ],
            )?;
        }

        transaction.commit()?;
        Ok(written as usize)
    }

    fn stations_without_country(&mut self) -> Result<Vec<Station>, SinkError> {
        let rows = self.client.query(
            "SELECT station_id, latitude, longitude, data_coverage, min_date, max_date \
             FROM weather.weather_stations WHERE country_code IS NULL ORDER BY station_id",
            &[],
        )?;
        Ok(rows.iter().map(station_from_row).collect())
    }

    fn set_station_region(
        &mut self,
        station_id: &str,
        country_code: &str,
        region: Option<&str>,
    ) -> Result<(), SinkError> {
        self.client.execute(
            "UPDATE weather.weather_stations SET country_code = $1, region = $2 WHERE station_id = $3",
            &[&country_code, &region, &station_id],
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// A catalog row as the in-memory store keeps it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredStation {
    pub station: Station,
    pub name: String,
    pub country_code: Option<String>,
    pub region: Option<String>,
}

/// Store with the same upsert semantics as [`PostgresStore`], held in
/// memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    stations: BTreeMap<String, StoredStation>,
    observations: BTreeMap<(String, NaiveDate, String), (Option<f64>, Option<String>)>,
    upserts: usize,
    fail_writes: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_station(&mut self, station: Station, country_code: Option<&str>) {
        let stored = StoredStation {
            name: station.station_id.clone(),
            country_code: country_code.map(str::to_string),
            region: None,
            station,
        };
        self.stations.insert(stored.station.station_id.clone(), stored);
    }

    /// Makes every later write fail with [`SinkError::Unavailable`].
    pub fn fail_writes(&mut self, reason: &str) {
        self.fail_writes = Some(reason.to_string());
    }

    pub fn station(&self, station_id: &str) -> Option<&StoredStation> {
        self.stations.get(station_id)
    }

    pub fn observation(&self, station_id: &str, date: NaiveDate, datatype: &str) -> Option<(Option<f64>, Option<&str>)> {
        self.observations
            .get(&(station_id.to_string(), date, datatype.to_string()))
            .map(|(value, attributes)| (*value, attributes.as_deref()))
    }

    pub fn observation_count(&self) -> usize {
        self.observations.len()
    }

    /// Number of successful upsert calls, batches of any size.
    pub fn upsert_calls(&self) -> usize {
        self.upserts
    }

    fn check_writable(&self) -> Result<(), SinkError> {
        match &self.fail_writes {
            Some(reason) => Err(SinkError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

impl ObservationSink for MemoryStore {
    fn upsert_observations(&mut self, batch: &[Observation]) -> Result<usize, SinkError> {
        self.check_writable()?;
        for obs in batch {
            to_numeric(obs)?;
        }
        for obs in batch {
            self.observations.insert(
                (obs.station_id.clone(), obs.date, obs.datatype.clone()),
                (obs.value, obs.attributes.clone()),
            );
        }
        self.upserts += 1;
        Ok(batch.len())
    }
}

impl StationStore for MemoryStore {
    fn candidate_stations(&mut self, filter: &CatalogFilter) -> Result<Vec<Station>, SinkError> {
        Ok(self
            .stations
            .values()
            .filter(|s| s.country_code.as_deref() == Some(filter.country_code.as_str()))
            .filter(|s| s.station.max_date >= filter.active_since)
            .filter(|s| s.station.min_date <= filter.starts_before)
            .filter(|s| s.station.data_coverage >= filter.min_coverage)
            .map(|s| s.station.clone())
            .collect())
    }

    fn loaded_station_ids(&mut self) -> Result<BTreeSet<String>, SinkError> {
        Ok(self.observations.keys().map(|(id, _, _)| id.clone()).collect())
    }

    fn upsert_stations(&mut self, batch: &[StationRecord]) -> Result<usize, SinkError> {
        self.check_writable()?;
        for record in batch {
            let station = Station {
                station_id: record.id.clone(),
                latitude: record.latitude,
                longitude: record.longitude,
                data_coverage: record.datacoverage,
                min_date: record.mindate,
                max_date: record.maxdate,
            };
            let entry = self.stations.entry(record.id.clone()).or_insert_with(|| StoredStation {
                station: station.clone(),
                name: record.name.clone(),
                country_code: None,
                region: None,
            });
            entry.station = station;
            entry.name = record.name.clone();
        }
        self.upserts += 1;
        Ok(batch.len())
    }

    fn stations_without_country(&mut self) -> Result<Vec<Station>, SinkError> {
        Ok(self
            .stations
            .values()
            .filter(|s| s.country_code.is_none())
            .map(|s| s.station.clone())
            .collect())
    }

    fn set_station_region(
        &mut self,
        station_id: &str,
        country_code: &str,
        region: Option<&str>,
    ) -> Result<(), SinkError> {
        self.check_writable()?;
        if let Some(stored) = self.stations.get_mut(station_id) {
            stored.country_code = Some(country_code.to_string());
            stored.region = region.map(str::to_string);
        }
        Ok(())
    }
}
