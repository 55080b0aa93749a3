/// Core data types for the NOAA daily-observation ingest.
///
/// This module defines the shared domain model imported by all other modules.
/// It contains no I/O, only types and a few pure helpers on them.

use chrono::NaiveDate;

// ---------------------------------------------------------------------------
// Datatype codes
// ---------------------------------------------------------------------------

/// GHCND datatype codes loaded by default: min/max temperature,
/// precipitation, snowfall and snow depth.
pub const DEFAULT_DATATYPES: &[&str] = &["TMIN", "TMAX", "PRCP", "SNOW", "SNWD"];

/// Mean Earth radius used to convert kilometres to radians.
pub const KMS_PER_RADIAN: f64 = 6371.0088;

// ---------------------------------------------------------------------------
// Station (unit of work)
// ---------------------------------------------------------------------------

/// A weather station from the catalog table.
///
/// Stations are created by the catalog load (`catalog` module) and are
/// read-only to the observation ingest. `station_id` is the provider id,
/// e.g. `"GHCND:USW00094728"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub station_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Fraction of the period of record with data, in [0, 1].
    pub data_coverage: f64,
    pub min_date: NaiveDate,
    pub max_date: NaiveDate,
}

impl Station {
    /// Great-circle distance to another station in kilometres.
    pub fn distance_km(&self, other: &Station) -> f64 {
        central_angle(self.latitude, self.longitude, other.latitude, other.longitude)
            * KMS_PER_RADIAN
    }

    /// Clamps the station's period of record to a requested window.
    ///
    /// Returns `None` when the two ranges do not overlap.
    pub fn clamp_dates(&self, start: NaiveDate, end: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        let from = self.min_date.max(start);
        let to = self.max_date.min(end);
        (from <= to).then_some((from, to))
    }
}

/// Haversine central angle between two WGS84 points, in radians.
pub fn central_angle(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = phi2 - phi1;
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * a.sqrt().min(1.0).asin()
}

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// One daily value for a station and datatype.
///
/// The natural key is `(station_id, date, datatype)`; re-fetching the same
/// key overwrites `value` and `attributes` only.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub station_id: String,
    pub date: NaiveDate,
    pub datatype: String,
    pub value: Option<f64>,
    /// Provider flags, e.g. `",,W,2400"` (measurement, quality, source, time).
    pub attributes: Option<String>,
}

impl Observation {
    pub fn key(&self) -> (&str, NaiveDate, &str) {
        (&self.station_id, self.date, &self.datatype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(id: &str, lat: f64, lon: f64) -> Station {
        Station {
            station_id: id.to_string(),
            latitude: lat,
            longitude: lon,
            data_coverage: 1.0,
            min_date: NaiveDate::from_ymd_opt(1950, 1, 1).unwrap(),
            max_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        }
    }

    #[test]
    fn test_distance_zero_for_same_point() {
        let a = station("A", 41.0, -88.0);
        assert!(a.distance_km(&a) < 1e-9);
    }

    #[test]
    fn test_one_degree_latitude_is_about_111_km() {
        let a = station("A", 40.0, -89.0);
        let b = station("B", 41.0, -89.0);
        let d = a.distance_km(&b);
        assert!((d - 111.19).abs() < 0.1, "got {}", d);
    }

    #[test]
    fn test_distance_across_antimeridian() {
        let a = station("A", 0.0, 179.9);
        let b = station("B", 0.0, -179.9);
        assert!(a.distance_km(&b) < 25.0);
    }

    #[test]
    fn test_clamp_dates() {
        let s = station("A", 0.0, 0.0);
        let start = NaiveDate::from_ymd_opt(2000, 6, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();

        let (from, to) = s.clamp_dates(start, end).unwrap();
        assert_eq!(from, start);
        assert_eq!(to, s.max_date);

        let late = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert!(s.clamp_dates(late, end).is_none());
    }
}
