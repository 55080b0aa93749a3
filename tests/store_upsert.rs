/// Integration tests for the PostgreSQL store
///
/// These tests verify:
/// 1. Observation upserts are idempotent and overwrite value/attributes
/// 2. NUMERIC values round-trip through rust_decimal
/// 3. Station upserts keep country and region
/// 4. Candidate selection applies the catalog filter
///
/// Prerequisites:
/// - PostgreSQL running, DATABASE_URL set in .env
/// - sql/001_weather_schema.sql applied
///
/// Each test writes rows under its own `TEST:` station ids and removes them
/// afterwards.
///
/// Run with: cargo test --test store_upsert -- --ignored --test-threads=1

use noaa_ingest::config::CatalogFilter;
use noaa_ingest::db::connect_weather;
use noaa_ingest::ingest::noaa::StationRecord;
use noaa_ingest::model::Observation;
use noaa_ingest::store::{ObservationSink, PostgresStore, StationStore};

use chrono::NaiveDate;
use postgres::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn cleanup(client: &mut Client, prefix: &str) {
    let pattern = format!("{}%", prefix);
    client
        .execute("DELETE FROM weather.weather_observations WHERE station_id LIKE $1", &[&pattern])
        .unwrap();
    client
        .execute("DELETE FROM weather.weather_stations WHERE station_id LIKE $1", &[&pattern])
        .unwrap();
}

fn station_record(id: &str, min: &str, max: &str, coverage: f64) -> StationRecord {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "name": format!("TEST STATION {}", id),
        "latitude": 40.69,
        "longitude": -89.58,
        "elevation": 201.2,
        "elevationUnit": "METERS",
        "mindate": min,
        "maxdate": max,
        "datacoverage": coverage,
    }))
    .unwrap()
}

fn observation(station: &str, date: NaiveDate, datatype: &str, value: f64, attrs: &str) -> Observation {
    Observation {
        station_id: station.to_string(),
        date,
        datatype: datatype.to_string(),
        value: Some(value),
        attributes: Some(attrs.to_string()),
    }
}

#[test]
#[ignore]
fn test_observation_upsert_is_idempotent() {
    let prefix = "TEST:OBS";
    let mut store = PostgresStore::new(connect_weather().expect("database"));
    let mut check = connect_weather().expect("database");
    cleanup(&mut check, prefix);

    let id = "TEST:OBS00001";
    store.upsert_stations(&[station_record(id, "1940-01-01", "2025-06-01", 0.99)]).unwrap();

    let batch = vec![
        observation(id, d(2021, 1, 1), "PRCP", 0.12, ",,W,2400"),
        observation(id, d(2021, 1, 1), "TMAX", 41.0, ",,W,2400"),
    ];
    store.upsert_observations(&batch).unwrap();
    store.upsert_observations(&batch).unwrap();
    store.upsert_observations(&[observation(id, d(2021, 1, 1), "PRCP", 0.25, "T,,W,2400")]).unwrap();

    let rows = check
        .query(
            "SELECT datatype, value, attributes FROM weather.weather_observations \
             WHERE station_id = $1 ORDER BY datatype",
            &[&id],
        )
        .unwrap();
    assert_eq!(rows.len(), 2);

    let prcp: Option<Decimal> = rows[0].get(1);
    let attrs: Option<String> = rows[0].get(2);
    assert_eq!(prcp.and_then(|v| v.to_f64()), Some(0.25));
    assert_eq!(attrs.as_deref(), Some("T,,W,2400"));

    assert!(store.loaded_station_ids().unwrap().contains(id));

    cleanup(&mut check, prefix);
    store.close().unwrap();
}

#[test]
#[ignore]
fn test_station_upsert_and_candidate_filter() {
    let prefix = "TEST:CAT";
    let mut store = PostgresStore::new(connect_weather().expect("database"));
    let mut check = connect_weather().expect("database");
    cleanup(&mut check, prefix);

    store.upsert_stations(&[
        station_record("TEST:CAT00001", "1940-01-01", "2025-06-01", 0.99),
        station_record("TEST:CAT00002", "1990-01-01", "2025-06-01", 0.99),
        station_record("TEST:CAT00003", "1940-01-01", "2025-06-01", 0.50),
    ]).unwrap();

    let untagged: Vec<String> = store
        .stations_without_country()
        .unwrap()
        .into_iter()
        .map(|s| s.station_id)
        .filter(|id| id.starts_with(prefix))
        .collect();
    assert_eq!(untagged.len(), 3);

    for id in ["TEST:CAT00001", "TEST:CAT00002", "TEST:CAT00003"] {
        store.set_station_region(id, "ZT", Some("test_region")).unwrap();
    }

    // Reloading the catalog keeps the assigned country and region.
    store.upsert_stations(&[station_record("TEST:CAT00001", "1940-01-01", "2025-07-01", 0.99)]).unwrap();
    let row = check
        .query_one(
            "SELECT country_code, region, max_date FROM weather.weather_stations WHERE station_id = $1",
            &[&"TEST:CAT00001"],
        )
        .unwrap();
    assert_eq!(row.get::<_, Option<String>>(0).as_deref(), Some("ZT"));
    assert_eq!(row.get::<_, Option<String>>(1).as_deref(), Some("test_region"));
    assert_eq!(row.get::<_, NaiveDate>(2), d(2025, 7, 1));

    let filter = CatalogFilter { country_code: "ZT".into(), ..CatalogFilter::default() };
    let ids: Vec<String> = store
        .candidate_stations(&filter)
        .unwrap()
        .into_iter()
        .map(|s| s.station_id)
        .collect();
    assert_eq!(ids, vec!["TEST:CAT00001"]);

    cleanup(&mut check, prefix);
    store.close().unwrap();
}
