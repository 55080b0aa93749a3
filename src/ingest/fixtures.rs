/// Test fixtures: representative JSON payloads from the NOAA CDO v2 API.
///
/// Structurally complete but truncated to the minimum needed to exercise the
/// parsers and the page walker.
///
/// CDO response shape:
///   metadata.resultset.offset — 1-based offset echoed back
///   metadata.resultset.count  — rows in the full result set (all pages)
///   metadata.resultset.limit  — page size echoed back
///   results[]                 — rows for this page
///
/// A query that matches nothing answers `{}` with status 200.

use serde_json::json;

/// Three observations for Central Park, one without a value.
pub(crate) fn fixture_observation_page_json() -> &'static str {
    r#"{
      "metadata": { "resultset": { "offset": 1, "count": 3, "limit": 1000 } },
      "results": [
        { "date": "2021-01-01T00:00:00", "datatype": "PRCP", "station": "GHCND:USW00094728",
          "attributes": ",,W,2400", "value": 0.12 },
        { "date": "2021-01-01T00:00:00", "datatype": "TMAX", "station": "GHCND:USW00094728",
          "attributes": ",,W,2400", "value": 41 },
        { "date": "2021-01-02T00:00:00", "datatype": "SNWD", "station": "GHCND:USW00094728",
          "attributes": ",,W," }
      ]
    }"#
}

/// Two catalog rows, the second without elevation.
pub(crate) fn fixture_station_page_json() -> &'static str {
    r#"{
      "metadata": { "resultset": { "offset": 1, "count": 2, "limit": 1000 } },
      "results": [
        { "elevation": 42.7, "mindate": "1869-01-01", "maxdate": "2025-05-20",
          "latitude": 40.77898, "name": "NY CITY CENTRAL PARK, NY US", "datacoverage": 1,
          "id": "GHCND:USW00094728", "elevationUnit": "METERS", "longitude": -73.96925 },
        { "mindate": "1950-01-01", "maxdate": "2025-05-19",
          "latitude": 40.6386, "name": "JFK INTERNATIONAL AIRPORT, NY US", "datacoverage": 0.98,
          "id": "GHCND:USW00094789", "longitude": -73.7622 }
      ]
    }"#
}

/// A page of `n` synthetic TMAX rows out of a `total`-row result set.
pub(crate) fn observation_page(station: &str, offset: u32, total: u64, n: usize) -> String {
    let results: Vec<_> = (0..n)
        .map(|i| {
            json!({
                "date": format!("2021-01-01T00:00:{:02}", i % 60),
                "datatype": format!("T{}", offset as usize + i),
                "station": station,
                "attributes": ",,W,",
                "value": i as f64,
            })
        })
        .collect();

    json!({
        "metadata": { "resultset": { "offset": offset, "count": total, "limit": 1000 } },
        "results": results,
    })
    .to_string()
}
