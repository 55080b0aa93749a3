/// NOAA Climate Data Online (CDO) v2 API client.
///
/// Handles URL construction and JSON page parsing for the two endpoints
/// this crate walks:
///   https://www.ncdc.noaa.gov/cdo-web/api/v2/data
///   https://www.ncdc.noaa.gov/cdo-web/api/v2/stations
///
/// Both return the same envelope. See `fixtures.rs` for annotated examples.
///
/// ```text
/// { "metadata": { "resultset": { "offset": 1, "count": 2500, "limit": 1000 } },
///   "results": [ ... ] }
/// ```
///
/// A query with no matching rows returns `{}` with status 200.

use chrono::{NaiveDate, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use super::{Provider, ProviderResponse, TransportError};
use crate::config::ProviderConfig;
use crate::model::Observation;

// ---------------------------------------------------------------------------
// Serde structures
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct Envelope<T> {
    metadata: Option<Metadata>,
    results: Option<Vec<T>>,
}

#[derive(Deserialize)]
struct Metadata {
    resultset: ResultSet,
}

#[derive(Deserialize)]
struct ResultSet {
    count: u64,
}

/// One row of the `data` endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ObservationRecord {
    pub station: String,
    pub date: NaiveDateTime,  // "2020-06-15T00:00:00", no offset
    pub datatype: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub attributes: Option<String>,
}

impl From<ObservationRecord> for Observation {
    fn from(record: ObservationRecord) -> Self {
        Observation {
            station_id: record.station,
            date: record.date.date(),
            datatype: record.datatype,
            value: record.value,
            attributes: record.attributes,
        }
    }
}

/// One row of the `stations` endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StationRecord {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub elevation: Option<f64>,
    #[serde(rename = "elevationUnit", default)]
    pub elevation_unit: Option<String>,
    pub mindate: NaiveDate,
    pub maxdate: NaiveDate,
    pub datacoverage: f64,
}

// ---------------------------------------------------------------------------
// Query / URL construction
// ---------------------------------------------------------------------------

/// A paginated provider query, minus the page offset.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderQuery {
    endpoint: String,
    params: Vec<(&'static str, String)>,
    station_id: Option<String>,
    page_size: u32,
}

impl ProviderQuery {
    /// Daily observations for one station over an inclusive date range.
    ///
    /// # Example
    /// ```
    /// use chrono::NaiveDate;
    /// use noaa_ingest::config::ProviderConfig;
    /// use noaa_ingest::ingest::ProviderQuery;
    ///
    /// let query = ProviderQuery::observations(
    ///     &ProviderConfig::default(),
    ///     "GHCND:USW00094728",
    ///     NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
    ///     NaiveDate::from_ymd_opt(2021, 12, 31).unwrap(),
    /// );
    /// assert!(query.url(1).ends_with("&limit=1000&offset=1"));
    /// ```
    pub fn observations(
        provider: &ProviderConfig,
        station_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Self {
        Self {
            endpoint: format!("{}/data", provider.base_url.trim_end_matches('/')),
            params: vec![
                ("datasetid", provider.dataset_id.clone()),
                ("datatypeid", provider.datatypes.join(",")),
                ("stationid", urlencoding::encode(station_id).into_owned()),
                ("startdate", start.format("%Y-%m-%d").to_string()),
                ("enddate", end.format("%Y-%m-%d").to_string()),
                ("units", provider.units.clone()),
            ],
            station_id: Some(station_id.to_string()),
            page_size: provider.page_size,
        }
    }

    /// The full station catalog for the configured dataset.
    pub fn stations(provider: &ProviderConfig) -> Self {
        Self {
            endpoint: format!("{}/stations", provider.base_url.trim_end_matches('/')),
            params: vec![("datasetid", provider.dataset_id.clone())],
            station_id: None,
            page_size: provider.page_size,
        }
    }

    /// Request URL for the page starting at the 1-based `offset`.
    pub fn url(&self, offset: u32) -> String {
        let mut url = format!("{}?", self.endpoint);
        for (name, value) in &self.params {
            url.push_str(name);
            url.push('=');
            url.push_str(value);
            url.push('&');
        }
        url.push_str(&format!("limit={}&offset={}", self.page_size, offset));
        url
    }

    /// Station the query is scoped to, if any.
    pub fn station_id(&self) -> Option<&str> {
        self.station_id.as_deref()
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// One page of a walk.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// 1-based offset this page was requested at.
    pub offset: u32,
    /// `metadata.resultset.count`: rows in the whole result set.
    pub total: u64,
    pub records: Vec<T>,
}

/// Parsed body of a 200 response.
#[derive(Debug, PartialEq)]
pub enum PageBody<T> {
    Records { total: u64, records: Vec<T> },
    /// The provider's `{}` for "nothing matched".
    NoResults,
}

/// Parses a CDO JSON page.
///
/// # Errors
/// `serde_json::Error` when the body is not JSON, a record does not match
/// `T`, or `results` is present without `metadata.resultset.count`.
pub fn parse_page<T: DeserializeOwned>(body: &str) -> Result<PageBody<T>, serde_json::Error> {
    let envelope: Envelope<T> = serde_json::from_str(body)?;

    match (envelope.results, envelope.metadata) {
        (None, _) => Ok(PageBody::NoResults),
        (Some(records), Some(metadata)) => Ok(PageBody::Records {
            total: metadata.resultset.count,
            records,
        }),
        (Some(_), None) => Err(<serde_json::Error as serde::de::Error>::custom(
            "results without metadata.resultset",
        )),
    }
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Blocking client that authenticates with the CDO `token` header.
pub struct NoaaClient {
    http: reqwest::blocking::Client,
    token: String,
}

impl NoaaClient {
    pub fn new(token: String, provider: &ProviderConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(provider.timeout_secs))
            .build()?;
        Ok(Self { http, token })
    }
}

impl Provider for NoaaClient {
    fn get(&mut self, url: &str) -> Result<ProviderResponse, TransportError> {
        let response = self
            .http
            .get(url)
            .header("token", &self.token)
            .header("Accept", "application/json")
            .send()?;

        let status = response.status().as_u16();
        let body = response.text()?;
        Ok(ProviderResponse { status, body })
    }
}
