/// noaa_ingest: bulk loader for NOAA GHCN-Daily observations.
///
/// # Module structure
///
/// ```text
/// noaa_ingest
/// ├── model      — shared data types (Station, Observation) and distance helpers
/// ├── config     — ingest configuration loader (ingest.toml) and NOAA token
/// ├── db         — PostgreSQL connection with setup-oriented error messages
/// ├── store      — station/observation upserts (PostgreSQL and in-memory)
/// ├── ratelimit  — dual sliding-window limiter (per-second burst, daily quota)
/// ├── ledger     — daily quota window persisted across runs
/// ├── logging    — console + JSON-lines failure log behind the `log` facade
/// ├── ingest
/// │   ├── noaa   — CDO v2 API: URL construction, page parsing, HTTP client
/// │   ├── pages  — paginated fetch with rate limiting and 5xx retry
/// │   ├── ranges — per-calendar-year date spans
/// │   └── fixtures (test only) — representative API response payloads
/// ├── resume     — failed-station recovery from the failure log, work queue
/// ├── cluster    — geographic thinning of candidate stations
/// ├── regions    — country and world-region tagging for catalog stations
/// ├── catalog    — station catalog load from the `stations` endpoint
/// └── runner     — the observation ingest run
/// ```

pub mod catalog;
pub mod cluster;
pub mod config;
pub mod db;
pub mod ingest;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod ratelimit;
pub mod regions;
pub mod resume;
pub mod runner;
pub mod store;
