/// Ingest configuration loader - parses ingest.toml
///
/// Separates provider limits, catalog filters and run options from code,
/// so quotas or date windows can be adjusted without recompiling. Every
/// field has a default matching the NOAA CDO v2 API, so an empty (or
/// missing) file yields a working configuration.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::model::DEFAULT_DATATYPES;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "ingest.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {0}")]
    Read(PathBuf, #[source] io::Error),

    #[error("Failed to parse {0}")]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("{0} environment variable not set (add it to .env)")]
    MissingEnv(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Root configuration structure for TOML parsing
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub provider: ProviderConfig,
    pub rate_limit: RateLimitConfig,
    pub catalog: CatalogFilter,
    pub cluster: ClusterConfig,
    pub run: RunConfig,
    pub logging: LoggingConfig,
}

/// Provider endpoint and request shape
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub dataset_id: String,
    pub datatypes: Vec<String>,
    pub units: String,
    /// Records per page; the API caps `limit` at 1000.
    pub page_size: u32,
    /// Total calls per page on 5xx responses, including the first one.
    pub max_attempts: u32,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.ncdc.noaa.gov/cdo-web/api/v2".to_string(),
            dataset_id: "GHCND".to_string(),
            datatypes: DEFAULT_DATATYPES.iter().map(|s| s.to_string()).collect(),
            units: "standard".to_string(),
            page_size: 1000,
            max_attempts: 4,
            timeout_secs: 120,
        }
    }
}

/// One sliding window: at most `max_entries` recorded calls per `span_secs`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowConfig {
    pub max_entries: usize,
    pub span_secs: f64,
}

const SHORT_WINDOW: WindowConfig = WindowConfig { max_entries: 4, span_secs: 1.1 };
const LONG_WINDOW: WindowConfig = WindowConfig { max_entries: 9999, span_secs: 86_460.0 };

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Burst window (provider allows 5 calls per second)
    #[serde(deserialize_with = "short_window")]
    pub short: WindowConfig,
    /// Daily quota (provider allows 10,000 calls per day)
    #[serde(deserialize_with = "long_window")]
    pub long: WindowConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { short: SHORT_WINDOW, long: LONG_WINDOW }
    }
}

/// A window section as written; absent keys fall back per window.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WindowSection {
    max_entries: Option<usize>,
    span_secs: Option<f64>,
}

impl WindowSection {
    fn or(self, fallback: WindowConfig) -> WindowConfig {
        WindowConfig {
            max_entries: self.max_entries.unwrap_or(fallback.max_entries),
            span_secs: self.span_secs.unwrap_or(fallback.span_secs),
        }
    }
}

fn short_window<'de, D: Deserializer<'de>>(deserializer: D) -> Result<WindowConfig, D::Error> {
    WindowSection::deserialize(deserializer).map(|section| section.or(SHORT_WINDOW))
}

fn long_window<'de, D: Deserializer<'de>>(deserializer: D) -> Result<WindowConfig, D::Error> {
    WindowSection::deserialize(deserializer).map(|section| section.or(LONG_WINDOW))
}

/// Filter applied to the station catalog when choosing candidates
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogFilter {
    pub country_code: String,
    /// Station must still report on or after this date.
    pub active_since: NaiveDate,
    /// Station record must start on or before this date.
    pub starts_before: NaiveDate,
    pub min_coverage: f64,
}

impl Default for CatalogFilter {
    fn default() -> Self {
        Self {
            country_code: "US".to_string(),
            active_since: NaiveDate::from_ymd_opt(2025, 5, 13).unwrap_or_default(),
            starts_before: NaiveDate::from_ymd_opt(1950, 1, 1).unwrap_or_default(),
            min_coverage: 0.97,
        }
    }
}

/// Geographic thinning of the candidate set
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Increasing cluster radii in kilometres.
    pub radii_km: Vec<f64>,
    /// Index of the last radius to apply; `None` disables clustering.
    pub resolution: Option<usize>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            radii_km: vec![5.0, 25.0, 50.0, 75.0, 100.0, 150.0, 200.0, 300.0, 400.0, 500.0],
            resolution: None,
        }
    }
}

impl ClusterConfig {
    /// Radii applied for the configured resolution (inclusive).
    pub fn active_radii(&self) -> &[f64] {
        match self.resolution {
            Some(r) => &self.radii_km[..(r + 1).min(self.radii_km.len())],
            None => &[],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub start_date: NaiveDate,
    /// Defaults to today when absent.
    pub end_date: Option<NaiveDate>,
    pub ledger_path: PathBuf,
    pub failure_log_path: PathBuf,
    /// Stop after the first station that is actually fetched.
    pub single_station: bool,
    /// Re-fetch stations with error records in the failure log.
    pub rerun_failures: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(1950, 1, 1).unwrap_or_default(),
            end_date: None,
            ledger_path: PathBuf::from("api_calls.json"),
            failure_log_path: PathBuf::from("populate_weather_log.json"),
            single_station: false,
            rerun_failures: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level printed to stderr.
    pub console_level: log::LevelFilter,
    /// Minimum level appended to the failure log.
    pub file_level: log::LevelFilter,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            console_level: log::LevelFilter::Info,
            file_level: log::LevelFilter::Warn,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl IngestConfig {
    /// Parses a configuration from TOML text. Call `validate` before use.
    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Checks invariants the rest of the crate relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.page_size == 0 || self.provider.page_size > 1000 {
            return Err(ConfigError::Invalid(format!(
                "provider.page_size must be in 1..=1000, got {}",
                self.provider.page_size
            )));
        }
        if self.provider.max_attempts == 0 {
            return Err(ConfigError::Invalid("provider.max_attempts must be at least 1".into()));
        }
        for (name, window) in [("short", self.rate_limit.short), ("long", self.rate_limit.long)] {
            if window.max_entries == 0 || window.span_secs <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "rate_limit.{} needs max_entries > 0 and span_secs > 0",
                    name
                )));
            }
        }
        if self.cluster.radii_km.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::Invalid("cluster.radii_km must be strictly increasing".into()));
        }
        if let Some(end) = self.run.end_date {
            if end < self.run.start_date {
                return Err(ConfigError::Invalid("run.end_date is before run.start_date".into()));
            }
        }
        Ok(())
    }
}

/// Loads configuration from `path`.
///
/// A missing file at the default location is not an error: the built-in
/// defaults are used. An explicitly named file must exist.
pub fn load_config(path: &Path, explicit: bool) -> Result<IngestConfig, ConfigError> {
    let config = match fs::read_to_string(path) {
        Ok(contents) => IngestConfig::from_toml_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?,
        Err(e) if e.kind() == io::ErrorKind::NotFound && !explicit => IngestConfig::default(),
        Err(e) => return Err(ConfigError::Read(path.to_path_buf(), e)),
    };

    config.validate()?;
    Ok(config)
}

/// Reads the NOAA API token from the environment (`.env` honoured).
pub fn noaa_token() -> Result<String, ConfigError> {
    dotenv::dotenv().ok();
    env::var("NOAA_TOKEN").map_err(|_| ConfigError::MissingEnv("NOAA_TOKEN"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_provider_defaults() {
        let config = IngestConfig::from_toml_str("").unwrap();
        assert_eq!(config.provider.page_size, 1000);
        assert_eq!(config.provider.max_attempts, 4);
        assert_eq!(config.provider.dataset_id, "GHCND");
        assert_eq!(config.provider.datatypes.len(), 5);
        assert_eq!(config.rate_limit.short.max_entries, 4);
        assert_eq!(config.rate_limit.long.max_entries, 9999);
        assert_eq!(config.rate_limit.long.span_secs, 86_460.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = IngestConfig::from_toml_str(
            r#"
            [catalog]
            country_code = "CA"

            [run]
            start_date = "2000-01-01"
            single_station = true

            [logging]
            console_level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.catalog.country_code, "CA");
        assert_eq!(config.catalog.min_coverage, 0.97);
        assert_eq!(config.run.start_date, NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
        assert!(config.run.single_station);
        assert_eq!(config.run.ledger_path, PathBuf::from("api_calls.json"));
        assert_eq!(config.logging.console_level, log::LevelFilter::Debug);
        assert_eq!(config.logging.file_level, log::LevelFilter::Warn);
    }

    #[test]
    fn test_window_sections_accept_partial_keys() {
        let config = IngestConfig::from_toml_str(
            r#"
            [rate_limit.short]
            max_entries = 3

            [rate_limit.long]
            span_secs = 3600.0
            "#,
        )
        .unwrap();

        assert_eq!(config.rate_limit.short, WindowConfig { max_entries: 3, span_secs: 1.1 });
        assert_eq!(config.rate_limit.long, WindowConfig { max_entries: 9999, span_secs: 3600.0 });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_window_section_rejects_unknown_key() {
        assert!(IngestConfig::from_toml_str("[rate_limit.short]\nmax_calls = 3").is_err());
    }

    #[test]
    fn test_active_radii_follow_resolution() {
        let mut cluster = ClusterConfig::default();
        assert!(cluster.active_radii().is_empty());

        cluster.resolution = Some(0);
        assert_eq!(cluster.active_radii(), &[5.0]);

        cluster.resolution = Some(5);
        assert_eq!(cluster.active_radii(), &[5.0, 25.0, 50.0, 75.0, 100.0, 150.0]);

        cluster.resolution = Some(42);
        assert_eq!(cluster.active_radii().len(), 10);
    }

    #[test]
    fn test_validate_rejects_oversized_page() {
        let config = IngestConfig::from_toml_str("[provider]\npage_size = 5000").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_unsorted_radii() {
        let config = IngestConfig::from_toml_str("[cluster]\nradii_km = [25.0, 5.0]").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_default_file_falls_back() {
        let config = load_config(Path::new("definitely-not-here.toml"), false).unwrap();
        assert_eq!(config.provider.page_size, 1000);

        let err = load_config(Path::new("definitely-not-here.toml"), true).unwrap_err();
        assert!(matches!(err, ConfigError::Read(..)));
    }

    #[test]
    fn test_repository_config_parses() {
        let config = load_config(Path::new(DEFAULT_CONFIG_PATH), true)
            .expect("ingest.toml at the crate root should parse");
        assert_eq!(config.provider.page_size, 1000);
    }
}
