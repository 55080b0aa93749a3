/// Structured logging for the ingest run
///
/// Installs a `log::Log` implementation with two sinks:
///
/// - console (stderr): `2025-05-13 14:02:11 | ERROR | line: 212 | Exceeded retries station=...`
/// - failure log: one JSON object per line, appended across runs
///
/// ```text
/// {"context":{"attempts":4,"script_run_datetime":1747144931.5,"station":"GHCND:USW00094728",
///   "status_code":503,"url":"https://..."},"level":"ERROR","line":212,
///   "message":"Exceeded retries","time":"2025-05-13 14:02:11"}
/// ```
///
/// Call sites attach context with `log` key-values:
/// `log::error!(station = id, url = url.as_str(); "Exceeded retries")`.
/// The failure log is what `resume::read_failed_stations` reads back on a
/// rerun, so `station` must be present on every per-station error.

use chrono::Utc;
use log::kv::{self, Key, Value, VisitSource};
use log::{Level, LevelFilter, Log, Metadata, Record};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

use crate::config::LoggingConfig;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to open failure log '{0}'")]
    Open(PathBuf, #[source] io::Error),

    #[error("A logger is already installed")]
    AlreadyInstalled(#[from] log::SetLoggerError),
}

// ---------------------------------------------------------------------------
// Failure log record
// ---------------------------------------------------------------------------

/// One line of the failure log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub context: Map<String, JsonValue>,
}

impl FailureRecord {
    /// Builds the record for a `log` event, tagging it with the run start.
    pub fn from_log_record(record: &Record<'_>, run_started: f64) -> Self {
        let mut visitor = ContextVisitor(Map::new());
        // Visiting an in-memory source only fails if the visitor does.
        let _ = record.key_values().visit(&mut visitor);

        let mut context = visitor.0;
        context.insert("script_run_datetime".to_string(), JsonValue::from(run_started));

        Self {
            time: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            level: level_name(record.level()).to_string(),
            line: record.line(),
            message: record.args().to_string(),
            context,
        }
    }

    /// Context value as a string, if present and a string.
    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(JsonValue::as_str)
    }

    fn console_line(&self) -> String {
        let mut line = format!(
            "{} | {} | line: {} | {}",
            self.time,
            self.level,
            self.line.map(|l| l.to_string()).unwrap_or_else(|| "-".to_string()),
            self.message
        );
        for (key, value) in &self.context {
            if key == "script_run_datetime" {
                continue;
            }
            match value {
                JsonValue::String(s) => line.push_str(&format!(" {}={}", key, s)),
                other => line.push_str(&format!(" {}={}", key, other)),
            }
        }
        line
    }
}

/// Level names as written to the failure log.
fn level_name(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => "WARNING",
        Level::Info => "INFO",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}

struct ContextVisitor(Map<String, JsonValue>);

impl<'kvs> VisitSource<'kvs> for ContextVisitor {
    fn visit_pair(&mut self, key: Key<'kvs>, value: Value<'kvs>) -> Result<(), kv::Error> {
        let json = if let Some(s) = value.to_borrowed_str() {
            JsonValue::from(s)
        } else if let Some(n) = value.to_u64() {
            JsonValue::from(n)
        } else if let Some(n) = value.to_i64() {
            JsonValue::from(n)
        } else if let Some(n) = value.to_f64() {
            JsonValue::from(n)
        } else if let Some(b) = value.to_bool() {
            JsonValue::from(b)
        } else {
            JsonValue::from(value.to_string())
        };
        self.0.insert(key.as_str().to_string(), json);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

pub struct IngestLogger {
    console_level: LevelFilter,
    file_level: LevelFilter,
    file: Option<Mutex<File>>,
    run_started: f64,
}

impl IngestLogger {
    /// Logger appending to `failure_log`, creating it if needed.
    pub fn new(config: &LoggingConfig, failure_log: &Path, run_started: f64) -> Result<Self, LoggingError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(failure_log)
            .map_err(|e| LoggingError::Open(failure_log.to_path_buf(), e))?;

        Ok(Self {
            console_level: config.console_level,
            file_level: config.file_level,
            file: Some(Mutex::new(file)),
            run_started,
        })
    }

    /// Console-only logger, for the catalog loader and tools that keep no
    /// failure log.
    pub fn console_only(config: &LoggingConfig, run_started: f64) -> Self {
        Self {
            console_level: config.console_level,
            file_level: LevelFilter::Off,
            file: None,
            run_started,
        }
    }

    fn max_level(&self) -> LevelFilter {
        self.console_level.max(self.file_level)
    }
}

impl Log for IngestLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let entry = FailureRecord::from_log_record(record, self.run_started);

        if record.level() <= self.console_level {
            eprintln!("{}", entry.console_line());
        }

        if record.level() <= self.file_level {
            if let Some(file) = &self.file {
                if let (Ok(json), Ok(mut file)) = (serde_json::to_string(&entry), file.lock()) {
                    let _ = writeln!(file, "{}", json);
                }
            }
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

/// Installs the process-wide logger with both sinks.
pub fn init(config: &LoggingConfig, failure_log: &Path, run_started: f64) -> Result<(), LoggingError> {
    install(IngestLogger::new(config, failure_log, run_started)?)
}

/// Installs a console-only process-wide logger.
pub fn init_console(config: &LoggingConfig, run_started: f64) -> Result<(), LoggingError> {
    install(IngestLogger::console_only(config, run_started))
}

fn install(logger: IngestLogger) -> Result<(), LoggingError> {
    let max_level = logger.max_level();
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(max_level);
    Ok(())
}

/// Current time as epoch seconds, used as `script_run_datetime`.
pub fn run_timestamp() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
