/// Quota ledger: the daily rate window persisted across runs.
///
/// The file is a JSON array of epoch-second floats, oldest first, e.g.
/// `[1747130000.12, 1747130001.3]`. It is read once at startup and written
/// on every terminating path of a run, so a restarted process still knows
/// how much of the provider's daily quota has been spent.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::ratelimit::SlidingWindow;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Failed to encode quota ledger")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to write quota ledger '{0}'")]
    Write(PathBuf, #[source] io::Error),
}

/// Handle on the ledger file.
#[derive(Debug, Clone)]
pub struct QuotaLedger {
    path: PathBuf,
}

impl QuotaLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the recorded call timestamps.
    ///
    /// A missing or unparsable file yields an empty history.
    pub fn load(&self) -> Vec<f64> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::info!("No quota ledger at {}, starting empty", self.path.display());
                return Vec::new();
            }
            Err(e) => {
                log::warn!("Unreadable quota ledger {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<f64>>(&contents) {
            Ok(calls) => {
                log::info!("Loaded {} recorded API calls from {}", calls.len(), self.path.display());
                calls
            }
            Err(e) => {
                log::warn!("Corrupt quota ledger {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    /// Writes the window's timestamps, replacing the previous file.
    ///
    /// The JSON is written to a sibling temp file first and renamed over the
    /// ledger, so an interrupted save leaves the previous ledger intact.
    pub fn save(&self, window: &SlidingWindow) -> Result<(), LedgerError> {
        let json = serde_json::to_string(&window.entries()).map_err(LedgerError::Encode)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json).map_err(|e| LedgerError::Write(tmp.clone(), e))?;
        fs::rename(&tmp, &self.path).map_err(|e| LedgerError::Write(self.path.clone(), e))?;

        log::debug!("Saved {} API calls to {}", window.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowConfig;

    const DAILY: WindowConfig = WindowConfig { max_entries: 9999, span_secs: 86_460.0 };

    #[test]
    fn test_round_trip_preserves_entries_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = QuotaLedger::new(dir.path().join("api_calls.json"));

        let window = SlidingWindow::with_entries(DAILY, vec![1747130000.25, 1747130001.5, 1747130003.0]);
        ledger.save(&window).unwrap();

        let restored = SlidingWindow::with_entries(DAILY, ledger.load());
        assert_eq!(restored, window);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = QuotaLedger::new(dir.path().join("nope.json"));
        assert!(ledger.load().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_calls.json");
        fs::write(&path, "[1.0, 2.0, oops").unwrap();

        assert!(QuotaLedger::new(&path).load().is_empty());
    }

    #[test]
    fn test_file_format_is_plain_float_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_calls.json");
        let window = SlidingWindow::with_entries(DAILY, vec![1.5, 2.0]);

        QuotaLedger::new(&path).save(&window).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw, "[1.5,2.0]");
        assert!(!dir.path().join("api_calls.json.tmp").exists());
    }

    #[test]
    fn test_save_overwrites_previous_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = QuotaLedger::new(dir.path().join("api_calls.json"));

        ledger.save(&SlidingWindow::with_entries(DAILY, vec![1.0, 2.0, 3.0])).unwrap();
        ledger.save(&SlidingWindow::with_entries(DAILY, vec![9.0])).unwrap();

        assert_eq!(ledger.load(), vec![9.0]);
    }
}
