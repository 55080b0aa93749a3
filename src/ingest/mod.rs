/// Provider access: HTTP seam, page walking and date-range expansion.
///
/// - `noaa`   — NOAA CDO v2 URL construction, JSON page parsing, HTTP client
/// - `pages`  — paginated fetch with rate limiting and 5xx retry
/// - `ranges` — splits a station's period of record into per-year spans

pub mod noaa;
pub mod pages;
pub mod ranges;

#[cfg(test)]
pub(crate) mod fixtures;

use thiserror::Error;

use crate::ratelimit::QuotaExceeded;

pub use noaa::{NoaaClient, Page, ProviderQuery};
pub use pages::Pages;
pub use ranges::{year_spans, DateSpan};

// ---------------------------------------------------------------------------
// HTTP seam
// ---------------------------------------------------------------------------

/// Status and body of one provider response.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub status: u16,
    pub body: String,
}

impl ProviderResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }
}

/// The request never produced a response (timeout, DNS, connection reset).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

/// Issues one GET against the provider.
///
/// Implemented by [`NoaaClient`]; tests substitute scripted providers.
pub trait Provider {
    fn get(&mut self, url: &str) -> Result<ProviderResponse, TransportError>;
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a page walk stopped early.
///
/// `RetriesExhausted` and `Transport` are local to one query: the caller
/// logs them and moves on to the next span. The rest end the run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Exceeded retries: HTTP {status} after {attempts} attempts for {url}")]
    RetriesExhausted { url: String, status: u16, attempts: u32 },

    #[error("Request failed for {url}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("Unknown error: HTTP {status} for {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("Malformed response body from {url}")]
    MalformedBody {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Daily API Limit Exceeded")]
    QuotaExhausted {
        url: String,
        #[source]
        source: QuotaExceeded,
    },
}

impl FetchError {
    /// True when retrying later cannot help and the run must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FetchError::UnexpectedStatus { .. }
                | FetchError::MalformedBody { .. }
                | FetchError::QuotaExhausted { .. }
        )
    }

    pub fn url(&self) -> &str {
        match self {
            FetchError::RetriesExhausted { url, .. }
            | FetchError::Transport { url, .. }
            | FetchError::UnexpectedStatus { url, .. }
            | FetchError::MalformedBody { url, .. }
            | FetchError::QuotaExhausted { url, .. } => url,
        }
    }

    /// HTTP status, when a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::RetriesExhausted { status, .. }
            | FetchError::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Calls made for the failing page, when the walk gave up on retries.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            FetchError::RetriesExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// Short label for log messages, matching the failure log's `message`.
    pub fn summary(&self) -> String {
        match self {
            FetchError::RetriesExhausted { .. } => "Exceeded retries".to_string(),
            FetchError::Transport { .. } => "Request failed".to_string(),
            FetchError::UnexpectedStatus { status, .. } => format!("Unknown error: {}", status),
            FetchError::MalformedBody { .. } => "Malformed response".to_string(),
            FetchError::QuotaExhausted { .. } => "Daily API Limit Exceeded".to_string(),
        }
    }
}
