//! Typed errors for the link resolution library.
//!
//! Fetch failures never cross the public `PageFetcher` boundary as errors;
//! they are logged and collapsed to `None`/`false`. The typed error exists so
//! the failure reason can be logged with structure before it is collapsed.

use thiserror::Error;

/// Errors that can occur while talking to a remote host.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Server answered with a non-success status
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// Request timed out
    #[error("timeout fetching: {url}")]
    Timeout { url: String },

    /// Connection, TLS, redirect or body read failure
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// HTTP client could not be constructed
    #[error("client build error: {0}")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    /// Classify a reqwest error, keeping timeouts distinct.
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Transport(err)
        }
    }
}

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;
