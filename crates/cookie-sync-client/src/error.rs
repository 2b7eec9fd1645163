//! Error types for cookie sync requests.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Which session endpoint a request targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEndpoint {
    Login,
    Logout,
}

impl fmt::Display for SyncEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEndpoint::Login => f.write_str("login"),
            SyncEndpoint::Logout => f.write_str("logout"),
        }
    }
}

/// Error type for login/logout requests.
#[derive(Debug, Error)]
pub enum CookieSyncError {
    /// The endpoint answered with a non-success status.
    ///
    /// `body` is the parsed JSON payload, or the raw text as a JSON string
    /// when the payload is not JSON.
    #[error("Received {status} response from {endpoint} API endpoint: {body}")]
    Endpoint {
        endpoint: SyncEndpoint,
        status: u16,
        body: serde_json::Value,
    },

    /// Network or transport-level HTTP error from reqwest.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl CookieSyncError {
    /// HTTP status for endpoint failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            CookieSyncError::Endpoint { status, .. } => Some(*status),
            CookieSyncError::Http(e) => e.status().map(|s| s.as_u16()),
            CookieSyncError::InvalidUrl(_) => None,
        }
    }
}

/// Result type alias using CookieSyncError.
pub type CookieSyncResult<T> = Result<T, CookieSyncError>;
