//! Login/logout client.

use crate::error::{CookieSyncError, CookieSyncResult, SyncEndpoint};
use cookie_sync_config::{Config, DEFAULT_REQUEST_TIMEOUT_SECS};
use reqwest::cookie::Jar;
use reqwest::header::AUTHORIZATION;
use serde::Serialize;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Parsed JSON payload, or the raw text when it is not JSON.
fn parse_error_body(body: String) -> Value {
    serde_json::from_str(&body).unwrap_or(Value::String(body))
}

/// Failure body for a rejected request. `Null` when the body could not be read.
fn error_body<E: std::fmt::Display>(endpoint: SyncEndpoint, read: Result<String, E>) -> Value {
    match read {
        Ok(body) => parse_error_body(body),
        Err(e) => {
            tracing::warn!(
                endpoint = %endpoint,
                error = %e,
                "Failed to read session endpoint response body"
            );
            Value::Null
        }
    }
}

/// Successful endpoint call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub endpoint: SyncEndpoint,
    pub status: u16,
}

/// HTTP client for the session-cookie endpoints.
///
/// Every request goes through one cookie jar, so the cookie set by `login`
/// is presented to `logout`.
#[derive(Clone)]
pub struct CookieSyncClient {
    http_client: reqwest::Client,
    login_endpoint: Url,
    logout_endpoint: Url,
    cookie_jar: Arc<Jar>,
}

impl CookieSyncClient {
    /// Create a client with a fresh cookie jar and the default timeout.
    pub fn new(login_endpoint: Url, logout_endpoint: Url) -> CookieSyncResult<Self> {
        Self::with_cookie_jar(
            login_endpoint,
            logout_endpoint,
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            Arc::new(Jar::default()),
        )
    }

    /// Create a client sharing `cookie_jar` with other clients.
    pub fn with_cookie_jar(
        login_endpoint: Url,
        logout_endpoint: Url,
        timeout: Duration,
        cookie_jar: Arc<Jar>,
    ) -> CookieSyncResult<Self> {
        let http_client = reqwest::Client::builder()
            .cookie_provider(cookie_jar.clone())
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http_client,
            login_endpoint,
            logout_endpoint,
            cookie_jar,
        })
    }

    /// Create a client from the configured endpoints and timeout.
    pub fn from_config(config: &Config) -> CookieSyncResult<Self> {
        let login = Url::parse(&config.login_api_endpoint)?;
        let logout = Url::parse(&config.logout_api_endpoint)?;
        Self::with_cookie_jar(
            login,
            logout,
            config.request_timeout(),
            Arc::new(Jar::default()),
        )
    }

    pub fn cookie_jar(&self) -> Arc<Jar> {
        self.cookie_jar.clone()
    }

    pub fn endpoint_url(&self, endpoint: SyncEndpoint) -> &Url {
        match endpoint {
            SyncEndpoint::Login => &self.login_endpoint,
            SyncEndpoint::Logout => &self.logout_endpoint,
        }
    }

    /// Exchange an ID token for a session cookie.
    ///
    /// The token is sent verbatim in the `Authorization` header.
    pub async fn login(&self, id_token: &str) -> CookieSyncResult<SyncOutcome> {
        self.post(SyncEndpoint::Login, Some(id_token)).await
    }

    /// Ask the server to clear the session cookie.
    pub async fn logout(&self) -> CookieSyncResult<SyncOutcome> {
        self.post(SyncEndpoint::Logout, None).await
    }

    async fn post(
        &self,
        endpoint: SyncEndpoint,
        id_token: Option<&str>,
    ) -> CookieSyncResult<SyncOutcome> {
        let url = self.endpoint_url(endpoint).clone();
        tracing::debug!(endpoint = %endpoint, url = %url, "Posting to session endpoint");

        let mut request = self.http_client.post(url);
        if let Some(token) = id_token {
            request = request.header(AUTHORIZATION, token);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let read = response.text().await;
            let body_summary = match &read {
                Ok(body) => summarize_response_body(body),
                Err(_) => "unreadable".to_string(),
            };
            tracing::error!(
                endpoint = %endpoint,
                status = %status,
                body_summary = %body_summary,
                "Session endpoint rejected request"
            );
            return Err(CookieSyncError::Endpoint {
                endpoint,
                status: status.as_u16(),
                body: error_body(endpoint, read),
            });
        }

        tracing::debug!(endpoint = %endpoint, status = %status, "Session endpoint succeeded");
        Ok(SyncOutcome {
            endpoint,
            status: status.as_u16(),
        })
    }
}

impl std::fmt::Debug for CookieSyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSyncClient")
            .field("login_endpoint", &self.login_endpoint.as_str())
            .field("logout_endpoint", &self.logout_endpoint.as_str())
            .finish_non_exhaustive()
    }
}
