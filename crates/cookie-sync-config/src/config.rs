//! Configuration for the cookie-sync controller and CLI.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default login endpoint (a local Next.js-style API route).
pub const DEFAULT_LOGIN_API_ENDPOINT: &str = "http://localhost:3000/api/login";

/// Default logout endpoint.
pub const DEFAULT_LOGOUT_API_ENDPOINT: &str = "http://localhost:3000/api/logout";

/// Default per-request timeout for login/logout calls.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const ENV_LOG_LEVEL: &str = "COOKIE_SYNC_LOG_LEVEL";
const ENV_LOGIN_ENDPOINT: &str = "COOKIE_SYNC_LOGIN_ENDPOINT";
const ENV_LOGOUT_ENDPOINT: &str = "COOKIE_SYNC_LOGOUT_ENDPOINT";
const ENV_DEBUG: &str = "COOKIE_SYNC_DEBUG";

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Endpoint that sets the session cookie from a bearer token.
    #[serde(default = "default_login_api_endpoint")]
    pub login_api_endpoint: String,
    /// Endpoint that clears the session cookie.
    #[serde(default = "default_logout_api_endpoint")]
    pub logout_api_endpoint: String,
    /// Verbose cycle logging regardless of `log_level`.
    #[serde(default)]
    pub debug: bool,
    /// Timeout applied to each login/logout request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_login_api_endpoint() -> String {
    DEFAULT_LOGIN_API_ENDPOINT.to_string()
}

fn default_logout_api_endpoint() -> String {
    DEFAULT_LOGOUT_API_ENDPOINT.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            login_api_endpoint: default_login_api_endpoint(),
            logout_api_endpoint: default_logout_api_endpoint(),
            debug: false,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load `<base>/config.json` if present, then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to `<base>/config.json`.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from a variable lookup. Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(level) = get(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(endpoint) = get(ENV_LOGIN_ENDPOINT) {
            self.login_api_endpoint = endpoint;
        }
        if let Some(endpoint) = get(ENV_LOGOUT_ENDPOINT) {
            self.logout_api_endpoint = endpoint;
        }
        if let Some(flag) = get(ENV_DEBUG) {
            self.debug = matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    /// Check that both endpoints are absolute URLs and the timeout is non-zero.
    pub fn validate(&self) -> CoreResult<()> {
        self.login_url()?;
        self.logout_url()?;
        if self.request_timeout_secs == 0 {
            return Err(CoreError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn login_url(&self) -> CoreResult<Url> {
        Url::parse(&self.login_api_endpoint).map_err(CoreError::from)
    }

    pub fn logout_url(&self) -> CoreResult<Url> {
        Url::parse(&self.logout_api_endpoint).map_err(CoreError::from)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// `debug` when the debug flag is set, otherwise the configured level.
    pub fn effective_log_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.log_level
        }
    }
}
