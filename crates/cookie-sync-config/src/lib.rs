//! Configuration, file paths and logging setup for cookie-sync.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_LOGIN_API_ENDPOINT, DEFAULT_LOGOUT_API_ENDPOINT, DEFAULT_LOG_LEVEL,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};
pub use error::{CoreError, CoreResult};
pub use logging::init_logging;
pub use paths::Paths;
