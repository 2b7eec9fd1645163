//! Logging initialization.
//!
//! Thin wrapper over the observability crate. Crates in this workspace only
//! use `tracing` macros; binaries call `init_logging` once.

use observability::LogConfig;
use std::path::PathBuf;

/// Initialize logging for the `cookie-sync` service.
///
/// `level` is the default filter; `RUST_LOG` overrides it. When `log_file`
/// is given, structured JSONL is appended there as well.
pub fn init_logging(level: &str, log_file: Option<PathBuf>) {
    observability::init_with_config(LogConfig {
        service_name: "cookie-sync".into(),
        default_level: level.into(),
        log_path: log_file,
        also_stderr: true,
    });
}
