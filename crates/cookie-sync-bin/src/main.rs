//! cookie-sync - replay identity timelines through the session cookie controller.

mod replay;
mod timeline;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use cookie_sync_config::{init_logging, Config, Paths};

/// cookie-sync command-line interface.
#[derive(Parser)]
#[command(name = "cookie-sync")]
#[command(about = "Keep a server session cookie in step with client identity changes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config and logs. Defaults to ~/.cookie-sync
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Also write JSONL logs under the base directory
    #[arg(long, global = true)]
    log_to_file: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a timeline of token changes and print the final snapshot
    Replay {
        /// JSON array of token-change events
        timeline: PathBuf,

        /// Seconds to wait for the last cycle to settle
        #[arg(long, default_value_t = 30)]
        settle_timeout: u64,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;

    let level = cli
        .log_level
        .as_deref()
        .unwrap_or_else(|| config.effective_log_level());
    let log_file = if cli.log_to_file {
        paths.ensure_dirs()?;
        Some(paths.log_file())
    } else {
        None
    };
    init_logging(level, log_file);

    match cli.command {
        Commands::Replay {
            timeline,
            settle_timeout,
        } => {
            let events = timeline::load(&timeline)?;
            tracing::info!(
                events = events.len(),
                login = %config.login_api_endpoint,
                logout = %config.logout_api_endpoint,
                "Replaying timeline"
            );
            let report =
                replay::run(&config, events, Duration::from_secs(settle_timeout)).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            eprintln!("config file: {}", paths.config_file().display());
        }
    }

    Ok(())
}
