//! Tracing setup
//!
//! Stdout always, plus an append-only file under `~/.wellspoken/logs` when
//! enabled. `RUST_LOG` overrides the configured filter.

use crate::config::{get_data_dir, LoggingConfig};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const LOG_FILE_NAME: &str = "wellspoken-debug.log";

/// Format timestamps using the system's local time via chrono
struct LocalTimer;

impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Directory holding log files
pub fn log_dir() -> PathBuf {
    get_data_dir().join("logs")
}

fn filter_for(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter))
}

/// Install the global subscriber
///
/// Returns false if a subscriber was already installed (tests, embedding
/// applications); that is not an error.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let log_file = if config.log_to_file {
        let dir = log_dir();
        let _ = std::fs::create_dir_all(&dir);
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(LOG_FILE_NAME))
            .ok()
    } else {
        None
    };

    let stdout_layer = tracing_subscriber::fmt::layer().with_timer(LocalTimer);

    let installed = if let Some(file) = log_file {
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_timer(LocalTimer)
            .with_ansi(false);
        tracing_subscriber::registry()
            .with(filter_for(config))
            .with(stdout_layer)
            .with(file_layer)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::registry()
            .with(filter_for(config))
            .with(stdout_layer)
            .try_init()
            .is_ok()
    };

    if installed {
        tracing::debug!("Logging initialised (filter: {})", config.filter);
    }
    installed
}
