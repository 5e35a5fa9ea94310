//! Logging and tracing configuration
//!
//! Wait boundaries emit structured events; this module installs the
//! subscriber that renders them.

use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::paths;

/// Default filter when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "readiness=info,warn";

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("readiness=debug,warn")
        } else {
            EnvFilter::new(DEFAULT_FILTER)
        }
    })
}

/// Initialize tracing for the CLI (stderr logging)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// `verbose` raises the crate's default level to DEBUG.
pub fn init_cli(verbose: bool) {
    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// Initialize tracing to a log file plus stderr
///
/// The file lives at `<data dir>/logs/readiness.log` and records thread
/// ids, which matters when following marshalled UI checks. Falls back to
/// stderr-only logging if the file cannot be opened.
pub fn init_file(verbose: bool) -> Option<PathBuf> {
    let log_file = paths::ensure_log_dir()
        .ok()
        .flatten()
        .map(|dir| dir.join("readiness.log"));

    if let Some(path) = &log_file {
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
        {
            Ok(file) => {
                let file_layer = fmt::layer()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_file(true)
                    .with_line_number(true);

                let stderr_layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .compact();

                tracing_subscriber::registry()
                    .with(env_filter(verbose))
                    .with(file_layer)
                    .with(stderr_layer)
                    .init();

                return log_file;
            }
            Err(e) => {
                eprintln!("Warning: Could not open log file: {}", e);
            }
        }
    }

    init_cli(verbose);
    None
}
