//! Tracing setup for the binary.
//!
//! `log::*` calls from the storage layer are bridged through
//! `tracing_log::LogTracer` so they carry the active job span.

use std::fs::{self, OpenOptions};
use std::path::Path;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LogFormat;
use crate::error::LoggingError;

const NOISY_TARGETS: &[(&str, &str)] = &[
    ("reqwest", "warn"),
    ("hyper", "warn"),
    ("hyper_util", "warn"),
    ("rustls", "warn"),
];

/// Filter built from `RUST_LOG` when set, otherwise from `level` with
/// HTTP client chatter held at warn.
pub fn build_env_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let mut directives = vec![level.to_string()];
    for (target, lvl) in NOISY_TARGETS {
        directives.push(format!("{}={}", target, lvl));
    }
    let filter = directives.join(",");
    EnvFilter::try_new(&filter).map_err(|e| LoggingError::InvalidFilter {
        filter,
        reason: e.to_string(),
    })
}

/// Installs the global subscriber: stderr console output plus, when
/// `log_file` is set, an appending file layer in `format`.
pub fn init_logging(
    level: &str,
    log_file: Option<&Path>,
    format: LogFormat,
) -> Result<(), LoggingError> {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(build_env_filter(level)?);

    let file_layer = match log_file {
        Some(path) => {
            let file = open_log_file(path)?;
            let layer = match format {
                LogFormat::Json => tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_ansi(false)
                    .with_writer(file)
                    .with_filter(build_env_filter(level)?)
                    .boxed(),
                LogFormat::Compact => tracing_subscriber::fmt::layer()
                    .compact()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(file)
                    .with_filter(build_env_filter(level)?)
                    .boxed(),
            };
            Some(layer)
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|_| LoggingError::AlreadyInitialized)?;
    tracing_log::LogTracer::init().map_err(|_| LoggingError::AlreadyInitialized)
}

fn open_log_file(path: &Path) -> Result<fs::File, LoggingError> {
    let to_err = |source| LoggingError::OpenFile {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(to_err)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(to_err)
}
