//! Logging setup for hosts and the demo binary.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is left to whoever embeds it.

use crate::config::LoggingConfig;
use std::ffi::OsString;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILE: &str = "procflow.log";

/// Installs a global subscriber: an `EnvFilter` (`RUST_LOG` overrides the
/// configured filter), a console layer and, if configured, a file layer.
///
/// Keep the returned guard alive for as long as file logging should work.
/// Calling this twice leaves the first subscriber in place.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let (file_layer, guard) = match &config.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| OsString::from(DEFAULT_LOG_FILE));
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
    {
        tracing::debug!("Logging already initialized: {}", e);
    }

    guard
}
