//! Structured logging setup for the bridge daemon.
//!
//! Events go to stderr so that stdout stays free for the backend session's
//! own plumbing when the daemon is run in a pipeline.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, time::UtcTime};

use dbgbridge_config::{Config, LogFormat};

static TELEMETRY_GUARD: OnceCell<LogFormat> = OnceCell::new();

/// Proof that the global subscriber has been installed.
#[derive(Debug, Clone, Copy)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// Format chosen by the call that installed the subscriber.
    #[must_use]
    pub fn format(&self) -> LogFormat {
        self.format
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("log filter '{filter}' is invalid: {reason}")]
    Filter { filter: String, reason: String },
    #[error("a tracing subscriber is already installed: {0}")]
    Subscriber(#[source] SetGlobalDefaultError),
}

/// Installs the global subscriber on first use.
///
/// Later calls return a handle for the first installation without touching
/// global state, so a hosting process can re-run bootstrap freely.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| {
            let subscriber = build_subscriber(config)?;
            tracing::subscriber::set_global_default(subscriber)
                .map_err(TelemetryError::Subscriber)?;
            Ok(config.log_format())
        })
        .map(|format| TelemetryHandle { format: *format })
}

fn build_subscriber(
    config: &Config,
) -> Result<Box<dyn Subscriber + Send + Sync>, TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter()).map_err(|error| {
        TelemetryError::Filter {
            filter: config.log_filter().to_owned(),
            reason: error.to_string(),
        }
    })?;

    // Worker and accept threads are named, which is what tells executions
    // apart from connection traffic in the output.
    let base = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(UtcTime::rfc_3339());

    Ok(match config.log_format() {
        LogFormat::Json => Box::new(base.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(base.compact().finish()),
    })
}
