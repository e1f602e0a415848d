//! Shared configuration for the debugger bridge.
//!
//! Values are layered by [`ortho_config`]: built-in defaults, then an
//! optional TOML file, then `DBGBRIDGE_*` environment variables, then
//! command-line flags. The daemon reads everything through the accessor
//! methods on [`Config`] so the field layout can evolve without touching the
//! call sites.

mod defaults;
mod logging;
mod socket;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_BACKEND_SENTINEL, DEFAULT_BIND_RETRY_MS, DEFAULT_INTERRUPT_GRACE_MS,
    DEFAULT_LOG_FILTER, DEFAULT_MAX_FRAME_BYTES, DEFAULT_QUEUE_WAIT_MS, DEFAULT_READ_POLL_MS,
    DEFAULT_TCP_PORT, DEFAULT_TIMEOUT_MS, default_backend_sentinel, default_log_filter_string,
    default_log_format, default_socket_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Resolved bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "DBGBRIDGE")]
pub struct Config {
    /// Well-known endpoint clients connect to.
    #[ortho_config(default = default_socket_endpoint())]
    pub daemon_socket: SocketEndpoint,
    /// `tracing` filter expression.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Deadline for commands that omit `timeout_ms`.
    #[ortho_config(default = DEFAULT_TIMEOUT_MS)]
    pub default_timeout_ms: u64,
    /// Extra wait after an interrupt before a worker is detached.
    #[ortho_config(default = DEFAULT_INTERRUPT_GRACE_MS)]
    pub interrupt_grace_ms: u64,
    /// Bounded wait on each client's outgoing queue.
    #[ortho_config(default = DEFAULT_QUEUE_WAIT_MS)]
    pub queue_wait_ms: u64,
    /// Inbound read timeout per client worker iteration.
    #[ortho_config(default = DEFAULT_READ_POLL_MS)]
    pub read_poll_ms: u64,
    /// Largest frame a client may send.
    #[ortho_config(default = DEFAULT_MAX_FRAME_BYTES)]
    pub max_frame_bytes: usize,
    /// Backoff between listener start attempts.
    #[ortho_config(default = DEFAULT_BIND_RETRY_MS)]
    pub bind_retry_ms: u64,
    /// Program implementing the line-oriented backend engine.
    pub backend_program: Option<String>,
    /// Whitespace-separated arguments passed to `backend_program`.
    pub backend_args: Option<String>,
    /// Command template echoing the completion marker.
    #[ortho_config(default = default_backend_sentinel())]
    pub backend_sentinel: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_socket: default_socket_endpoint(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            interrupt_grace_ms: DEFAULT_INTERRUPT_GRACE_MS,
            queue_wait_ms: DEFAULT_QUEUE_WAIT_MS,
            read_poll_ms: DEFAULT_READ_POLL_MS,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            bind_retry_ms: DEFAULT_BIND_RETRY_MS,
            backend_program: None,
            backend_args: None,
            backend_sentinel: default_backend_sentinel(),
        }
    }
}

impl Config {
    /// Endpoint the daemon listens on.
    #[must_use]
    pub fn daemon_socket(&self) -> &SocketEndpoint {
        &self.daemon_socket
    }

    /// Filter expression for the tracing subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Output format for the tracing subscriber.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Deadline applied when a request does not name one.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Grace period after an interrupt request.
    #[must_use]
    pub fn interrupt_grace(&self) -> Duration {
        Duration::from_millis(self.interrupt_grace_ms)
    }

    /// Bounded wait on a client's outgoing queue.
    #[must_use]
    pub fn queue_wait(&self) -> Duration {
        Duration::from_millis(self.queue_wait_ms)
    }

    /// Inbound read timeout for client workers.
    #[must_use]
    pub fn read_poll(&self) -> Duration {
        Duration::from_millis(self.read_poll_ms)
    }

    /// Largest accepted frame in bytes.
    #[must_use]
    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// Backoff between listener start attempts.
    #[must_use]
    pub fn bind_retry(&self) -> Duration {
        Duration::from_millis(self.bind_retry_ms)
    }

    /// Backend program, when one is configured.
    #[must_use]
    pub fn backend_program(&self) -> Option<&str> {
        self.backend_program.as_deref()
    }

    /// Backend arguments split on whitespace.
    #[must_use]
    pub fn backend_args(&self) -> Vec<String> {
        self.backend_args
            .as_deref()
            .map(|args| args.split_whitespace().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    /// Sentinel command template for the backend.
    #[must_use]
    pub fn backend_sentinel(&self) -> &str {
        &self.backend_sentinel
    }
}
