//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;
use std::time::Duration;

use dbgbridge_config::{Config, SocketEndpoint};

use crate::bootstrap::BootstrapError;
use crate::transport::{ServerError, ServerStatus};

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer for daemon lifecycle events.
#[cfg_attr(test, mockall::automock)]
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once the server accepts connections.
    fn listener_bound(&self, endpoint: &SocketEndpoint);

    /// Invoked when a start attempt failed and will be retried.
    fn bind_retry(&self, error: &ServerError, backoff: Duration);

    /// Invoked after the server has stopped.
    fn server_stopped(&self, status: &ServerStatus);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn listener_bound(&self, endpoint: &SocketEndpoint) {
        (**self).listener_bound(endpoint);
    }

    fn bind_retry(&self, error: &ServerError, backoff: Duration) {
        (**self).bind_retry(error, backoff);
    }

    fn server_stopped(&self, status: &ServerStatus) {
        (**self).server_stopped(status);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting bridge bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            socket = %config.daemon_socket(),
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            backend = config.backend_program().unwrap_or("<none>"),
            default_timeout_ms = config.default_timeout().as_millis(),
            "bridge bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "bridge bootstrap failed"
        );
    }

    fn listener_bound(&self, endpoint: &SocketEndpoint) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "listener_bound",
            endpoint = %endpoint,
            "accepting client connections"
        );
    }

    fn bind_retry(&self, error: &ServerError, backoff: Duration) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "bind_retry",
            error = %error,
            backoff_ms = backoff.as_millis(),
            "server start failed; retrying"
        );
    }

    fn server_stopped(&self, status: &ServerStatus) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "server_stopped",
            endpoint = ?status.endpoint,
            connections = status.connections,
            "server stopped"
        );
    }
}
