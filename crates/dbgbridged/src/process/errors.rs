//! Error surface for daemon launch and supervision.

use std::process::ExitCode;

use thiserror::Error;

use crate::bootstrap::BootstrapError;
use crate::dispatch::RegistryError;
use crate::transport::ServerError;

use super::shutdown::ShutdownError;

/// Errors surfaced while launching or supervising the daemon process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrapping the daemon failed.
    #[error("daemon bootstrap failed: {source}")]
    Bootstrap {
        #[source]
        source: BootstrapError,
    },
    /// Built-in command registration failed.
    #[error("failed to register built-in commands: {source}")]
    Registry {
        #[source]
        source: RegistryError,
    },
    /// The server could not be started and the failure is not retryable.
    #[error("failed to start server: {source}")]
    Server {
        #[source]
        source: ServerError,
    },
    /// Installing signal handlers failed.
    #[error("failed to await shutdown signal: {source}")]
    Shutdown {
        #[source]
        source: ShutdownError,
    },
}

impl LaunchError {
    /// Process exit status for this failure.
    ///
    /// Configuration problems exit with `78` (`EX_CONFIG`) and endpoint
    /// problems with `69` (`EX_UNAVAILABLE`); anything else is `1`.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Bootstrap {
                source: BootstrapError::Configuration { .. },
            } => ExitCode::from(78),
            Self::Server { .. }
            | Self::Bootstrap {
                source: BootstrapError::Socket { .. },
            } => ExitCode::from(69),
            _ => ExitCode::FAILURE,
        }
    }
}

impl From<BootstrapError> for LaunchError {
    fn from(source: BootstrapError) -> Self {
        Self::Bootstrap { source }
    }
}

impl From<RegistryError> for LaunchError {
    fn from(source: RegistryError) -> Self {
        Self::Registry { source }
    }
}

impl From<ServerError> for LaunchError {
    fn from(source: ServerError) -> Self {
        Self::Server { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}
