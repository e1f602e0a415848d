//! Daemon bootstrap: configuration, telemetry and socket preparation.

use std::sync::Arc;

use ortho_config::{OrthoConfig as _, OrthoError};
use thiserror::Error;

use dbgbridge_config::{Config, SocketPreparationError};

use crate::health::HealthReporter;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Source of the daemon configuration.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader that hands out an already resolved configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Failures that stop the daemon before it binds its endpoint.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("cannot load configuration: {source}")]
    Configuration {
        #[source]
        source: Arc<OrthoError>,
    },
    #[error("cannot install logging: {source}")]
    Telemetry {
        #[source]
        source: TelemetryError,
    },
    /// The unix socket's directory is missing and could not be created, or
    /// is not a directory.
    #[error("cannot prepare the socket directory: {source}")]
    Socket {
        #[source]
        source: SocketPreparationError,
    },
}

/// Result of a successful bootstrap.
pub struct Daemon {
    config: Config,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl Daemon {
    /// Resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Reporter that observed the bootstrap; reused for runtime events.
    #[must_use]
    pub fn reporter(&self) -> Arc<dyn HealthReporter> {
        Arc::clone(&self.reporter)
    }
}

/// Bootstraps the daemon using the supplied collaborators.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();
    let (config, telemetry) =
        prepare(loader).inspect_err(|error| reporter.bootstrap_failed(error))?;
    reporter.bootstrap_succeeded(&config);
    Ok(Daemon {
        config,
        telemetry,
        reporter,
    })
}

/// Loads configuration, installs logging and readies the socket directory,
/// stopping at the first failure.
fn prepare(loader: &dyn ConfigLoader) -> Result<(Config, TelemetryHandle), BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;
    config
        .daemon_socket()
        .prepare_filesystem()
        .map_err(|source| BootstrapError::Socket { source })?;
    Ok((config, telemetry))
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use dbgbridge_config::SocketEndpoint;
    use tempfile::TempDir;

    use super::*;
    use crate::health::MockHealthReporter;

    struct FailingConfigLoader;

    impl ConfigLoader for FailingConfigLoader {
        fn load(&self) -> Result<Config, Arc<OrthoError>> {
            Config::load_from_iter([
                OsString::from("dbgbridged"),
                OsString::from("--daemon-socket"),
                OsString::from("invalid://socket"),
            ])
        }
    }

    #[test]
    fn reports_configuration_failure() {
        let mut reporter = MockHealthReporter::new();
        reporter.expect_bootstrap_starting().times(1).return_const(());
        reporter
            .expect_bootstrap_failed()
            .withf(|error| matches!(error, BootstrapError::Configuration { .. }))
            .times(1)
            .return_const(());
        reporter.expect_bootstrap_succeeded().never();

        let result = bootstrap_with(&FailingConfigLoader, Arc::new(reporter));
        assert!(matches!(result, Err(BootstrapError::Configuration { .. })));
    }

    #[test]
    fn prepares_socket_directory_and_reports_success() {
        let dir = TempDir::new().expect("temp dir");
        let socket = dir.path().join("nested").join("bridge.sock");
        let socket = camino::Utf8PathBuf::from_path_buf(socket).expect("utf8 path");
        let config = Config {
            daemon_socket: SocketEndpoint::unix(socket.clone()),
            ..Config::default()
        };

        let mut reporter = MockHealthReporter::new();
        reporter.expect_bootstrap_starting().times(1).return_const(());
        reporter.expect_bootstrap_succeeded().times(1).return_const(());
        reporter.expect_bootstrap_failed().never();

        let daemon = bootstrap_with(&StaticConfigLoader::new(config.clone()), Arc::new(reporter))
            .expect("bootstrap succeeds");
        assert_eq!(daemon.config(), &config);
        assert!(socket.parent().is_some_and(|parent| parent.is_dir()));
    }
}
