//! Wires the bridge together and supervises the listener.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::info;

use dbgbridge_config::Config;

use crate::backends;
use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::commands::builtin_registry;
use crate::dispatch::{DispatchContext, Dispatcher};
use crate::execution::{Backend, BackendGateway, ExecutionEngine};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::metrics::SessionMetrics;
use crate::transport::{FrameHandler, IpcServer, WorkerSettings};

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

const RETRY_SLICE: Duration = Duration::from_millis(50);

/// Runs the daemon with production collaborators until a termination
/// signal arrives.
pub fn run_daemon() -> Result<(), LaunchError> {
    let shutdown = SystemShutdownSignal::install()?;
    let reporter = Arc::new(StructuredHealthReporter::new());
    run_daemon_with(&SystemConfigLoader, reporter, &shutdown)
}

pub(crate) fn run_daemon_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    shutdown: &dyn ShutdownSignal,
) -> Result<(), LaunchError> {
    let daemon = bootstrap_with(loader, reporter)?;
    let config = daemon.config();
    let reporter = daemon.reporter();

    let server = build_server(config, backends::from_config(config))?;
    if !start_with_retry(&server, config, reporter.as_ref(), shutdown)? {
        info!(target: PROCESS_TARGET, "shutdown requested before the server started");
        return Ok(());
    }
    reporter.listener_bound(config.daemon_socket());

    shutdown.wait();
    let status = server.status();
    server.stop();
    reporter.server_stopped(&status);
    Ok(())
}

/// Builds a stopped server whose commands run against `backend`.
pub(crate) fn build_server(
    config: &Config,
    backend: Arc<dyn Backend>,
) -> Result<IpcServer, LaunchError> {
    let gateway = Arc::new(BackendGateway::new(backend));
    let engine = Arc::new(ExecutionEngine::new(gateway, config.interrupt_grace()));
    let metrics = Arc::new(SessionMetrics::new());
    info!(
        target: PROCESS_TARGET,
        session_id = metrics.session_id(),
        "bridge session created"
    );
    let context = DispatchContext::new(engine, metrics, config.default_timeout());
    let dispatcher: Arc<dyn FrameHandler> =
        Arc::new(Dispatcher::new(builtin_registry()?, context));
    Ok(IpcServer::new(dispatcher, WorkerSettings::from(config)))
}

/// Starts `server`, backing off between retryable failures.
///
/// Returns `false` when shutdown was requested before a start succeeded.
fn start_with_retry(
    server: &IpcServer,
    config: &Config,
    reporter: &dyn HealthReporter,
    shutdown: &dyn ShutdownSignal,
) -> Result<bool, LaunchError> {
    let backoff = config.bind_retry();
    loop {
        if shutdown.requested() {
            return Ok(false);
        }
        match server.start(config.daemon_socket()) {
            Ok(()) => return Ok(true),
            Err(error) if error.is_retryable() => {
                reporter.bind_retry(&error, backoff);
                if !sleep_unless_shutdown(backoff, shutdown) {
                    return Ok(false);
                }
            }
            Err(error) => return Err(error.into()),
        }
    }
}

fn sleep_unless_shutdown(duration: Duration, shutdown: &dyn ShutdownSignal) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if shutdown.requested() {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        thread::sleep(remaining.min(RETRY_SLICE));
    }
}
