use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use thiserror::Error;
use tracing::info;

use super::PROCESS_TARGET;

const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Source of shutdown requests.
pub trait ShutdownSignal: Send + Sync {
    /// Returns `true` once shutdown has been requested.
    fn requested(&self) -> bool;

    /// Blocks until shutdown has been requested.
    fn wait(&self) {
        while !self.requested() {
            thread::sleep(SHUTDOWN_POLL);
        }
    }
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        #[source]
        source: io::Error,
    },
}

/// Shutdown flag raised by termination signals.
#[derive(Debug, Clone)]
pub struct SystemShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl SystemShutdownSignal {
    /// Registers handlers for `SIGTERM`, `SIGINT`, `SIGQUIT` and `SIGHUP`.
    pub fn install() -> Result<Self, ShutdownError> {
        let flag = Arc::new(AtomicBool::new(false));
        for signal in [SIGTERM, SIGINT, SIGQUIT, SIGHUP] {
            signal_hook::flag::register(signal, Arc::clone(&flag))
                .map_err(|source| ShutdownError::Install { source })?;
        }
        Ok(Self { flag })
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn wait(&self) {
        while !self.requested() {
            thread::sleep(SHUTDOWN_POLL);
        }
        info!(target: PROCESS_TARGET, "shutdown signal received");
    }
}

/// Shutdown flag raised by hand.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub(crate) struct ManualShutdown {
    flag: Arc<AtomicBool>,
}

#[cfg(test)]
impl ManualShutdown {
    pub(crate) fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
impl ShutdownSignal for ManualShutdown {
    fn requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
