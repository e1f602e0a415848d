//! Bridge daemon exposing a single-threaded, blocking command engine to
//! many concurrent clients.
//!
//! The daemon accepts newline-delimited JSON over a Unix domain socket or
//! TCP, routes each request to a registered command handler, and runs the
//! resulting backend command under a deadline. Every backend call passes
//! through one gateway, so the engine never sees overlapping commands no
//! matter how many clients are connected.
//!
//! A command that outlives its deadline is interrupted; if the engine
//! ignores the interrupt the worker is detached and the client still gets a
//! timely `Timeout` reply. Backend failures are folded into a closed
//! [`classify::ErrorCategory`] with an optional remediation hint.
//!
//! The pieces, bottom up:
//!
//! - [`execution`]: gateway, deadline engine and the [`execution::Backend`] seam.
//! - [`backends`]: concrete engines.
//! - [`classify`]: error taxonomy and suggestions.
//! - [`dispatch`]: request parsing, handler registry and response shaping.
//! - [`commands`]: the built-in command set.
//! - [`transport`]: socket server and per-client workers.

pub mod backends;
mod bootstrap;
pub mod classify;
pub mod commands;
pub mod dispatch;
pub mod execution;
mod health;
pub mod metrics;
mod process;
mod telemetry;
pub mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{LaunchError, run_daemon};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
