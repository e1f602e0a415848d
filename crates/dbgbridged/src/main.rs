//! Entry point for the `dbgbridged` bridge daemon.

use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match dbgbridged::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(
                target: concat!(env!("CARGO_PKG_NAME"), "::main"),
                error = %error,
                "bridge daemon exited with an error"
            );
            // Telemetry may not be installed when bootstrap itself failed.
            let mut stderr = io::stderr().lock();
            let _ = writeln!(stderr, "dbgbridged: {error}");
            error.exit_code()
        }
    }
}
