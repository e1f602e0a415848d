//! Concrete [`Backend`] implementations.
//!
//! The bridge drives one backend engine. When `backend_program` is
//! configured it is a [`ReplBackend`] over that program; otherwise every
//! command fails with a connection-lost result so clients learn that no
//! engine is attached.

mod repl;
mod unavailable;

use std::sync::Arc;

use dbgbridge_config::Config;

use crate::execution::Backend;

pub use self::repl::ReplBackend;
pub use self::unavailable::UnavailableBackend;

pub(crate) const BACKEND_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::backend");

/// Builds the backend described by `config`.
#[must_use]
pub fn from_config(config: &Config) -> Arc<dyn Backend> {
    match config.backend_program() {
        Some(program) => Arc::new(ReplBackend::new(
            program,
            config.backend_args(),
            config.backend_sentinel(),
        )),
        None => Arc::new(UnavailableBackend),
    }
}
