//! Deadline-bounded execution against the serialized backend engine.
//!
//! The [`BackendGateway`] owns the single shared [`Backend`] and admits one
//! invocation at a time. The [`ExecutionEngine`] races each invocation against
//! a deadline on a dedicated worker thread. When the deadline passes, an
//! invocation still waiting for admission is withdrawn; one that holds the
//! backend gets a cooperative interrupt and is detached if it ignores it.
//! A timeout is reported through [`CommandResult`], never as an error.

mod engine;
mod gateway;
mod result;
#[cfg(test)]
pub(crate) mod test_utils;

pub use self::engine::{EngineSnapshot, ExecutionEngine};
#[cfg(test)]
pub(crate) use self::gateway::MockBackend;
pub use self::gateway::{Backend, BackendGateway, BackendReply};
pub use self::result::{CommandResult, ResultCode};

pub(crate) const EXECUTION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::execution");
