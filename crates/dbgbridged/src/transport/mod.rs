//! Socket transport for the bridge.
//!
//! [`IpcServer`] binds the configured endpoint, accepts any number of
//! clients on a background thread, and gives each client its own worker.
//! Workers exchange newline-delimited JSON with the client and hand every
//! complete frame to a [`FrameHandler`].

mod connection;
mod errors;
mod frame;
mod listener;
mod server;
mod stream;

pub use self::connection::{ConnectionId, FrameHandler, WorkerSettings};
pub use self::errors::{ListenerError, ServerError};
pub use self::server::{IpcServer, ServerStatus};

pub(crate) const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
