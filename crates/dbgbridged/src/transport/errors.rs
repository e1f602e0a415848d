//! Transport error types.

use std::io;
use std::net::SocketAddr;

#[cfg(unix)]
use camino::Utf8PathBuf;
use thiserror::Error;

/// Failures binding the endpoint or running the accept thread.
///
/// Variants that only exist on unix describe the socket-file lifecycle:
/// probing for a live owner, removing stale files, and refusing paths that
/// hold something other than a socket.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("cannot resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("{host}:{port} resolved to no addresses")]
    ResolveEmpty { host: String, port: u16 },
    #[error("cannot bind {addr}: {source}")]
    BindTcp {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("cannot switch the listener to non-blocking mode: {source}")]
    NonBlocking {
        #[source]
        source: io::Error,
    },
    #[cfg(not(unix))]
    #[error("{endpoint} needs unix domain sockets, which this platform lacks")]
    UnsupportedUnix { endpoint: String },
    #[cfg(unix)]
    #[error("cannot bind unix socket {path}: {source}")]
    BindUnix {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[cfg(unix)]
    #[error("unix socket {path} is held by a running process")]
    UnixInUse { path: Utf8PathBuf },
    #[cfg(unix)]
    #[error("{path} exists and is not a unix socket")]
    UnixNotSocket { path: Utf8PathBuf },
    #[cfg(unix)]
    #[error("cannot inspect {path}: {source}")]
    UnixMetadata {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[cfg(unix)]
    #[error("cannot probe unix socket {path}: {source}")]
    UnixConnect {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[cfg(unix)]
    #[error("cannot remove stale unix socket {path}: {source}")]
    UnixCleanup {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot spawn the accept thread: {source}")]
    Spawn {
        #[source]
        source: io::Error,
    },
    #[error("accept thread panicked")]
    ThreadPanic,
}

impl ListenerError {
    /// Returns `true` when another process already owns the endpoint.
    #[must_use]
    pub fn is_in_use(&self) -> bool {
        match self {
            Self::BindTcp { source, .. } => source.kind() == io::ErrorKind::AddrInUse,
            #[cfg(unix)]
            Self::UnixInUse { .. } => true,
            #[cfg(unix)]
            Self::BindUnix { source, .. } => source.kind() == io::ErrorKind::AddrInUse,
            _ => false,
        }
    }

    /// Returns `true` when retrying the bind later may succeed.
    ///
    /// Resolution failures and non-socket files at the configured path are
    /// configuration mistakes and never resolve themselves.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Resolve { .. } | Self::ResolveEmpty { .. } => false,
            #[cfg(unix)]
            Self::UnixNotSocket { .. } => false,
            #[cfg(not(unix))]
            Self::UnsupportedUnix { .. } => false,
            _ => true,
        }
    }
}

/// Errors surfaced by the [`IpcServer`](super::IpcServer) control plane.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to start listener: {source}")]
    Listener {
        #[from]
        source: ListenerError,
    },
    #[error("server is already running on {endpoint}")]
    AlreadyRunning { endpoint: String },
}

impl ServerError {
    /// Returns `true` when the endpoint is held by someone else and a later
    /// start attempt may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Listener { source } => source.is_retryable(),
            Self::AlreadyRunning { .. } => false,
        }
    }
}
