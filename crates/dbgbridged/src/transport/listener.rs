//! Endpoint binding and the accept loop.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use dbgbridge_config::SocketEndpoint;

use super::stream::{ConnectionAcceptor, ConnectionStream};
use super::{ListenerError, TRANSPORT_TARGET};

#[cfg(unix)]
use camino::{Utf8Path, Utf8PathBuf};
#[cfg(unix)]
use std::os::unix::net::UnixListener;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Listener bound to the bridge endpoint but not yet accepting.
#[derive(Debug)]
pub(crate) struct SocketListener {
    endpoint: SocketEndpoint,
    bound: Bound,
}

#[derive(Debug)]
enum Bound {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix {
        listener: UnixListener,
        _file: SocketFile,
    },
}

impl Bound {
    fn set_nonblocking(&self) -> io::Result<()> {
        match self {
            Self::Tcp(listener) => listener.set_nonblocking(true),
            #[cfg(unix)]
            Self::Unix { listener, .. } => listener.set_nonblocking(true),
        }
    }

    /// Accepts one pending connection, or `None` when nobody is waiting.
    fn poll_accept(&self) -> io::Result<Option<ConnectionStream>> {
        let accepted = match self {
            Self::Tcp(listener) => listener.accept().and_then(|(stream, _)| {
                stream.set_nonblocking(false)?;
                stream.set_nodelay(true)?;
                Ok(ConnectionStream::Tcp(stream))
            }),
            #[cfg(unix)]
            Self::Unix { listener, .. } => listener.accept().and_then(|(stream, _)| {
                stream.set_nonblocking(false)?;
                Ok(ConnectionStream::Unix(stream))
            }),
        };
        match accepted {
            Ok(stream) => Ok(Some(stream)),
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(error) => Err(error),
        }
    }
}

impl SocketListener {
    /// Binds `endpoint`.
    ///
    /// A unix socket file left behind by a dead process is removed first; a
    /// live one is reported as [`ListenerError::UnixInUse`].
    pub(crate) fn bind(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        let bound = match endpoint {
            SocketEndpoint::Tcp { host, port } => Bound::Tcp(bind_tcp(host, *port)?),
            #[cfg(unix)]
            SocketEndpoint::Unix { path } => {
                reclaim_unix_path(path)?;
                let listener =
                    UnixListener::bind(path).map_err(|source| ListenerError::BindUnix {
                        path: path.clone(),
                        source,
                    })?;
                Bound::Unix {
                    listener,
                    _file: SocketFile(path.clone()),
                }
            }
            #[cfg(not(unix))]
            SocketEndpoint::Unix { .. } => {
                return Err(ListenerError::UnsupportedUnix {
                    endpoint: endpoint.to_string(),
                });
            }
        };
        Ok(Self {
            endpoint: endpoint.clone(),
            bound,
        })
    }

    /// TCP address actually bound, which differs from the endpoint for port 0.
    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        match &self.bound {
            Bound::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            Bound::Unix { .. } => None,
        }
    }

    /// Moves the listener onto a named accept thread.
    ///
    /// Accepted streams are handed to `acceptor` on that thread; when nothing
    /// is pending the acceptor gets an `idle` tick.
    pub(crate) fn start(
        self,
        acceptor: Arc<dyn ConnectionAcceptor>,
    ) -> Result<ListenerHandle, ListenerError> {
        self.bound
            .set_nonblocking()
            .map_err(|source| ListenerError::NonBlocking { source })?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let accept_loop = AcceptLoop {
            listener: self,
            shutdown: Arc::clone(&shutdown),
            acceptor,
        };
        let handle = thread::Builder::new()
            .name("dbgbridge-accept".into())
            .spawn(move || accept_loop.run())
            .map_err(|source| ListenerError::Spawn { source })?;
        Ok(ListenerHandle {
            shutdown,
            handle: Some(handle),
        })
    }
}

/// Control handle for a running accept loop.
#[derive(Debug)]
pub(crate) struct ListenerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Waits for the accept loop to exit and release the endpoint.
    pub(crate) fn join(mut self) -> Result<(), ListenerError> {
        self.handle
            .take()
            .map_or(Ok(()), |handle| handle.join().map_err(|_| ListenerError::ThreadPanic))
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct AcceptLoop {
    listener: SocketListener,
    shutdown: Arc<AtomicBool>,
    acceptor: Arc<dyn ConnectionAcceptor>,
}

impl AcceptLoop {
    fn run(self) {
        let endpoint = &self.listener.endpoint;
        info!(target: TRANSPORT_TARGET, endpoint = %endpoint, "accepting connections");

        let mut failing = None::<io::ErrorKind>;
        while !self.shutdown.load(Ordering::SeqCst) {
            match self.listener.bound.poll_accept() {
                Ok(Some(stream)) => {
                    failing = None;
                    self.acceptor.accept(stream);
                }
                Ok(None) => {
                    self.acceptor.idle();
                    thread::sleep(ACCEPT_BACKOFF);
                }
                Err(error) => {
                    // Repeats of the same failure are logged once.
                    if failing.replace(error.kind()) != Some(error.kind()) {
                        warn!(
                            target: TRANSPORT_TARGET,
                            endpoint = %endpoint,
                            error = %error,
                            "accept failed; backing off"
                        );
                    }
                    thread::sleep(ERROR_BACKOFF);
                }
            }
        }
        info!(target: TRANSPORT_TARGET, endpoint = %endpoint, "accept loop stopped");
    }
}

/// Binds the first resolved address that accepts the bind.
fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let candidates: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?
        .collect();

    let mut last_failure = None;
    for addr in candidates {
        match TcpListener::bind(addr) {
            Ok(listener) => return Ok(listener),
            Err(source) => last_failure = Some(ListenerError::BindTcp { addr, source }),
        }
    }
    Err(last_failure.unwrap_or_else(|| ListenerError::ResolveEmpty {
        host: host.to_owned(),
        port,
    }))
}

/// Clears a stale socket file at `path` so it can be bound again.
#[cfg(unix)]
fn reclaim_unix_path(path: &Utf8Path) -> Result<(), ListenerError> {
    use std::fs;
    use std::os::unix::fs::FileTypeExt;
    use std::os::unix::net::UnixStream;

    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(ListenerError::UnixMetadata {
                path: path.to_owned(),
                source,
            });
        }
    };
    if !metadata.file_type().is_socket() {
        return Err(ListenerError::UnixNotSocket {
            path: path.to_owned(),
        });
    }

    match UnixStream::connect(path) {
        Ok(_live) => Err(ListenerError::UnixInUse {
            path: path.to_owned(),
        }),
        Err(error)
            if matches!(
                error.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
            ) =>
        {
            debug!(target: TRANSPORT_TARGET, path = %path, "removing stale unix socket");
            fs::remove_file(path).map_err(|source| ListenerError::UnixCleanup {
                path: path.to_owned(),
                source,
            })
        }
        Err(source) => Err(ListenerError::UnixConnect {
            path: path.to_owned(),
            source,
        }),
    }
}

/// Socket file created by a bind; removed when the listener goes away.
#[cfg(unix)]
#[derive(Debug)]
struct SocketFile(Utf8PathBuf);

#[cfg(unix)]
impl Drop for SocketFile {
    fn drop(&mut self) {
        if let Err(error) = std::fs::remove_file(&self.0)
            && error.kind() != io::ErrorKind::NotFound
        {
            warn!(
                target: TRANSPORT_TARGET,
                path = %self.0,
                error = %error,
                "failed to remove unix socket file"
            );
        }
    }
}
