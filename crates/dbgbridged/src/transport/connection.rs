//! Per-client connection state and its worker loop.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::TRANSPORT_TARGET;
use super::frame::{Frame, FrameBuffer};
use super::stream::ConnectionStream;

const READ_CHUNK_BYTES: usize = 4096;
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Server-assigned identifier of one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Produces the reply for each inbound frame.
pub trait FrameHandler: Send + Sync + 'static {
    /// Reply to one complete frame.
    fn handle_frame(&self, frame: &[u8]) -> Value;

    /// Reply to a frame that could not be accepted, such as one over the size
    /// limit.
    fn reject_frame(&self, reason: &str) -> Value;
}

/// Timing and size limits applied by every worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Bounded wait on the outgoing queue per iteration.
    pub queue_wait: Duration,
    /// Read timeout per iteration.
    pub read_poll: Duration,
    pub max_frame_bytes: usize,
}

/// Shared state of one client connection.
pub(crate) struct ClientConnection {
    id: ConnectionId,
    peer: String,
    active: AtomicBool,
    outgoing: Mutex<VecDeque<Value>>,
    ready: Condvar,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ClientConnection {
    pub(crate) fn new(id: ConnectionId, peer: String) -> Self {
        Self {
            id,
            peer,
            active: AtomicBool::new(true),
            outgoing: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            worker: Mutex::new(None),
        }
    }

    pub(crate) fn id(&self) -> ConnectionId {
        self.id
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Queues a server-initiated message. Never blocks on I/O.
    pub(crate) fn enqueue(&self, message: Value) -> bool {
        if !self.is_active() {
            return false;
        }
        self.lock_outgoing().push_back(message);
        self.ready.notify_one();
        true
    }

    /// Marks the connection closed and wakes its worker.
    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
        // Taking the lock orders the store before a waiter re-checks it.
        drop(self.lock_outgoing());
        self.ready.notify_all();
    }

    pub(crate) fn attach_worker(&self, handle: JoinHandle<()>) {
        *self.lock_worker() = Some(handle);
    }

    pub(crate) fn take_worker(&self) -> Option<JoinHandle<()>> {
        self.lock_worker().take()
    }

    /// Returns `true` once the worker has returned or was never attached.
    pub(crate) fn worker_finished(&self) -> bool {
        self.lock_worker()
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }

    /// Waits up to `wait` for queued messages and takes all of them.
    fn drain_outgoing(&self, wait: Duration) -> Vec<Value> {
        let queue = self.lock_outgoing();
        let (mut queue, _) = self
            .ready
            .wait_timeout_while(queue, wait, |queue| queue.is_empty() && self.is_active())
            .unwrap_or_else(PoisonError::into_inner);
        queue.drain(..).collect()
    }

    fn lock_outgoing(&self) -> MutexGuard<'_, VecDeque<Value>> {
        self.outgoing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

/// Services one client until it disconnects or the server stops.
///
/// Each iteration flushes queued server messages, then polls for inbound
/// bytes. Complete frames are answered in arrival order.
pub(crate) fn run_worker(
    connection: &ClientConnection,
    mut stream: ConnectionStream,
    handler: &dyn FrameHandler,
    settings: WorkerSettings,
) {
    if let Err(error) = configure(&stream, settings) {
        warn!(
            target: TRANSPORT_TARGET,
            connection = %connection.id,
            error = %error,
            "failed to configure client stream"
        );
        connection.deactivate();
        return;
    }
    debug!(
        target: TRANSPORT_TARGET,
        connection = %connection.id,
        peer = %connection.peer,
        "client connected"
    );

    let mut frames = FrameBuffer::new(settings.max_frame_bytes);
    let mut chunk = vec![0_u8; READ_CHUNK_BYTES];
    'serve: while connection.is_active() {
        for message in connection.drain_outgoing(settings.queue_wait) {
            if let Err(error) = write_message(&mut stream, &message) {
                log_io_failure(connection, &error);
                break 'serve;
            }
        }
        if !connection.is_active() {
            break;
        }

        let read = match stream.read(&mut chunk) {
            Ok(0) => {
                debug!(
                    target: TRANSPORT_TARGET,
                    connection = %connection.id,
                    "client disconnected"
                );
                break;
            }
            Ok(read) => read,
            Err(error) if is_poll_timeout(&error) => continue,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => {
                log_io_failure(connection, &error);
                break;
            }
        };

        for frame in frames.push(&chunk[..read]) {
            let reply = match frame {
                Frame::Complete(bytes) => handler.handle_frame(&bytes),
                Frame::Oversized { limit } => {
                    handler.reject_frame(&format!("frame exceeds {limit} bytes"))
                }
            };
            if let Err(error) = write_message(&mut stream, &reply) {
                log_io_failure(connection, &error);
                break 'serve;
            }
        }
    }
    connection.deactivate();
}

fn configure(stream: &ConnectionStream, settings: WorkerSettings) -> io::Result<()> {
    stream.set_read_timeout(settings.read_poll)?;
    stream.set_write_timeout(WRITE_TIMEOUT)
}

fn write_message(stream: &mut ConnectionStream, message: &Value) -> io::Result<()> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    stream.write_all(&line)?;
    stream.flush()
}

fn is_poll_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

fn log_io_failure(connection: &ClientConnection, error: &io::Error) {
    warn!(
        target: TRANSPORT_TARGET,
        connection = %connection.id,
        error = %error,
        "client connection failed"
    );
}
