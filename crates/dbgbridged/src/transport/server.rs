//! The IPC multiplexer: endpoint ownership and the live connection set.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use dbgbridge_config::{Config, SocketEndpoint};

use super::connection::{
    ClientConnection, ConnectionId, FrameHandler, WorkerSettings, run_worker,
};
use super::listener::{ListenerHandle, SocketListener};
use super::stream::{ConnectionAcceptor, ConnectionStream};
use super::{ServerError, TRANSPORT_TARGET};

const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

impl From<&Config> for WorkerSettings {
    fn from(config: &Config) -> Self {
        Self {
            queue_wait: config.queue_wait(),
            read_poll: config.read_poll(),
            max_frame_bytes: config.max_frame_bytes(),
        }
    }
}

/// Running/not-running report for the hosting process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<SocketEndpoint>,
    pub connections: usize,
}

/// Accepts clients on one endpoint and runs a worker per client.
///
/// `start` and `stop` may be called from any thread, repeatedly.
pub struct IpcServer {
    handler: Arc<dyn FrameHandler>,
    settings: WorkerSettings,
    state: Mutex<Option<Running>>,
}

struct Running {
    endpoint: SocketEndpoint,
    local_addr: Option<SocketAddr>,
    listener: ListenerHandle,
    connections: Arc<ConnectionSet>,
}

impl IpcServer {
    pub fn new(handler: Arc<dyn FrameHandler>, settings: WorkerSettings) -> Self {
        Self {
            handler,
            settings,
            state: Mutex::new(None),
        }
    }

    /// Binds `endpoint` and starts accepting clients.
    ///
    /// Calling `start` again for the endpoint already being served is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Fails when the endpoint cannot be bound, for example because another
    /// process owns it, or when the server already serves another endpoint.
    pub fn start(&self, endpoint: &SocketEndpoint) -> Result<(), ServerError> {
        let mut state = self.lock_state();
        if let Some(running) = state.as_ref() {
            if running.endpoint == *endpoint {
                debug!(
                    target: TRANSPORT_TARGET,
                    endpoint = %endpoint,
                    "server already running"
                );
                return Ok(());
            }
            return Err(ServerError::AlreadyRunning {
                endpoint: running.endpoint.to_string(),
            });
        }

        let listener = SocketListener::bind(endpoint)?;
        let local_addr = listener.local_addr();
        let connections = Arc::new(ConnectionSet::new(Arc::clone(&self.handler), self.settings));
        let acceptor: Arc<dyn ConnectionAcceptor> = connections.clone();
        let handle = listener.start(acceptor)?;
        info!(
            target: TRANSPORT_TARGET,
            endpoint = %endpoint,
            local_addr = ?local_addr,
            "server started"
        );
        *state = Some(Running {
            endpoint: endpoint.clone(),
            local_addr,
            listener: handle,
            connections,
        });
        Ok(())
    }

    /// Stops accepting, closes every connection, and joins all workers.
    ///
    /// A worker calling `stop` on its own server is detached rather than
    /// joined. Stopping a stopped server does nothing.
    pub fn stop(&self) {
        let Some(running) = self.lock_state().take() else {
            return;
        };
        running.listener.shutdown();
        running.connections.deactivate_all();
        if let Err(join_error) = running.listener.join() {
            error!(
                target: TRANSPORT_TARGET,
                error = %join_error,
                "accept loop ended abnormally"
            );
        }
        let joined = running.connections.join_all();
        info!(
            target: TRANSPORT_TARGET,
            endpoint = %running.endpoint,
            workers = joined,
            "server stopped"
        );
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock_state().is_some()
    }

    #[must_use]
    pub fn status(&self) -> ServerStatus {
        match self.lock_state().as_ref() {
            Some(running) => ServerStatus {
                running: true,
                endpoint: Some(running.endpoint.clone()),
                connections: running.connections.active_count(),
            },
            None => ServerStatus {
                running: false,
                endpoint: None,
                connections: 0,
            },
        }
    }

    /// TCP address bound by the running server.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock_state().as_ref().and_then(|running| running.local_addr)
    }

    /// Identifiers of the currently active connections.
    #[must_use]
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections()
            .map(|connections| connections.active_ids())
            .unwrap_or_default()
    }

    /// Queues `message` for one connection. Returns `false` when it is gone.
    pub fn send_message(&self, message: Value, connection: ConnectionId) -> bool {
        self.connections()
            .is_some_and(|connections| connections.send(message, connection))
    }

    /// Queues `message` for every active connection and returns how many
    /// accepted it.
    pub fn broadcast(&self, message: &Value) -> usize {
        self.connections()
            .map_or(0, |connections| connections.broadcast(message))
    }

    fn connections(&self) -> Option<Arc<ConnectionSet>> {
        self.lock_state()
            .as_ref()
            .map(|running| Arc::clone(&running.connections))
    }

    fn lock_state(&self) -> MutexGuard<'_, Option<Running>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for IpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcServer")
            .field("settings", &self.settings)
            .field("status", &self.status())
            .finish()
    }
}

/// Live connections of one running server.
struct ConnectionSet {
    handler: Arc<dyn FrameHandler>,
    settings: WorkerSettings,
    next_id: AtomicU64,
    connections: Mutex<HashMap<ConnectionId, Arc<ClientConnection>>>,
    last_sweep: Mutex<Instant>,
}

impl ConnectionSet {
    fn new(handler: Arc<dyn FrameHandler>, settings: WorkerSettings) -> Self {
        Self {
            handler,
            settings,
            next_id: AtomicU64::new(1),
            connections: Mutex::new(HashMap::new()),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Arc<ClientConnection>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, message: Value, id: ConnectionId) -> bool {
        let connection = self.lock().get(&id).cloned();
        connection.is_some_and(|connection| connection.enqueue(message))
    }

    fn broadcast(&self, message: &Value) -> usize {
        let connections: Vec<_> = self.lock().values().cloned().collect();
        connections
            .iter()
            .filter(|connection| connection.enqueue(message.clone()))
            .count()
    }

    fn active_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self
            .lock()
            .values()
            .filter(|connection| connection.is_active())
            .map(|connection| connection.id())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Connections still held in the map, finished or not.
    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.lock().len()
    }

    fn active_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|connection| connection.is_active())
            .count()
    }

    fn deactivate_all(&self) {
        for connection in self.lock().values() {
            connection.deactivate();
        }
    }

    /// Joins every worker, skipping the calling thread's own.
    fn join_all(&self) -> usize {
        let drained: Vec<_> = self.lock().drain().map(|(_, connection)| connection).collect();
        let current = thread::current().id();
        let mut joined = 0;
        for connection in drained {
            connection.deactivate();
            let Some(handle) = connection.take_worker() else {
                continue;
            };
            if handle.thread().id() == current {
                debug!(
                    target: TRANSPORT_TARGET,
                    connection = %connection.id(),
                    "detaching worker that requested shutdown"
                );
                continue;
            }
            if handle.join().is_err() {
                warn!(
                    target: TRANSPORT_TARGET,
                    connection = %connection.id(),
                    "client worker panicked"
                );
            }
            joined += 1;
        }
        joined
    }

    /// Joins and forgets workers that have already returned.
    fn sweep(&self) {
        let finished: Vec<_> = {
            let mut connections = self.lock();
            let ids: Vec<_> = connections
                .iter()
                .filter(|(_, connection)| connection.worker_finished())
                .map(|(id, _)| *id)
                .collect();
            ids.iter()
                .filter_map(|id| connections.remove(id))
                .collect()
        };
        for connection in finished {
            if let Some(handle) = connection.take_worker()
                && handle.join().is_err()
            {
                warn!(
                    target: TRANSPORT_TARGET,
                    connection = %connection.id(),
                    "client worker panicked"
                );
            }
            debug!(
                target: TRANSPORT_TARGET,
                connection = %connection.id(),
                "reaped client worker"
            );
        }
        *self
            .last_sweep
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }
}

impl ConnectionAcceptor for ConnectionSet {
    fn accept(&self, stream: ConnectionStream) {
        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let connection = Arc::new(ClientConnection::new(id, stream.peer()));
        let worker_connection = Arc::clone(&connection);
        let handler = Arc::clone(&self.handler);
        let settings = self.settings;
        // Registered before spawning so a concurrent stop always sees it.
        self.lock().insert(id, Arc::clone(&connection));
        let spawned = thread::Builder::new()
            .name(format!("dbgbridge-{id}"))
            .spawn(move || run_worker(&worker_connection, stream, handler.as_ref(), settings));
        match spawned {
            Ok(handle) => connection.attach_worker(handle),
            Err(spawn_error) => {
                error!(
                    target: TRANSPORT_TARGET,
                    connection = %id,
                    error = %spawn_error,
                    "failed to spawn client worker"
                );
                connection.deactivate();
                self.lock().remove(&id);
            }
        }
        self.sweep();
    }

    fn idle(&self) {
        let due = self
            .last_sweep
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
            >= SWEEP_INTERVAL;
        if due {
            self.sweep();
        }
    }
}
