//! Live-server harness shared by the behavioural suites.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rstest::fixture;
use serde_json::{Value, json};

use dbgbridge_config::{Config, SocketEndpoint};

use crate::execution::test_utils::ScriptedBackend;
use crate::process::launch::build_server;
use crate::transport::IpcServer;

const REPLY_WAIT: Duration = Duration::from_secs(10);
pub(super) const INTERRUPT_GRACE: Duration = Duration::from_millis(200);

/// A running server in front of a scripted backend.
pub(super) struct BridgeWorld {
    pub(super) backend: Arc<ScriptedBackend>,
    pub(super) server: IpcServer,
    pub(super) endpoint: SocketEndpoint,
}

impl BridgeWorld {
    pub(super) fn start_with(adjust: impl FnOnce(&mut Config)) -> Self {
        let mut config = Config {
            daemon_socket: SocketEndpoint::tcp("127.0.0.1", 0),
            interrupt_grace_ms: INTERRUPT_GRACE.as_millis() as u64,
            default_timeout_ms: 2_000,
            ..Config::default()
        };
        adjust(&mut config);
        let backend = Arc::new(ScriptedBackend::new());
        let server = build_server(&config, backend.clone()).expect("build server");
        let endpoint = config.daemon_socket().clone();
        server.start(&endpoint).expect("start server");
        Self {
            backend,
            server,
            endpoint,
        }
    }

    pub(super) fn address(&self) -> SocketAddr {
        self.server.local_addr().expect("server should be bound")
    }

    pub(super) fn connect(&self) -> Client {
        Client::connect(self.address())
    }

    /// Waits until the server has registered `expected` clients.
    pub(super) fn wait_for_connections(&self, expected: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if self.server.connection_ids().len() >= expected {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }
}

impl Drop for BridgeWorld {
    fn drop(&mut self) {
        self.server.stop();
    }
}

#[fixture]
pub(super) fn world() -> BridgeWorld {
    BridgeWorld::start_with(|_| {})
}

/// Line-oriented JSON client.
pub(super) struct Client {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Client {
    pub(super) fn connect(address: SocketAddr) -> Self {
        let writer = TcpStream::connect(address).expect("connect client");
        writer
            .set_read_timeout(Some(REPLY_WAIT))
            .expect("set read timeout");
        let reader = BufReader::new(writer.try_clone().expect("clone stream"));
        Self { writer, reader }
    }

    pub(super) fn send_line(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).expect("write frame");
        self.writer.write_all(b"\n").expect("write newline");
        self.writer.flush().expect("flush frame");
    }

    pub(super) fn send_command(&mut self, id: i64, command: &str, args: Value) {
        let frame = json!({"type": "command", "id": id, "command": command, "args": args});
        self.send_line(&frame.to_string());
    }

    pub(super) fn recv(&mut self) -> Value {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).expect("read reply");
        assert!(read > 0, "server closed the connection");
        serde_json::from_str(line.trim_end()).expect("reply should be JSON")
    }

    pub(super) fn call(&mut self, id: i64, command: &str, args: Value) -> Value {
        self.send_command(id, command, args);
        self.recv()
    }
}
