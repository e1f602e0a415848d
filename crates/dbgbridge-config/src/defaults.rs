//! Built-in configuration values.

#[cfg(unix)]
use std::env;

#[cfg(unix)]
use camino::Utf8PathBuf;

use crate::socket::SocketEndpoint;

#[cfg(unix)]
const SOCKET_DIRECTORY: &str = "dbgbridge";
#[cfg(unix)]
const SOCKET_FILE: &str = "dbgbridged.sock";

/// Default TCP port used when Unix domain sockets are not available.
pub const DEFAULT_TCP_PORT: u16 = 9780;

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Deadline applied to commands that do not carry `timeout_ms`.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Grace period granted to a backend after an interrupt request.
pub const DEFAULT_INTERRUPT_GRACE_MS: u64 = 500;

/// Bounded wait on a client's outgoing queue per worker iteration.
pub const DEFAULT_QUEUE_WAIT_MS: u64 = 25;

/// Inbound read timeout per worker iteration.
pub const DEFAULT_READ_POLL_MS: u64 = 50;

/// Upper bound for a single buffered frame.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Backoff between failed listener start attempts.
pub const DEFAULT_BIND_RETRY_MS: u64 = 1_000;

/// Command template that makes a line-oriented engine echo the completion
/// marker. `{marker}` is substituted per call.
pub const DEFAULT_BACKEND_SENTINEL: &str = ".echo {marker}";

pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

pub fn default_backend_sentinel() -> String {
    DEFAULT_BACKEND_SENTINEL.to_owned()
}

/// Well-known endpoint used when nothing else is configured.
///
/// On unix this is `dbgbridge/dbgbridged.sock` under the user runtime
/// directory. Without a runtime directory the socket goes under the system
/// temp directory, namespaced by effective uid so users never collide.
pub fn default_socket_endpoint() -> SocketEndpoint {
    #[cfg(unix)]
    {
        let directory = match dirs::runtime_dir().and_then(utf8) {
            Some(runtime) => runtime.join(SOCKET_DIRECTORY),
            None => {
                let temp = utf8(env::temp_dir()).unwrap_or_else(|| Utf8PathBuf::from("/tmp"));
                // SAFETY: geteuid has no preconditions and cannot fail.
                let uid = unsafe { libc::geteuid() };
                temp.join(SOCKET_DIRECTORY).join(format!("uid-{uid}"))
            }
        };
        SocketEndpoint::unix(directory.join(SOCKET_FILE))
    }

    #[cfg(not(unix))]
    {
        SocketEndpoint::tcp("127.0.0.1", DEFAULT_TCP_PORT)
    }
}

#[cfg(unix)]
fn utf8(path: std::path::PathBuf) -> Option<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(path).ok()
}
