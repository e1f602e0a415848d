//! Line-oriented engine process driven over its standard streams.

use std::io::{self, BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::execution::{Backend, BackendReply, ResultCode};

use super::BACKEND_TARGET;

const MARKER_PLACEHOLDER: &str = "{marker}";

/// Drives a long-lived engine process one command at a time.
///
/// The process is spawned on first use. After each command the configured
/// sentinel template is sent with a unique marker substituted for
/// `{marker}`; everything printed before the marker line is the command's
/// output. A process that exits is respawned by the next command.
#[derive(Debug)]
pub struct ReplBackend {
    program: String,
    args: Vec<String>,
    sentinel: String,
    session: Mutex<Option<Session>>,
    child_pid: AtomicU32,
    markers: AtomicU64,
}

#[derive(Debug)]
struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl ReplBackend {
    pub fn new(program: impl Into<String>, args: Vec<String>, sentinel: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args,
            sentinel: sentinel.into(),
            session: Mutex::new(None),
            child_pid: AtomicU32::new(0),
            markers: AtomicU64::new(0),
        }
    }

    fn spawn(&self) -> io::Result<Session> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::other("engine process has no standard streams"));
        };
        self.child_pid.store(child.id(), Ordering::SeqCst);
        info!(
            target: BACKEND_TARGET,
            program = %self.program,
            pid = child.id(),
            "backend engine started"
        );
        Ok(Session {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    fn next_marker(&self) -> String {
        let sequence = self.markers.fetch_add(1, Ordering::Relaxed);
        format!("__DBGBRIDGE_DONE_{}_{sequence}__", std::process::id())
    }

    fn run(&self, session: &mut Session, command: &str) -> Result<String, Disconnected> {
        let marker = self.next_marker();
        let sentinel = self.sentinel.replace(MARKER_PLACEHOLDER, &marker);
        writeln!(session.stdin, "{command}")
            .and_then(|()| writeln!(session.stdin, "{sentinel}"))
            .and_then(|()| session.stdin.flush())
            .map_err(|error| Disconnected::new(format!("failed to send command: {error}"), String::new()))?;

        let mut output = String::new();
        let mut line = String::new();
        loop {
            line.clear();
            match session.stdout.read_line(&mut line) {
                Ok(0) => {
                    return Err(Disconnected::new("engine process exited", output));
                }
                Ok(_) => {
                    if line.trim() == marker {
                        break;
                    }
                    output.push_str(&line);
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => {
                    return Err(Disconnected::new(
                        format!("failed to read output: {error}"),
                        output,
                    ));
                }
            }
        }
        Ok(output.trim_end().to_owned())
    }
}

struct Disconnected {
    reason: String,
    partial: String,
}

impl Disconnected {
    fn new(reason: impl Into<String>, partial: String) -> Self {
        Self {
            reason: reason.into(),
            partial,
        }
    }

    fn into_reply(self) -> BackendReply {
        let mut message = format!("backend engine connection lost: {}", self.reason);
        if !self.partial.trim().is_empty() {
            message.push('\n');
            message.push_str(self.partial.trim_end());
        }
        BackendReply::new(message, ResultCode::RPC_DISCONNECTED)
    }
}

impl Backend for ReplBackend {
    fn execute(&self, command: &str, _timeout: Duration) -> BackendReply {
        let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            match self.spawn() {
                Ok(session) => *slot = Some(session),
                Err(error) => {
                    warn!(
                        target: BACKEND_TARGET,
                        program = %self.program,
                        error = %error,
                        "failed to start backend engine"
                    );
                    return BackendReply::new(
                        format!("failed to start backend engine '{}': {error}", self.program),
                        ResultCode::RPC_SERVER_DIED,
                    );
                }
            }
        }
        let Some(session) = slot.as_mut() else {
            return BackendReply::new("backend engine is not running", ResultCode::RPC_SERVER_DIED);
        };

        match self.run(session, command) {
            Ok(output) => BackendReply::ok(output),
            Err(disconnected) => {
                warn!(
                    target: BACKEND_TARGET,
                    command,
                    reason = %disconnected.reason,
                    "backend engine session lost"
                );
                self.child_pid.store(0, Ordering::SeqCst);
                *slot = None;
                disconnected.into_reply()
            }
        }
    }

    #[cfg(unix)]
    fn interrupt(&self) -> bool {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let pid = self.child_pid.load(Ordering::SeqCst);
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        if raw == 0 {
            return false;
        }
        match kill(Pid::from_raw(raw), Signal::SIGINT) {
            Ok(()) => {
                debug!(target: BACKEND_TARGET, pid, "sent interrupt to backend engine");
                true
            }
            Err(errno) => {
                warn!(
                    target: BACKEND_TARGET,
                    pid,
                    error = %errno,
                    "failed to interrupt backend engine"
                );
                false
            }
        }
    }

    #[cfg(not(unix))]
    fn interrupt(&self) -> bool {
        false
    }
}
