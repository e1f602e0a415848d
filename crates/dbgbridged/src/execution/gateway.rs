//! Narrow adapter around the single shared backend engine.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use super::EXECUTION_TARGET;
use super::result::ResultCode;

/// Raw reply from one backend invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendReply {
    pub output: String,
    pub code: ResultCode,
}

impl BackendReply {
    /// Builds a reply from captured output and a status word.
    pub fn new(output: impl Into<String>, code: ResultCode) -> Self {
        Self {
            output: output.into(),
            code,
        }
    }

    /// Builds a successful reply.
    pub fn ok(output: impl Into<String>) -> Self {
        Self::new(output, ResultCode::OK)
    }
}

/// Blocking, single-threaded command engine.
///
/// Implementations may block for arbitrarily long inside
/// [`Backend::execute`]. Cancellation is cooperative only: [`Backend::interrupt`]
/// is called from a different thread while `execute` is in progress and may
/// be ignored.
#[cfg_attr(test, mockall::automock)]
pub trait Backend: Send + Sync {
    /// Runs one command and returns its captured output.
    fn execute(&self, command: &str, timeout: Duration) -> BackendReply;

    /// Requests that the in-flight command stop. Returns `true` when the
    /// request was delivered.
    fn interrupt(&self) -> bool;
}

/// Where one invocation stands relative to the admission lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Queued,
    Running,
    Finished,
    Withdrawn,
}

/// Admission state of one invocation, shared by its caller and its worker.
#[derive(Debug)]
pub(crate) struct Ticket {
    sequence: u64,
    stage: Mutex<Stage>,
}

impl Ticket {
    pub(crate) fn new(sequence: u64) -> Self {
        Self {
            sequence,
            stage: Mutex::new(Stage::Queued),
        }
    }

    pub(crate) fn sequence(&self) -> u64 {
        self.sequence
    }

    fn stage(&self) -> MutexGuard<'_, Stage> {
        self.stage.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks a ticket finished once the backend call returns or unwinds.
struct FinishOnDrop<'a>(&'a Ticket);

impl Drop for FinishOnDrop<'_> {
    fn drop(&mut self) {
        *self.0.stage() = Stage::Finished;
    }
}

/// What a deadline did to an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Preemption {
    /// The invocation never reached the backend and never will.
    Withdrawn,
    /// The invocation was running and the backend was asked to stop it.
    Interrupted { delivered: bool },
    /// The backend had already returned.
    Finished,
}

/// Serializes every call into the shared [`Backend`].
///
/// Callers never overlap inside `execute`; a second caller starts only after
/// the first has returned. Interrupts are tied to a [`Ticket`], so one
/// caller's deadline can only stop its own command.
pub struct BackendGateway {
    backend: Arc<dyn Backend>,
    admission: Mutex<()>,
}

impl BackendGateway {
    /// Wraps the shared backend.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            admission: Mutex::new(()),
        }
    }

    /// Runs `command` once the backend is free.
    ///
    /// Returns `None` without touching the backend when the ticket was
    /// withdrawn while waiting for admission.
    pub(crate) fn invoke(
        &self,
        ticket: &Ticket,
        command: &str,
        timeout: Duration,
    ) -> Option<BackendReply> {
        let _admitted = self
            .admission
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        {
            let mut stage = ticket.stage();
            if *stage == Stage::Withdrawn {
                debug!(
                    target: EXECUTION_TARGET,
                    command,
                    sequence = ticket.sequence,
                    "skipping command withdrawn before admission"
                );
                return None;
            }
            *stage = Stage::Running;
        }
        let _finish = FinishOnDrop(ticket);
        Some(self.backend.execute(command, timeout))
    }

    /// Acts on a passed deadline for `ticket`.
    ///
    /// A queued invocation is withdrawn; only a running one reaches
    /// [`Backend::interrupt`]. The ticket lock is held across the interrupt
    /// so the backend cannot move on to another caller's command meanwhile.
    pub(crate) fn preempt(&self, ticket: &Ticket) -> Preemption {
        let mut stage = ticket.stage();
        match *stage {
            Stage::Queued => {
                *stage = Stage::Withdrawn;
                Preemption::Withdrawn
            }
            Stage::Running => Preemption::Interrupted {
                delivered: self.backend.interrupt(),
            },
            Stage::Finished | Stage::Withdrawn => Preemption::Finished,
        }
    }
}

impl std::fmt::Debug for BackendGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendGateway").finish_non_exhaustive()
    }
}
