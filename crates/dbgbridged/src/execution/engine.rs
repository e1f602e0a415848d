//! Deadline race between a backend invocation and its caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, warn};

use super::EXECUTION_TARGET;
use super::gateway::{BackendGateway, BackendReply, Preemption, Ticket};
use super::result::CommandResult;

/// Counters describing how invocations ended.
#[derive(Debug, Default)]
struct EngineStats {
    completed: AtomicU64,
    timed_out: AtomicU64,
    interrupted: AtomicU64,
    detached: AtomicU64,
    withdrawn: AtomicU64,
}

/// Point-in-time copy of the engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineSnapshot {
    pub completed: u64,
    pub timed_out: u64,
    pub interrupted: u64,
    pub detached: u64,
    /// Timed out while still queued behind another command.
    pub withdrawn: u64,
}

/// Runs backend commands under a deadline.
///
/// Each call gets its own worker thread. On timeout the engine asks the
/// backend to stop and waits at most `grace` longer; a worker still running
/// after that is detached and its eventual result dropped.
#[derive(Debug)]
pub struct ExecutionEngine {
    gateway: Arc<BackendGateway>,
    grace: Duration,
    sequence: AtomicU64,
    stats: EngineStats,
}

impl ExecutionEngine {
    /// Builds an engine over `gateway` with the given interrupt grace period.
    pub fn new(gateway: Arc<BackendGateway>, grace: Duration) -> Self {
        Self {
            gateway,
            grace,
            sequence: AtomicU64::new(0),
            stats: EngineStats::default(),
        }
    }

    /// Runs `command`, returning no later than `timeout + grace`.
    pub fn run_with_timeout(&self, command: &str, timeout: Duration) -> CommandResult {
        let started = Instant::now();
        let ticket = Arc::new(Ticket::new(self.sequence.fetch_add(1, Ordering::Relaxed)));
        let (sender, receiver) = mpsc::channel();
        let worker = match self.spawn_worker(command, timeout, &ticket, sender) {
            Ok(worker) => worker,
            Err(spawn_error) => {
                error!(
                    target: EXECUTION_TARGET,
                    command,
                    error = %spawn_error,
                    "failed to spawn execution worker"
                );
                return CommandResult::internal(
                    format!("failed to start execution worker: {spawn_error}"),
                    started.elapsed(),
                );
            }
        };

        match receiver.recv_timeout(timeout) {
            Ok(reply) => {
                join_finished(worker);
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                let elapsed = started.elapsed();
                debug!(
                    target: EXECUTION_TARGET,
                    command,
                    code = %reply.code,
                    elapsed_ms = elapsed.as_millis(),
                    "command completed"
                );
                CommandResult::completed(reply.output, reply.code, elapsed)
            }
            Err(RecvTimeoutError::Disconnected) => {
                join_finished(worker);
                error!(
                    target: EXECUTION_TARGET,
                    command,
                    "execution worker exited without a result"
                );
                CommandResult::internal(
                    "backend invocation failed without a result",
                    started.elapsed(),
                )
            }
            Err(RecvTimeoutError::Timeout) => {
                self.after_deadline(command, timeout, started, &ticket, worker, &receiver)
            }
        }
    }

    fn spawn_worker(
        &self,
        command: &str,
        timeout: Duration,
        ticket: &Arc<Ticket>,
        sender: mpsc::Sender<BackendReply>,
    ) -> std::io::Result<JoinHandle<()>> {
        let gateway = Arc::clone(&self.gateway);
        let ticket = Arc::clone(ticket);
        let command = command.to_owned();
        thread::Builder::new()
            .name(format!("dbgbridge-exec-{}", ticket.sequence()))
            .spawn(move || {
                if let Some(reply) = gateway.invoke(&ticket, &command, timeout)
                    && sender.send(reply).is_err()
                {
                    debug!(
                        target: EXECUTION_TARGET,
                        command = %command,
                        "late result discarded"
                    );
                }
            })
    }

    fn after_deadline(
        &self,
        command: &str,
        timeout: Duration,
        started: Instant,
        ticket: &Ticket,
        worker: JoinHandle<()>,
        receiver: &mpsc::Receiver<BackendReply>,
    ) -> CommandResult {
        let delivered = match self.gateway.preempt(ticket) {
            Preemption::Withdrawn => {
                self.stats.timed_out.fetch_add(1, Ordering::Relaxed);
                self.stats.withdrawn.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: EXECUTION_TARGET,
                    command,
                    timeout_ms = timeout.as_millis(),
                    "command deadline elapsed while queued, withdrawn"
                );
                // The worker is parked on admission and will skip the backend.
                drop(worker);
                return CommandResult::abandoned(started.elapsed());
            }
            Preemption::Finished => {
                return self.collect_finished(command, started, worker, receiver);
            }
            Preemption::Interrupted { delivered } => delivered,
        };

        self.stats.timed_out.fetch_add(1, Ordering::Relaxed);
        warn!(
            target: EXECUTION_TARGET,
            command,
            timeout_ms = timeout.as_millis(),
            interrupt_delivered = delivered,
            "command deadline elapsed, interrupt requested"
        );

        match receiver.recv_timeout(self.grace) {
            Ok(reply) => {
                join_finished(worker);
                self.stats.interrupted.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: EXECUTION_TARGET,
                    command,
                    "command stopped after interrupt"
                );
                CommandResult::interrupted(reply.output, started.elapsed())
            }
            Err(RecvTimeoutError::Disconnected) => {
                join_finished(worker);
                CommandResult::abandoned(started.elapsed())
            }
            Err(RecvTimeoutError::Timeout) => {
                self.stats.detached.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: EXECUTION_TARGET,
                    command,
                    grace_ms = self.grace.as_millis(),
                    thread = worker.thread().name().unwrap_or("unnamed"),
                    "command ignored interrupt, detaching worker"
                );
                drop(worker);
                CommandResult::abandoned(started.elapsed())
            }
        }
    }

    /// The backend returned just as the deadline passed; its reply is
    /// already on the way.
    fn collect_finished(
        &self,
        command: &str,
        started: Instant,
        worker: JoinHandle<()>,
        receiver: &mpsc::Receiver<BackendReply>,
    ) -> CommandResult {
        let outcome = receiver.recv_timeout(self.grace);
        join_finished(worker);
        match outcome {
            Ok(reply) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    target: EXECUTION_TARGET,
                    command,
                    code = %reply.code,
                    "command completed at its deadline"
                );
                CommandResult::completed(reply.output, reply.code, started.elapsed())
            }
            Err(_) => CommandResult::internal(
                "backend invocation failed without a result",
                started.elapsed(),
            ),
        }
    }

    /// Current invocation counters.
    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            completed: self.stats.completed.load(Ordering::Relaxed),
            timed_out: self.stats.timed_out.load(Ordering::Relaxed),
            interrupted: self.stats.interrupted.load(Ordering::Relaxed),
            detached: self.stats.detached.load(Ordering::Relaxed),
            withdrawn: self.stats.withdrawn.load(Ordering::Relaxed),
        }
    }
}

/// Joins a worker that has already sent its result or dropped its sender.
fn join_finished(worker: JoinHandle<()>) {
    if worker.join().is_err() {
        error!(target: EXECUTION_TARGET, "execution worker panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::test_utils::{ScriptedBackend, Step};
    use crate::execution::{MockBackend, ResultCode};
    use rstest::{fixture, rstest};

    const GRACE: Duration = Duration::from_millis(200);

    #[fixture]
    fn scripted() -> Arc<ScriptedBackend> {
        Arc::new(ScriptedBackend::new())
    }

    fn engine_over(backend: Arc<ScriptedBackend>) -> ExecutionEngine {
        ExecutionEngine::new(Arc::new(BackendGateway::new(backend)), GRACE)
    }

    #[rstest]
    fn fast_commands_return_true_output(scripted: Arc<ScriptedBackend>) {
        scripted.push(Step::reply_after(
            Duration::from_millis(20),
            BackendReply::new("done", ResultCode::new(0x1)),
        ));
        let engine = engine_over(Arc::clone(&scripted));

        let started = Instant::now();
        let result = engine.run_with_timeout("k", Duration::from_secs(2));

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(result.output, "done");
        assert_eq!(result.code, ResultCode::new(0x1));
        assert!(!result.timed_out);
        assert_eq!(engine.snapshot().completed, 1);
    }

    #[rstest]
    fn hung_commands_are_detached_within_grace(scripted: Arc<ScriptedBackend>) {
        scripted.push(Step::hang_ignoring_interrupt(Duration::from_secs(3)));
        let engine = engine_over(Arc::clone(&scripted));
        let timeout = Duration::from_millis(50);

        let started = Instant::now();
        let result = engine.run_with_timeout("!analyze -v", timeout);

        assert!(started.elapsed() < timeout + GRACE + Duration::from_millis(300));
        assert!(result.timed_out);
        assert!(!result.interrupted);
        assert_eq!(result.code, ResultCode::ABORT);
        assert_eq!(scripted.interrupts(), 1);
        assert_eq!(engine.snapshot().detached, 1);
    }

    #[rstest]
    fn cooperative_commands_report_interruption(scripted: Arc<ScriptedBackend>) {
        scripted.push(Step::hang_until_interrupted("partial listing"));
        let engine = engine_over(Arc::clone(&scripted));

        let result = engine.run_with_timeout("lm", Duration::from_millis(50));

        assert!(result.timed_out);
        assert!(result.interrupted);
        assert_eq!(result.output, "partial listing");
        assert_eq!(engine.snapshot().interrupted, 1);
    }

    #[rstest]
    fn queued_commands_wait_for_the_previous_one(scripted: Arc<ScriptedBackend>) {
        scripted.push(Step::reply_after(
            Duration::from_millis(150),
            BackendReply::ok("first"),
        ));
        scripted.push(Step::reply_after(Duration::ZERO, BackendReply::ok("second")));
        let engine = Arc::new(engine_over(Arc::clone(&scripted)));

        let first = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.run_with_timeout("first", Duration::from_secs(2)))
        };
        thread::sleep(Duration::from_millis(30));
        let second = engine.run_with_timeout("second", Duration::from_secs(2));
        let first = first.join().expect("first caller");

        assert_eq!(first.output, "first");
        assert_eq!(second.output, "second");
        let spans = scripted.spans();
        assert_eq!(spans.len(), 2);
        assert!(spans[1].0 >= spans[0].1, "executions overlapped: {spans:?}");
    }

    #[rstest]
    fn queued_deadline_leaves_the_running_command_alone(scripted: Arc<ScriptedBackend>) {
        scripted.push(Step::hang_until_interrupted("partial listing"));
        let engine = Arc::new(engine_over(Arc::clone(&scripted)));
        let first_timeout = Duration::from_millis(400);

        let first = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.run_with_timeout("lm", first_timeout))
        };
        thread::sleep(Duration::from_millis(30));
        let started = Instant::now();
        let second = engine.run_with_timeout(".reload", Duration::from_millis(50));
        let second_elapsed = started.elapsed();

        assert!(second.timed_out);
        assert!(!second.interrupted);
        assert!(second_elapsed < Duration::from_millis(50) + GRACE);
        assert_eq!(scripted.interrupts(), 0, "queued deadline interrupted another caller");

        let first = first.join().expect("first caller");
        assert!(first.timed_out, "first command was cut short: {first:?}");
        assert!(first.interrupted);
        assert!(first.elapsed >= first_timeout);
        assert_eq!(first.output, "partial listing");
        assert_eq!(scripted.interrupts(), 1);

        thread::sleep(Duration::from_millis(100));
        assert_eq!(scripted.commands(), vec!["lm".to_owned()]);
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.withdrawn, 1);
        assert_eq!(snapshot.timed_out, 2);
    }

    #[test]
    fn panicking_backend_yields_internal_failure() {
        let mut backend = MockBackend::new();
        backend
            .expect_execute()
            .returning(|_, _| panic!("backend exploded"));
        let engine = ExecutionEngine::new(Arc::new(BackendGateway::new(Arc::new(backend))), GRACE);

        let result = engine.run_with_timeout("version", Duration::from_secs(1));

        assert!(!result.timed_out);
        assert_eq!(result.code, ResultCode::FAIL);
    }
}
