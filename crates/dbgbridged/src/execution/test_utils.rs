//! Scripted backend used by engine, dispatch, and server tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use super::gateway::{Backend, BackendReply};

const COOPERATIVE_LIMIT: Duration = Duration::from_secs(5);

/// One scripted backend behaviour, consumed per `execute` call.
pub(crate) enum Step {
    Reply { delay: Duration, reply: BackendReply },
    Stubborn { duration: Duration },
    Cooperative { output: String },
}

impl Step {
    pub(crate) fn reply_after(delay: Duration, reply: BackendReply) -> Self {
        Self::Reply { delay, reply }
    }

    pub(crate) fn hang_ignoring_interrupt(duration: Duration) -> Self {
        Self::Stubborn { duration }
    }

    pub(crate) fn hang_until_interrupted(output: impl Into<String>) -> Self {
        Self::Cooperative {
            output: output.into(),
        }
    }
}

/// Backend that plays back queued [`Step`]s and echoes commands otherwise.
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    steps: Mutex<VecDeque<Step>>,
    interrupted: Mutex<bool>,
    wake: Condvar,
    interrupts: AtomicUsize,
    spans: Mutex<Vec<(Instant, Instant)>>,
    commands: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, step: Step) {
        self.steps.lock().expect("steps lock").push_back(step);
    }

    pub(crate) fn interrupts(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }

    pub(crate) fn spans(&self) -> Vec<(Instant, Instant)> {
        self.spans.lock().expect("spans lock").clone()
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.commands.lock().expect("commands lock").clone()
    }
}

impl Backend for ScriptedBackend {
    fn execute(&self, command: &str, _timeout: Duration) -> BackendReply {
        let started = Instant::now();
        *self.interrupted.lock().expect("interrupt lock") = false;
        self.commands
            .lock()
            .expect("commands lock")
            .push(command.to_owned());
        let step = self.steps.lock().expect("steps lock").pop_front();
        let reply = match step {
            None => BackendReply::ok(format!("executed: {command}")),
            Some(Step::Reply { delay, reply }) => {
                thread::sleep(delay);
                reply
            }
            Some(Step::Stubborn { duration }) => {
                thread::sleep(duration);
                BackendReply::ok("late")
            }
            Some(Step::Cooperative { output }) => {
                let guard = self.interrupted.lock().expect("interrupt lock");
                let _guard = self
                    .wake
                    .wait_timeout_while(guard, COOPERATIVE_LIMIT, |interrupted| !*interrupted)
                    .expect("interrupt wait");
                BackendReply::ok(output)
            }
        };
        self.spans
            .lock()
            .expect("spans lock")
            .push((started, Instant::now()));
        reply
    }

    fn interrupt(&self) -> bool {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        *self.interrupted.lock().expect("interrupt lock") = true;
        self.wake.notify_all();
        true
    }
}
