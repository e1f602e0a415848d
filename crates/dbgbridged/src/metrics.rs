//! Per-process session bookkeeping reported by the diagnostic commands.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use time::OffsetDateTime;

#[derive(Debug, Clone, Copy)]
struct LastExecution {
    finished: Instant,
    elapsed: Duration,
}

/// Session identity and timing of the most recent backend command.
#[derive(Debug)]
pub struct SessionMetrics {
    session_id: String,
    started: Instant,
    last: Mutex<Option<LastExecution>>,
}

impl SessionMetrics {
    /// Starts a session whose id is derived from the wall clock and pid.
    #[must_use]
    pub fn new() -> Self {
        let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
        Self::with_session_id(format!("session-{nanos:x}-{}", std::process::id()))
    }

    /// Starts a session with a caller-chosen id.
    pub fn with_session_id(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            started: Instant::now(),
            last: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Records a finished backend command.
    pub fn record(&self, elapsed: Duration) {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        *last = Some(LastExecution {
            finished: Instant::now(),
            elapsed,
        });
    }

    /// Duration of the most recent backend command.
    #[must_use]
    pub fn last_execution_time(&self) -> Option<Duration> {
        self.last_execution().map(|last| last.elapsed)
    }

    /// Time since the most recent backend command finished.
    #[must_use]
    pub fn since_last_command(&self) -> Option<Duration> {
        self.last_execution().map(|last| last.finished.elapsed())
    }

    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    fn last_execution(&self) -> Option<LastExecution> {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_embed_the_pid() {
        let metrics = SessionMetrics::new();
        assert!(metrics.session_id().starts_with("session-"));
        assert!(
            metrics
                .session_id()
                .ends_with(&format!("-{}", std::process::id()))
        );
    }

    #[test]
    fn records_latest_execution() {
        let metrics = SessionMetrics::with_session_id("fixed");
        assert_eq!(metrics.last_execution_time(), None);
        assert_eq!(metrics.since_last_command(), None);

        metrics.record(Duration::from_millis(40));
        metrics.record(Duration::from_millis(90));

        assert_eq!(metrics.last_execution_time(), Some(Duration::from_millis(90)));
        assert!(metrics.since_last_command().is_some());
    }
}
