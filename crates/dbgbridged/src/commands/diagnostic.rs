//! Health and performance probes.

use std::time::{Duration, Instant};

use serde_json::json;

use crate::dispatch::{HandlerError, HandlerOutput, Invocation};

const PROBE_COMMAND: &str = "version";
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const PERFORMANCE_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const IDLE_AFTER: Duration = Duration::from_secs(300);

/// Overall health verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Health {
    Healthy,
    Idle,
    Unhealthy,
}

impl Health {
    fn assess(responsive: bool, since_last_command: Option<Duration>) -> Self {
        if !responsive {
            Self::Unhealthy
        } else if since_last_command.is_some_and(|idle| idle > IDLE_AFTER) {
            Self::Idle
        } else {
            Self::Healthy
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Idle => "idle",
            Self::Unhealthy => "unhealthy",
        }
    }

    fn message(self) -> &'static str {
        match self {
            Self::Healthy => "All systems operational",
            Self::Idle => "No commands executed recently",
            Self::Unhealthy => "Backend engine is not responding",
        }
    }
}

fn performance_rating(probe: Duration) -> &'static str {
    if probe < Duration::from_secs(1) {
        "good"
    } else if probe < Duration::from_secs(3) {
        "fair"
    } else {
        "poor"
    }
}

pub(super) fn health_check(call: &Invocation<'_>) -> Result<HandlerOutput, HandlerError> {
    let context = call.context();
    let since_last_command = context.metrics().since_last_command();
    let probe = call.execute_with_timeout(PROBE_COMMAND, HEALTH_PROBE_TIMEOUT);
    let health = Health::assess(probe.is_ok(), since_last_command);

    let mut details = json!({
        "status": health.as_str(),
        "message": health.message(),
        "backend_responsive": probe.is_ok(),
        "time_since_last_command": since_last_command.map(|idle| idle.as_secs_f64()),
        "last_execution_time": context.metrics().last_execution_time().map(|last| last.as_secs_f64()),
        "session_id": context.metrics().session_id(),
        "engine": context.engine().snapshot(),
    });
    if let Err(probe_error) = &probe {
        details["probe_error"] = json!(probe_error.to_string());
    }

    Ok(HandlerOutput::text(format!("{}: {}", health.as_str(), health.message()))
        .with_details(details))
}

pub(super) fn performance_metrics(call: &Invocation<'_>) -> Result<HandlerOutput, HandlerError> {
    let context = call.context();
    let metrics = context.metrics();
    let since_last_command = metrics.since_last_command();
    let last_execution = metrics.last_execution_time();

    let started = Instant::now();
    let probe = call.execute_with_timeout(PROBE_COMMAND, PERFORMANCE_PROBE_TIMEOUT);
    let probe_time = started.elapsed();

    let mut details = json!({
        "last_execution_time_ms": last_execution.map(|last| last.as_secs_f64() * 1000.0),
        "time_since_last_command_ms": since_last_command.map(|idle| idle.as_secs_f64() * 1000.0),
        "session_id": metrics.session_id(),
        "uptime_seconds": metrics.uptime().as_secs(),
        "engine": context.engine().snapshot(),
    });
    let status = match &probe {
        Ok(_) => {
            details["test_command_time_ms"] = json!(probe_time.as_secs_f64() * 1000.0);
            performance_rating(probe_time)
        }
        Err(probe_error) => {
            details["test_command_time_ms"] = json!(-1);
            details["performance_error"] = json!(probe_error.to_string());
            "error"
        }
    };
    details["performance_status"] = json!(status);

    Ok(HandlerOutput::text(format!("performance: {status}")).with_details(details))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::CommandKind;
    use crate::dispatch::test_utils::{request, scripted_context};
    use crate::execution::test_utils::Step;
    use crate::execution::{BackendReply, ResultCode};
    use rstest::rstest;

    #[rstest]
    #[case(true, None, Health::Healthy)]
    #[case(true, Some(Duration::from_secs(10)), Health::Healthy)]
    #[case(true, Some(Duration::from_secs(301)), Health::Idle)]
    #[case(false, Some(Duration::from_secs(301)), Health::Unhealthy)]
    fn assesses_health(
        #[case] responsive: bool,
        #[case] idle: Option<Duration>,
        #[case] expected: Health,
    ) {
        assert_eq!(Health::assess(responsive, idle), expected);
    }

    #[rstest]
    #[case(Duration::from_millis(200), "good")]
    #[case(Duration::from_millis(1500), "fair")]
    #[case(Duration::from_secs(4), "poor")]
    fn rates_probe_latency(#[case] probe: Duration, #[case] expected: &str) {
        assert_eq!(performance_rating(probe), expected);
    }

    #[test]
    fn health_check_reports_backend_and_session() {
        let (backend, context) = scripted_context();
        let request = request(1, "health_check", json!({}));
        let call = Invocation::new(&request, CommandKind::Query, &context);

        let output = health_check(&call).expect("health");

        assert_eq!(output.output, "healthy: All systems operational");
        let details = output.details.expect("details");
        assert_eq!(details["session_id"], "test-session");
        assert_eq!(details["backend_responsive"], true);
        assert_eq!(backend.commands(), vec!["version"]);
    }

    #[test]
    fn unresponsive_backend_is_unhealthy_not_an_error() {
        let (backend, context) = scripted_context();
        backend.push(Step::reply_after(
            Duration::ZERO,
            BackendReply::new("", ResultCode::RPC_SERVER_DIED),
        ));
        let request = request(2, "health_check", json!({}));
        let call = Invocation::new(&request, CommandKind::Query, &context);

        let output = health_check(&call).expect("health");

        let details = output.details.expect("details");
        assert_eq!(details["status"], "unhealthy");
        assert!(details["probe_error"].is_string());
    }

    #[test]
    fn performance_metrics_rates_the_probe() {
        let (_backend, context) = scripted_context();
        let request = request(3, "performance_metrics", json!({}));
        let call = Invocation::new(&request, CommandKind::Query, &context);

        let output = performance_metrics(&call).expect("metrics");

        let details = output.details.expect("details");
        assert_eq!(details["performance_status"], "good");
        assert_eq!(details["engine"]["completed"], 1);
        assert!(details["test_command_time_ms"].as_f64().is_some());
    }
}
