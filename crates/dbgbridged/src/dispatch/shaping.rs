//! Turns raw [`CommandResult`]s into handler output or classified errors.

use std::time::Duration;

use crate::classify::{self, ErrorCategory};
use crate::execution::{CommandResult, ResultCode};

use super::context::CommandKind;
use super::errors::HandlerError;

/// Query output beyond this many bytes is cut.
pub(crate) const MAX_QUERY_OUTPUT_BYTES: usize = 64 * 1024;
const TRUNCATION_MARKER: &str = "\n... [Output truncated due to size limit]";
const EMPTY_SIDE_EFFECT_OUTPUT: &str = "Command completed successfully.";

pub(crate) fn shape(
    result: CommandResult,
    backend_command: &str,
    kind: CommandKind,
    timeout: Duration,
) -> Result<String, HandlerError> {
    if result.timed_out {
        return Err(timeout_error(&result, backend_command, timeout));
    }

    if result.code.is_failure() {
        return Err(failure_error(&result, backend_command));
    }

    let output = result.output;
    match kind {
        CommandKind::Query if output.trim().is_empty() => Err(HandlerError::Execution {
            message: "Command returned no output. The command might be invalid or unsupported."
                .to_owned(),
            category: ErrorCategory::Unknown,
            code: Some(result.code),
            suggestion: Some("Check if the command is valid in the current context.".to_owned()),
        }),
        CommandKind::Query => Ok(truncate(output, MAX_QUERY_OUTPUT_BYTES)),
        CommandKind::SideEffecting if output.trim().is_empty() => {
            Ok(EMPTY_SIDE_EFFECT_OUTPUT.to_owned())
        }
        CommandKind::SideEffecting => Ok(output),
    }
}

fn timeout_error(result: &CommandResult, backend_command: &str, timeout: Duration) -> HandlerError {
    let mut message = format!(
        "Command '{backend_command}' timed out after {} ms",
        timeout.as_millis()
    );
    if result.interrupted {
        message.push_str(" (interrupted)");
        if !result.output.trim().is_empty() {
            message.push_str(": ");
            message.push_str(result.output.trim_end());
        }
    }
    HandlerError::execution(
        message,
        ErrorCategory::Timeout,
        Some(ResultCode::ABORT),
        backend_command,
    )
}

fn failure_error(result: &CommandResult, backend_command: &str) -> HandlerError {
    let detail = result.output.trim_end();
    let message = if detail.is_empty() {
        format!("Command failed with result code {}", result.code)
    } else {
        format!("Command failed with result code {}: {detail}", result.code)
    };
    let category = classify::classify(detail, Some(result.code));
    HandlerError::execution(message, category, Some(result.code), backend_command)
}

/// Cuts `output` to at most `limit` bytes on a char boundary and appends the
/// truncation marker.
pub(crate) fn truncate(mut output: String, limit: usize) -> String {
    if output.len() <= limit {
        return output;
    }
    let mut cut = limit;
    while !output.is_char_boundary(cut) {
        cut -= 1;
    }
    output.truncate(cut);
    output.push_str(TRUNCATION_MARKER);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const TIMEOUT: Duration = Duration::from_millis(50);

    fn completed(output: &str, code: ResultCode) -> CommandResult {
        CommandResult::completed(output.to_owned(), code, Duration::from_millis(5))
    }

    #[test]
    fn successful_query_output_passes_through() {
        let shaped = shape(completed("ntdll", ResultCode::OK), "lm", CommandKind::Query, TIMEOUT);
        assert_eq!(shaped.expect("success"), "ntdll");
    }

    #[rstest]
    #[case("")]
    #[case("  \n")]
    fn empty_query_output_is_an_error(#[case] output: &str) {
        let error = shape(completed(output, ResultCode::OK), "k", CommandKind::Query, TIMEOUT)
            .expect_err("empty output");
        assert_eq!(error.category(), ErrorCategory::Unknown);
    }

    #[test]
    fn empty_side_effect_output_is_success() {
        let shaped = shape(
            completed("", ResultCode::OK),
            "bp kernel32!CreateFileW",
            CommandKind::SideEffecting,
            TIMEOUT,
        );
        assert_eq!(shaped.expect("success"), EMPTY_SIDE_EFFECT_OUTPUT);
    }

    #[test]
    fn failure_codes_are_classified_with_hex_message() {
        let error = shape(
            completed("Couldn't resolve error at 'nt!Nope'", ResultCode::FAIL),
            "dt nt!Nope",
            CommandKind::Query,
            TIMEOUT,
        )
        .expect_err("failure");
        assert_eq!(error.category(), ErrorCategory::ResourceResolution);
        assert_eq!(error.code(), Some(ResultCode::FAIL));
        assert!(error.to_string().contains("0x80004005"), "{error}");
        assert!(error.to_string().contains("Couldn't resolve"), "{error}");
    }

    #[test]
    fn failure_code_beats_keywords() {
        let error = shape(
            completed("Syntax error", ResultCode::RPC_DISCONNECTED),
            "k",
            CommandKind::Query,
            TIMEOUT,
        )
        .expect_err("failure");
        assert_eq!(error.category(), ErrorCategory::ConnectionLost);
    }

    #[rstest]
    #[case(CommandResult::abandoned(TIMEOUT), false)]
    #[case(CommandResult::interrupted("partial".into(), TIMEOUT), true)]
    fn timeouts_report_timeout_category(#[case] result: CommandResult, #[case] interrupted: bool) {
        let error = shape(result, "!analyze -v", CommandKind::Query, TIMEOUT).expect_err("timeout");
        assert_eq!(error.category(), ErrorCategory::Timeout);
        assert_eq!(error.code(), Some(ResultCode::ABORT));
        assert_eq!(error.to_string().contains("(interrupted)"), interrupted);
    }

    #[test]
    fn large_query_output_is_truncated() {
        let output = "x".repeat(MAX_QUERY_OUTPUT_BYTES + 10);
        let shaped = shape(completed(&output, ResultCode::OK), "lm", CommandKind::Query, TIMEOUT)
            .expect("success");
        assert!(shaped.ends_with(TRUNCATION_MARKER));
        assert_eq!(shaped.len(), MAX_QUERY_OUTPUT_BYTES + TRUNCATION_MARKER.len());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let shaped = truncate("ééé".to_owned(), 3);
        assert_eq!(shaped, format!("é{TRUNCATION_MARKER}"));
    }
}
