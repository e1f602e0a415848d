//! Wire shapes for everything the bridge writes back to a client.

use std::time::Duration;

use serde::{Serialize, Serializer};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::classify::ErrorCategory;
use crate::execution::ResultCode;

const INVALID_COMMAND: &str = "invalid_command";

/// Current UTC time in RFC 3339.
pub(crate) fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Any frame the bridge writes in reply to an inbound frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Response(CommandResponse),
    Protocol(ProtocolError),
}

impl From<CommandResponse> for Reply {
    fn from(response: CommandResponse) -> Self {
        Self::Response(response)
    }
}

impl From<ProtocolError> for Reply {
    fn from(error: ProtocolError) -> Self {
        Self::Protocol(error)
    }
}

/// Frame-level rejection, written when no command could be dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtocolError {
    #[serde(rename = "type")]
    kind: ErrorFrameKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub error_code: ProtocolErrorCode,
    pub error_message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum ErrorFrameKind {
    Error,
}

/// Frame-level error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolErrorCode {
    InvalidMessage,
    InvalidMessageType,
}

impl ProtocolError {
    /// Malformed, oversized, or structurally invalid frame.
    pub fn invalid_message(id: Option<i64>, message: impl Into<String>) -> Self {
        Self::new(id, ProtocolErrorCode::InvalidMessage, message)
    }

    /// Well-formed frame whose `type` is not `"command"`.
    pub fn invalid_message_type(id: Option<i64>, message: impl Into<String>) -> Self {
        Self::new(id, ProtocolErrorCode::InvalidMessageType, message)
    }

    fn new(id: Option<i64>, error_code: ProtocolErrorCode, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorFrameKind::Error,
            id,
            error_code,
            error_message: message.into(),
        }
    }
}

/// Response to one dispatched [`CommandRequest`].
///
/// [`CommandRequest`]: super::CommandRequest
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResponse {
    pub id: i64,
    #[serde(rename = "type")]
    kind: ResponseFrameKind,
    pub command: String,
    #[serde(flatten)]
    pub body: ResponseBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum ResponseFrameKind {
    Response,
}

/// Outcome portion of a response, tagged by `status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResponseBody {
    Success {
        output: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<ResponseMetadata>,
    },
    Error(ErrorDetails),
}

/// Supplementary data attached to successful responses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseMetadata {
    /// Seconds spent in the backend, when the handler ran a command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ResponseMetadata {
    pub(crate) fn new(execution_time: Option<Duration>, details: Option<Value>) -> Self {
        Self {
            execution_time: execution_time.map(|elapsed| elapsed.as_secs_f64()),
            timestamp: timestamp(),
            details,
        }
    }
}

/// Failure data carried by error responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetails {
    pub error: String,
    pub error_category: FailureCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    pub timestamp: String,
}

/// Category written to `error_category`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    Classified(ErrorCategory),
    /// The command name is not registered.
    InvalidCommand,
}

impl FailureCategory {
    /// Wire name of the category.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Classified(category) => category.as_str(),
            Self::InvalidCommand => INVALID_COMMAND,
        }
    }
}

impl Serialize for FailureCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Value written to `error_code`: a backend result code or a protocol code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ErrorCode {
    Result(ResultCode),
    Protocol(&'static str),
}

impl CommandResponse {
    /// Successful response.
    pub fn success(
        id: i64,
        command: impl Into<String>,
        output: impl Into<String>,
        metadata: Option<ResponseMetadata>,
    ) -> Self {
        Self::with_body(
            id,
            command,
            ResponseBody::Success {
                output: output.into(),
                metadata,
            },
        )
    }

    /// Error response for a classified failure.
    pub fn failure(
        id: i64,
        command: impl Into<String>,
        error: impl Into<String>,
        category: ErrorCategory,
        code: Option<ResultCode>,
        suggestion: Option<String>,
    ) -> Self {
        Self::with_body(
            id,
            command,
            ResponseBody::Error(ErrorDetails {
                error: error.into(),
                error_category: FailureCategory::Classified(category),
                error_code: code.map(ErrorCode::Result),
                suggestion,
                timestamp: timestamp(),
            }),
        )
    }

    /// Error response for a command name with no registered handler.
    pub fn unknown_command(id: i64, command: impl Into<String>) -> Self {
        let command = command.into();
        let error = format!("unknown command '{command}'");
        Self::with_body(
            id,
            command,
            ResponseBody::Error(ErrorDetails {
                error,
                error_category: FailureCategory::InvalidCommand,
                error_code: Some(ErrorCode::Protocol(INVALID_COMMAND)),
                suggestion: None,
                timestamp: timestamp(),
            }),
        )
    }

    fn with_body(id: i64, command: impl Into<String>, body: ResponseBody) -> Self {
        Self {
            id,
            kind: ResponseFrameKind::Response,
            command: command.into(),
            body,
        }
    }

    /// Returns `true` for `status: "success"`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.body, ResponseBody::Success { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn to_value(reply: impl Into<Reply>) -> Value {
        serde_json::to_value(reply.into()).expect("serialize reply")
    }

    #[test]
    fn success_flattens_status_and_output() {
        let value = to_value(CommandResponse::success(1, "version", "1.0", None));
        assert_eq!(
            value,
            json!({"id": 1, "type": "response", "command": "version", "status": "success", "output": "1.0"})
        );
    }

    #[test]
    fn success_metadata_reports_seconds() {
        let metadata = ResponseMetadata::new(Some(Duration::from_millis(1500)), None);
        let value = to_value(CommandResponse::success(2, "lm", "x", Some(metadata)));
        assert_eq!(value["metadata"]["execution_time"], json!(1.5));
        assert!(value["metadata"]["timestamp"].is_string());
        assert!(value["metadata"].get("details").is_none());
    }

    #[test]
    fn failure_carries_category_code_and_suggestion() {
        let value = to_value(CommandResponse::failure(
            3,
            "dd",
            "Memory access error",
            ErrorCategory::MemoryAccess,
            Some(ResultCode::FAIL),
            Some("check the address".into()),
        ));
        assert_eq!(value["status"], "error");
        assert_eq!(value["error_category"], "MemoryAccess");
        assert_eq!(value["error_code"], json!(0x8000_4005_u32));
        assert_eq!(value["suggestion"], "check the address");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn failure_omits_absent_optional_fields() {
        let value = to_value(CommandResponse::failure(
            4,
            "lm",
            "odd",
            ErrorCategory::Unknown,
            None,
            None,
        ));
        assert!(value.get("error_code").is_none());
        assert!(value.get("suggestion").is_none());
    }

    #[test]
    fn unknown_command_uses_protocol_code() {
        let value = to_value(CommandResponse::unknown_command(2, "nope"));
        assert_eq!(value["id"], 2);
        assert_eq!(value["command"], "nope");
        assert_eq!(value["error_category"], "invalid_command");
        assert_eq!(value["error_code"], "invalid_command");
    }

    #[test]
    fn protocol_errors_use_error_frame() {
        let value = to_value(ProtocolError::invalid_message(None, "bad"));
        assert_eq!(
            value,
            json!({"type": "error", "error_code": "invalid_message", "error_message": "bad"})
        );
    }
}
