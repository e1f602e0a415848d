//! Request parsing for inbound frames.
//!
//! A frame is accepted as a command only when it is a JSON object whose
//! `type` is `"command"`. Anything else becomes a [`ProtocolError`] that is
//! written back without touching the registry.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::response::ProtocolError;

const COMMAND_TYPE: &str = "command";

/// Parsed command request.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CommandRequest {
    /// Correlation token echoed in the response.
    pub id: i64,
    /// Registered command name.
    pub command: String,
    /// Command arguments.
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl CommandRequest {
    /// Builds a request, mainly for tests and in-process callers.
    pub fn new(id: i64, command: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            id,
            command: command.into(),
            args,
        }
    }

    /// Parses one frame.
    ///
    /// # Errors
    ///
    /// Returns an `invalid_message` [`ProtocolError`] for malformed JSON,
    /// non-object payloads, and objects that lack the command fields, and an
    /// `invalid_message_type` error when `type` is missing or not
    /// `"command"`.
    pub fn parse(frame: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_slice(frame)
            .map_err(|error| ProtocolError::invalid_message(None, format!("malformed JSON: {error}")))?;
        let Value::Object(object) = value else {
            return Err(ProtocolError::invalid_message(
                None,
                "expected a JSON object",
            ));
        };

        let id = object.get("id").and_then(Value::as_i64);
        match object.get("type").and_then(Value::as_str) {
            Some(COMMAND_TYPE) => {}
            Some(other) => {
                return Err(ProtocolError::invalid_message_type(
                    id,
                    format!("unsupported message type '{other}'"),
                ));
            }
            None => {
                return Err(ProtocolError::invalid_message_type(
                    id,
                    "message type is missing",
                ));
            }
        }

        serde_json::from_value(Value::Object(object)).map_err(|error| {
            ProtocolError::invalid_message(id, format!("invalid command request: {error}"))
        })
    }
}
