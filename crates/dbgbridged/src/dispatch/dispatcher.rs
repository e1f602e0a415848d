//! Frame-level entry point used by the transport workers.

use serde_json::{Value, json};
use tracing::{debug, error, warn};

use crate::transport::FrameHandler;

use super::DISPATCH_TARGET;
use super::context::DispatchContext;
use super::registry::HandlerRegistry;
use super::request::CommandRequest;
use super::response::{ProtocolError, Reply};

/// Parses frames, routes them through the registry, and renders replies.
#[derive(Debug)]
pub struct Dispatcher {
    registry: HandlerRegistry,
    context: DispatchContext,
}

impl Dispatcher {
    pub fn new(registry: HandlerRegistry, context: DispatchContext) -> Self {
        Self { registry, context }
    }

    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Handles one complete frame.
    pub fn reply_to(&self, frame: &[u8]) -> Reply {
        match CommandRequest::parse(frame) {
            Ok(request) => {
                debug!(
                    target: DISPATCH_TARGET,
                    id = request.id,
                    command = %request.command,
                    "dispatching request"
                );
                self.registry.dispatch(&request, &self.context).into()
            }
            Err(rejection) => {
                warn!(
                    target: DISPATCH_TARGET,
                    code = ?rejection.error_code,
                    message = %rejection.error_message,
                    "rejected frame"
                );
                rejection.into()
            }
        }
    }
}

impl FrameHandler for Dispatcher {
    fn handle_frame(&self, frame: &[u8]) -> Value {
        render(&self.reply_to(frame))
    }

    fn reject_frame(&self, reason: &str) -> Value {
        render(&Reply::from(ProtocolError::invalid_message(None, reason)))
    }
}

fn render(reply: &Reply) -> Value {
    serde_json::to_value(reply).unwrap_or_else(|serialize_error| {
        error!(
            target: DISPATCH_TARGET,
            error = %serialize_error,
            "failed to render reply"
        );
        json!({
            "type": "error",
            "error_code": "invalid_message",
            "error_message": "failed to render reply",
        })
    })
}
