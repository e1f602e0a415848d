//! Command name to handler mapping.
//!
//! Handlers are collected by a [`HandlerRegistryBuilder`] in one composition
//! root and frozen into a [`HandlerRegistry`] before the server accepts
//! connections. Name collisions fail the build instead of overwriting.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, warn};

use super::DISPATCH_TARGET;
use super::context::{CommandKind, DispatchContext, Invocation};
use super::errors::{HandlerError, RegistryError};
use super::request::CommandRequest;
use super::response::{CommandResponse, ResponseMetadata};

/// Handler result before it is stamped with the request id.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerOutput {
    pub output: String,
    pub execution_time: Option<std::time::Duration>,
    pub details: Option<serde_json::Value>,
    /// When unset the response carries no `metadata` block at all.
    pub include_metadata: bool,
}

impl HandlerOutput {
    /// Output produced without a backend call.
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            execution_time: None,
            details: None,
            include_metadata: true,
        }
    }

    /// Output of a backend call.
    pub fn executed(executed: super::Executed) -> Self {
        Self {
            output: executed.output,
            execution_time: Some(executed.elapsed),
            details: None,
            include_metadata: true,
        }
    }

    /// Attaches structured details to the response metadata.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Drops the `metadata` block from the response.
    #[must_use]
    pub fn without_metadata(mut self) -> Self {
        self.include_metadata = false;
        self
    }

    fn into_response(self, request: &CommandRequest) -> CommandResponse {
        let metadata = self
            .include_metadata
            .then(|| ResponseMetadata::new(self.execution_time, self.details));
        CommandResponse::success(request.id, &request.command, self.output, metadata)
    }
}

type Handler = Arc<dyn Fn(&Invocation<'_>) -> Result<HandlerOutput, HandlerError> + Send + Sync>;

struct Entry {
    kind: CommandKind,
    handler: Handler,
}

/// Collects handlers before the registry is frozen.
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    entries: HashMap<String, Entry>,
}

impl HandlerRegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when `name` is taken and
    /// [`RegistryError::EmptyName`] when it is blank.
    pub fn register<H>(
        &mut self,
        name: &str,
        kind: CommandKind,
        handler: H,
    ) -> Result<&mut Self, RegistryError>
    where
        H: Fn(&Invocation<'_>) -> Result<HandlerOutput, HandlerError> + Send + Sync + 'static,
    {
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.entries.contains_key(name) {
            return Err(RegistryError::Duplicate {
                name: name.to_owned(),
            });
        }
        self.entries.insert(
            name.to_owned(),
            Entry {
                kind,
                handler: Arc::new(handler),
            },
        );
        Ok(self)
    }

    /// Freezes the registry.
    #[must_use]
    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            entries: self.entries,
        }
    }
}

/// Immutable mapping from command name to handler.
pub struct HandlerRegistry {
    entries: HashMap<String, Entry>,
}

impl HandlerRegistry {
    /// Runs the handler registered for `request.command`.
    ///
    /// Always returns a response carrying the request's id and command.
    /// Unregistered names yield an `invalid_command` error without invoking
    /// any handler; handler errors and panics become classified errors.
    pub fn dispatch(&self, request: &CommandRequest, context: &DispatchContext) -> CommandResponse {
        let Some(entry) = self.entries.get(&request.command) else {
            debug!(
                target: DISPATCH_TARGET,
                id = request.id,
                command = %request.command,
                "unknown command"
            );
            return CommandResponse::unknown_command(request.id, &request.command);
        };

        let call = Invocation::new(request, entry.kind, context);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (entry.handler)(&call)));
        match outcome {
            Ok(Ok(output)) => output.into_response(request),
            Ok(Err(failure)) => failure_response(request, &failure),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(
                    target: DISPATCH_TARGET,
                    id = request.id,
                    command = %request.command,
                    panic = %message,
                    "command handler panicked"
                );
                failure_response(
                    request,
                    &HandlerError::internal(format!("handler panicked: {message}")),
                )
            }
        }
    }

    /// Kind registered for `name`.
    #[must_use]
    pub fn kind(&self, name: &str) -> Option<CommandKind> {
        self.entries.get(name).map(|entry| entry.kind)
    }

    /// Registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("commands", &self.names())
            .finish()
    }
}

fn failure_response(request: &CommandRequest, failure: &HandlerError) -> CommandResponse {
    let category = failure.category();
    warn!(
        target: DISPATCH_TARGET,
        id = request.id,
        command = %request.command,
        category = %category,
        retryable = category.is_retryable(),
        error = %failure,
        "command failed"
    );
    CommandResponse::failure(
        request.id,
        &request.command,
        failure.to_string(),
        category,
        failure.code(),
        failure.suggestion(&request.command),
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
