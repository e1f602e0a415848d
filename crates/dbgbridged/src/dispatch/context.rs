//! Per-call view handed to command handlers.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::execution::ExecutionEngine;
use crate::metrics::SessionMetrics;

use super::errors::HandlerError;
use super::request::CommandRequest;
use super::shaping;

const TIMEOUT_ARG: &str = "timeout_ms";

/// Whether empty backend output means failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Reads state; empty output signals failure.
    Query,
    /// Changes state; empty output is a normal success.
    SideEffecting,
}

/// Shared collaborators available to every handler.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    engine: Arc<ExecutionEngine>,
    metrics: Arc<SessionMetrics>,
    default_timeout: Duration,
}

impl DispatchContext {
    pub fn new(
        engine: Arc<ExecutionEngine>,
        metrics: Arc<SessionMetrics>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            metrics,
            default_timeout,
        }
    }

    #[must_use]
    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    #[must_use]
    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }
}

/// Backend output after shaping, with the time spent producing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executed {
    pub output: String,
    pub elapsed: Duration,
}

/// One handler call: the request, its registered kind, and the context.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    request: &'a CommandRequest,
    kind: CommandKind,
    context: &'a DispatchContext,
}

impl<'a> Invocation<'a> {
    pub(crate) fn new(
        request: &'a CommandRequest,
        kind: CommandKind,
        context: &'a DispatchContext,
    ) -> Self {
        Self {
            request,
            kind,
            context,
        }
    }

    #[must_use]
    pub fn command(&self) -> &'a str {
        &self.request.command
    }

    #[must_use]
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    #[must_use]
    pub fn context(&self) -> &'a DispatchContext {
        self.context
    }

    #[must_use]
    pub fn args(&self) -> &'a Map<String, Value> {
        &self.request.args
    }

    /// Optional string argument. Blank strings count as absent.
    ///
    /// # Errors
    ///
    /// Fails when the argument is present but not a string.
    pub fn str_arg(&self, name: &str) -> Result<Option<&'a str>, HandlerError> {
        match self.args().get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) if value.trim().is_empty() => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.trim())),
            Some(_) => Err(HandlerError::invalid_arguments(format!(
                "'{name}' must be a string"
            ))),
        }
    }

    /// Required, non-blank string argument.
    ///
    /// # Errors
    ///
    /// Fails when the argument is missing, blank, or not a string.
    pub fn required_str(&self, name: &str) -> Result<&'a str, HandlerError> {
        self.str_arg(name)?
            .ok_or_else(|| HandlerError::invalid_arguments(format!("'{name}' is required")))
    }

    /// Optional unsigned integer argument, given as a number or a decimal
    /// string.
    ///
    /// # Errors
    ///
    /// Fails when the argument is present but not a non-negative integer.
    pub fn u64_arg(&self, name: &str) -> Result<Option<u64>, HandlerError> {
        let invalid =
            || HandlerError::invalid_arguments(format!("'{name}' must be a non-negative integer"));
        match self.args().get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(number)) => number.as_u64().map(Some).ok_or_else(invalid),
            Some(Value::String(text)) => text.trim().parse().map(Some).map_err(|_| invalid()),
            Some(_) => Err(invalid()),
        }
    }

    /// Optional boolean argument.
    ///
    /// # Errors
    ///
    /// Fails when the argument is present but not a boolean.
    pub fn bool_arg(&self, name: &str) -> Result<Option<bool>, HandlerError> {
        match self.args().get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(flag)) => Ok(Some(*flag)),
            Some(_) => Err(HandlerError::invalid_arguments(format!(
                "'{name}' must be a boolean"
            ))),
        }
    }

    /// Deadline from `args.timeout_ms`, else the configured default.
    ///
    /// # Errors
    ///
    /// Fails when `timeout_ms` is malformed or zero.
    pub fn timeout(&self) -> Result<Duration, HandlerError> {
        self.timeout_or(self.context.default_timeout())
    }

    /// Deadline from `args.timeout_ms`, else `fallback`.
    ///
    /// # Errors
    ///
    /// See [`Invocation::timeout`].
    pub fn timeout_or(&self, fallback: Duration) -> Result<Duration, HandlerError> {
        match self.u64_arg(TIMEOUT_ARG)? {
            None => Ok(fallback),
            Some(0) => Err(HandlerError::invalid_arguments(
                "'timeout_ms' must be greater than zero",
            )),
            Some(millis) => Ok(Duration::from_millis(millis)),
        }
    }

    /// Runs `backend_command` under the request's deadline.
    ///
    /// # Errors
    ///
    /// Returns a classified [`HandlerError`] when the command times out,
    /// reports a failure code, or yields empty output for a query.
    pub fn execute(&self, backend_command: &str) -> Result<Executed, HandlerError> {
        let timeout = self.timeout()?;
        self.execute_with_timeout(backend_command, timeout)
    }

    /// Runs `backend_command` under an explicit deadline.
    ///
    /// # Errors
    ///
    /// See [`Invocation::execute`].
    pub fn execute_with_timeout(
        &self,
        backend_command: &str,
        timeout: Duration,
    ) -> Result<Executed, HandlerError> {
        let result = self
            .context
            .engine()
            .run_with_timeout(backend_command, timeout);
        self.context.metrics().record(result.elapsed);
        let elapsed = result.elapsed;
        let output = shaping::shape(result, backend_command, self.kind, timeout)?;
        Ok(Executed { output, elapsed })
    }
}
