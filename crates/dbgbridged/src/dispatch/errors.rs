//! Error types for command registration and handler execution.

use thiserror::Error;

use crate::classify::{self, ErrorCategory};
use crate::execution::ResultCode;

/// Errors raised while building the handler registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A handler is already registered under this name.
    #[error("command '{name}' is already registered")]
    Duplicate { name: String },
    /// Command names must contain a non-whitespace character.
    #[error("command name must not be empty")]
    EmptyName,
}

/// Failures returned by command handlers.
///
/// Every variant maps to an [`ErrorCategory`] so the dispatch boundary can
/// build a structured error response.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Missing or malformed request arguments.
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    /// The backend reported a failure or the command timed out.
    #[error("{message}")]
    Execution {
        message: String,
        category: ErrorCategory,
        code: Option<ResultCode>,
        suggestion: Option<String>,
    },

    /// The bridge itself failed while handling the request.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl HandlerError {
    /// Creates an invalid arguments error.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    /// Creates an execution error, attaching the remediation hint for
    /// `category` and `backend_command`.
    pub fn execution(
        message: impl Into<String>,
        category: ErrorCategory,
        code: Option<ResultCode>,
        backend_command: &str,
    ) -> Self {
        Self::Execution {
            message: message.into(),
            category,
            code,
            suggestion: classify::suggest(category, backend_command),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Category reported in `error_category`.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidArguments { .. } => ErrorCategory::CommandSyntax,
            Self::Execution { category, .. } => *category,
            Self::Internal { .. } => ErrorCategory::InternalError,
        }
    }

    /// Result code reported in `error_code`.
    #[must_use]
    pub fn code(&self) -> Option<ResultCode> {
        match self {
            Self::InvalidArguments { .. } => Some(ResultCode::INVALID_ARG),
            Self::Execution { code, .. } => *code,
            Self::Internal { .. } => None,
        }
    }

    /// Remediation hint; falls back to the category default keyed by the
    /// request's command name.
    #[must_use]
    pub fn suggestion(&self, command: &str) -> Option<String> {
        match self {
            Self::Execution { suggestion, .. } => suggestion.clone(),
            Self::InvalidArguments { .. } => Some(format!(
                "Check the arguments supplied to '{command}'."
            )),
            Self::Internal { .. } => classify::suggest(ErrorCategory::InternalError, command),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_arguments_are_syntax_errors() {
        let error = HandlerError::invalid_arguments("address is required");
        assert_eq!(error.category(), ErrorCategory::CommandSyntax);
        assert_eq!(error.code(), Some(ResultCode::INVALID_ARG));
        assert_eq!(error.to_string(), "invalid arguments: address is required");
    }

    #[test]
    fn execution_errors_carry_backend_suggestion() {
        let error = HandlerError::execution(
            "Syntax error",
            ErrorCategory::CommandSyntax,
            Some(ResultCode::FAIL),
            "dt nt!_PEB",
        );
        let suggestion = error.suggestion("dt").expect("suggestion");
        assert!(suggestion.contains(".help dt"));
    }

    #[test]
    fn internal_errors_have_no_code() {
        let error = HandlerError::internal("lock poisoned");
        assert_eq!(error.category(), ErrorCategory::InternalError);
        assert_eq!(error.code(), None);
    }
}
