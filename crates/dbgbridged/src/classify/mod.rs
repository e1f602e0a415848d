//! Closed taxonomy for backend failures.
//!
//! Backend diagnostics arrive as free text plus an optional result code.
//! [`classify`] folds them into an [`ErrorCategory`] an automated caller can
//! act on, and [`suggest`] attaches a remediation hint.

mod classifier;
mod suggestions;
#[cfg(test)]
mod tests;

use std::fmt;

use serde::Serialize;

pub use self::classifier::classify;
pub use self::suggestions::suggest;

/// Failure categories reported in `error_category`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCategory {
    CommandSyntax,
    ExecutionContext,
    Timeout,
    ResourceResolution,
    PermissionDenied,
    MemoryAccess,
    ResourceExhaustion,
    ExtensionOrDependencyMissing,
    ConnectionLost,
    InternalError,
    Unknown,
}

impl ErrorCategory {
    /// Wire name of the category.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CommandSyntax => "CommandSyntax",
            Self::ExecutionContext => "ExecutionContext",
            Self::Timeout => "Timeout",
            Self::ResourceResolution => "ResourceResolution",
            Self::PermissionDenied => "PermissionDenied",
            Self::MemoryAccess => "MemoryAccess",
            Self::ResourceExhaustion => "ResourceExhaustion",
            Self::ExtensionOrDependencyMissing => "ExtensionOrDependencyMissing",
            Self::ConnectionLost => "ConnectionLost",
            Self::InternalError => "InternalError",
            Self::Unknown => "Unknown",
        }
    }

    /// Returns `true` for categories where repeating the same request may
    /// succeed.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::ConnectionLost)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
