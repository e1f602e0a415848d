use crate::execution::ResultCode;

use super::ErrorCategory;

/// Keyword sets checked in order; the first category with a match wins.
const KEYWORD_RULES: &[(ErrorCategory, &[&str])] = &[
    (
        ErrorCategory::CommandSyntax,
        &[
            "syntax error",
            "invalid command",
            "unknown command",
            "bad command",
            "unexpected token",
        ],
    ),
    (
        ErrorCategory::ExtensionOrDependencyMissing,
        &[
            "no export",
            "extension not loaded",
            "is not extension gallery command",
            "not found in any loaded extension",
            "missing dependency",
        ],
    ),
    (
        ErrorCategory::ResourceResolution,
        &[
            "couldn't resolve",
            "could not resolve",
            "unable to resolve",
            "symbol not found",
            "no symbols",
            "symbols could not be loaded",
            "bad module",
        ],
    ),
    (
        ErrorCategory::MemoryAccess,
        &[
            "memory access error",
            "unable to read memory",
            "cannot read memory",
            "invalid address",
            "access violation",
        ],
    ),
    (
        ErrorCategory::PermissionDenied,
        &["access denied", "permission denied", "not permitted"],
    ),
    (
        ErrorCategory::ResourceExhaustion,
        &[
            "out of memory",
            "memory allocation",
            "insufficient resources",
        ],
    ),
    (
        ErrorCategory::ConnectionLost,
        &["connection", "disconnect", "rpc", "broken pipe"],
    ),
    (ErrorCategory::Timeout, &["timeout", "timed out"]),
    (
        ErrorCategory::ExecutionContext,
        &["process", "thread", "context", "no target"],
    ),
    (
        ErrorCategory::InternalError,
        &["internal error", "exception", "panicked"],
    ),
];

/// Maps a backend diagnostic to an [`ErrorCategory`].
///
/// A recognised failure `code` decides the category outright. Otherwise the
/// message is matched case-insensitively against the keyword rules and
/// falls back to [`ErrorCategory::Unknown`].
#[must_use]
pub fn classify(message: &str, code: Option<ResultCode>) -> ErrorCategory {
    if let Some(category) = code.and_then(category_for_code) {
        return category;
    }

    let lowered = message.to_lowercase();
    KEYWORD_RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| lowered.contains(keyword)))
        .map_or(ErrorCategory::Unknown, |(category, _)| *category)
}

fn category_for_code(code: ResultCode) -> Option<ErrorCategory> {
    match code {
        ResultCode::INVALID_ARG => Some(ErrorCategory::CommandSyntax),
        ResultCode::ACCESS_DENIED => Some(ErrorCategory::PermissionDenied),
        ResultCode::OUT_OF_MEMORY => Some(ErrorCategory::ResourceExhaustion),
        ResultCode::RPC_DISCONNECTED | ResultCode::RPC_SERVER_DIED => {
            Some(ErrorCategory::ConnectionLost)
        }
        _ => None,
    }
}
