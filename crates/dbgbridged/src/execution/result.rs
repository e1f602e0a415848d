//! Backend result codes and per-call execution results.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 32-bit status word reported by the backend engine.
///
/// The high bit marks failure; the remaining bits identify the facility and
/// the specific condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultCode(u32);

impl ResultCode {
    pub const OK: Self = Self(0x0000_0000);
    pub const FAIL: Self = Self(0x8000_4005);
    pub const ABORT: Self = Self(0x8000_4004);
    pub const INVALID_ARG: Self = Self(0x8007_0057);
    pub const ACCESS_DENIED: Self = Self(0x8007_0005);
    pub const OUT_OF_MEMORY: Self = Self(0x8007_000E);
    pub const RPC_DISCONNECTED: Self = Self(0x8001_0108);
    pub const RPC_SERVER_DIED: Self = Self(0x8001_0007);

    const SEVERITY_BIT: u32 = 0x8000_0000;

    /// Wraps a raw status word.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw status word.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns `true` when the severity bit is set.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        self.0 & Self::SEVERITY_BIT != 0
    }

    /// Symbolic name for the well-known codes.
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::OK => "OK",
            Self::FAIL => "FAIL",
            Self::ABORT => "ABORT",
            Self::INVALID_ARG => "INVALID_ARG",
            Self::ACCESS_DENIED => "ACCESS_DENIED",
            Self::OUT_OF_MEMORY => "OUT_OF_MEMORY",
            Self::RPC_DISCONNECTED => "RPC_DISCONNECTED",
            Self::RPC_SERVER_DIED => "RPC_SERVER_DIED",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Outcome of one [`ExecutionEngine::run_with_timeout`] call.
///
/// [`ExecutionEngine::run_with_timeout`]: super::ExecutionEngine::run_with_timeout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub output: String,
    pub code: ResultCode,
    /// The deadline passed before the backend returned.
    pub timed_out: bool,
    /// The backend honoured the interrupt and returned within the grace
    /// period. Only meaningful when `timed_out` is set.
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl CommandResult {
    pub(crate) fn completed(output: String, code: ResultCode, elapsed: Duration) -> Self {
        Self {
            output,
            code,
            timed_out: false,
            interrupted: false,
            elapsed,
        }
    }

    pub(crate) fn interrupted(output: String, elapsed: Duration) -> Self {
        Self {
            output,
            code: ResultCode::ABORT,
            timed_out: true,
            interrupted: true,
            elapsed,
        }
    }

    pub(crate) fn abandoned(elapsed: Duration) -> Self {
        Self {
            output: String::new(),
            code: ResultCode::ABORT,
            timed_out: true,
            interrupted: false,
            elapsed,
        }
    }

    pub(crate) fn internal(message: impl Into<String>, elapsed: Duration) -> Self {
        Self::completed(message.into(), ResultCode::FAIL, elapsed)
    }

    /// Returns `true` when the backend ran to completion and reported success.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        !self.timed_out && !self.code.is_failure()
    }
}
