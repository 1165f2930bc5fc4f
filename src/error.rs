//! Error types for the REPL sandbox.
//!
//! Every fault class carries a distinct, stable message prefix so callers
//! (and scripted tests) can tell causes apart from the rendered text alone.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while validating or executing submitted code.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// The source failed to parse in both expression and statement mode.
    #[error("syntax error: {message} (line {line})")]
    Syntax {
        /// Parser diagnostic.
        message: String,
        /// 1-based source line of the failure.
        line: u32,
    },

    /// The policy validator rejected the code before execution.
    #[error("operation not allowed: {rule}")]
    SecurityRejected {
        /// The violated rule, named.
        rule: String,
    },

    /// The execution exceeded the configured wall-clock deadline.
    #[error("execution timed out after {0:?}")]
    Timeout(Duration),

    /// An exception was raised while the code ran.
    #[error("runtime error: {message}")]
    Runtime {
        /// Human-readable fault description.
        message: String,
    },

    /// The produced value (or captured output) exceeded a size ceiling.
    #[error("result too large: {0}")]
    SizeViolation(String),

    /// The user invoked the sandbox again before the cooldown elapsed.
    #[error("rate limited: retry in {retry_after:?}")]
    RateLimited {
        /// Remaining wait before the next invocation is allowed.
        retry_after: Duration,
    },

    /// The submitted source exceeds the configured character ceiling.
    #[error("source too long: {len} characters (max {max})")]
    SourceTooLong { len: usize, max: usize },

    /// Internal worker failure (panic, lost channel). Not part of the
    /// user-visible taxonomy; indicates a host-side bug.
    #[error("worker failed: {0}")]
    Worker(#[source] anyhow::Error),
}

impl SandboxError {
    /// Check if this error represents a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SandboxError::Timeout(_))
    }

    /// Check if this error represents a policy rejection.
    pub fn is_security(&self) -> bool {
        matches!(self, SandboxError::SecurityRejected { .. })
    }

    /// Check if this error represents a syntax fault.
    pub fn is_syntax(&self) -> bool {
        matches!(self, SandboxError::Syntax { .. })
    }

    /// Check if this error represents a runtime fault in user code.
    pub fn is_runtime(&self) -> bool {
        matches!(self, SandboxError::Runtime { .. })
    }

    /// Check if this error represents a size-ceiling violation.
    pub fn is_size_violation(&self) -> bool {
        matches!(self, SandboxError::SizeViolation(_))
    }

    /// Check if this error represents a rate-limit rejection.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SandboxError::RateLimited { .. })
    }
}

/// Result type alias for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;
