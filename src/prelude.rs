//! Prelude module for convenient imports.

pub use crate::error::{Result, SandboxError};
pub use crate::repl::{split_into_chunks, strip_code_fence, ExecutionResult, PythonRepl};
pub use crate::sandbox::config::SandboxConfig;
pub use crate::sandbox::executor::PythonSandbox;
