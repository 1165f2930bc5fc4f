//! # Python REPL Sandbox
//!
//! A sandboxed execution environment for a Python-subset REPL with
//! persistent per-user namespaces.
//!
//! Untrusted source is parsed into a syntax tree, statically screened by a
//! policy validator, and interpreted by an in-crate tree-walking evaluator
//! on a disposable worker thread. The crate enforces strict boundaries:
//!
//! - **Static policy validation**: imports, reflection attributes,
//!   capability-granting calls, and runaway comprehension shapes are
//!   rejected before anything executes
//! - **Timeout protection**: a wall-clock deadline with a cooperative
//!   cancel flag polled between evaluation steps
//! - **Resource budgets**: evaluation fuel, loop iteration and recursion
//!   ceilings, output capture and value-size limits
//! - **State isolation**: one worker per execution, never reused; per-user
//!   namespaces merged only after a successful run
//!
//! ## Example
//!
//! ```rust,ignore
//! use python_repl_sandbox_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let repl = PythonRepl::new(SandboxConfig::default());
//!
//!     assert_eq!(repl.execute("alice", "x = 5").await, "Done");
//!     assert_eq!(repl.execute("alice", "x + 1").await, "6");
//!
//!     // Another user's namespace is independent:
//!     let reply = repl.execute("bob", "x + 1").await;
//!     assert!(reply.starts_with("runtime error:"));
//! }
//! ```
//!
//! ## Security Model
//!
//! The sandbox provides defense-in-depth through multiple layers:
//!
//! 1. **Syntax surface**: the interpreter implements only a bounded Python
//!    subset; there is no import machinery, filesystem, network, or process
//!    API to reach
//! 2. **Policy validation**: denied constructs are rejected by a tree walk
//!    before execution, with the violated rule named
//! 3. **Resource limits**: time, fuel, iteration, recursion, output, and
//!    value-size ceilings bound what admitted code can consume
//! 4. **Result guarding**: produced values are measured (cycle-safe) before
//!    they are rendered or persisted
//!
//! It is best-effort isolation against a motivated but non-exploit-grade
//! adversary, not a hypervisor-grade boundary.

pub mod error;
pub mod lang;
pub mod prelude;
pub mod repl;
pub mod sandbox;

// Re-export main types at crate root for convenience
pub use error::{Result, SandboxError};
pub use repl::{split_into_chunks, strip_code_fence, ExecutionResult, PythonRepl};
pub use sandbox::config::{SandboxConfig, SandboxConfigBuilder};
pub use sandbox::executor::PythonSandbox;
pub use sandbox::namespace::NamespaceStore;
pub use sandbox::rate::RateLimiter;
