//! Core execution engine for the REPL sandbox.
//!
//! One invocation = one disposable blocking worker: the validated program
//! and the user's thawed namespace move onto a `spawn_blocking` thread, the
//! caller races the worker against the wall-clock deadline, and a timed-out
//! worker is abandoned with its cancel flag raised, so its partial results
//! are never observed. Workers are never reused, so no state can bleed between
//! invocations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{Result, SandboxError};
use crate::lang::ast::Program;
use crate::sandbox::builtins::is_builtin_name;
use crate::sandbox::config::SandboxConfig;
use crate::sandbox::guard::{check_value, GuardLimits};
use crate::sandbox::interp::{ExecFault, Interpreter};
use crate::sandbox::value::{values_equal, StoredValue};

/// Outcome of one successful run, before namespace merging.
#[derive(Debug)]
pub struct RawRun {
    /// Captured print output.
    pub stdout: String,
    /// `repr` of the terminal value, for expression programs.
    pub value_repr: Option<String>,
    /// New or rebound top-level names, frozen for storage.
    pub bindings: Vec<(String, StoredValue)>,
    /// Wall-clock execution time.
    pub duration: Duration,
}

/// The execution engine. Holds only configuration; per-run state lives and
/// dies with each worker.
pub struct PythonSandbox {
    config: SandboxConfig,
}

impl PythonSandbox {
    /// Create an engine with the given configuration.
    pub fn new(config: SandboxConfig) -> Self {
        PythonSandbox { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Execute a validated program against a user's stored namespace.
    ///
    /// Returns the raw run output; merging the returned bindings into the
    /// namespace store is the caller's job, so a failed run never mutates
    /// stored state.
    pub async fn execute(
        &self,
        program: Program,
        namespace: HashMap<String, StoredValue>,
    ) -> Result<RawRun> {
        let config = self.config.clone();
        let timeout = config.timeout;
        let cancel = Arc::new(AtomicBool::new(false));
        let worker_cancel = Arc::clone(&cancel);
        let started = Instant::now();

        let handle = tokio::task::spawn_blocking(move || {
            run_worker(&config, program, namespace, worker_cancel)
        });

        tokio::select! {
            joined = handle => {
                let result = joined.map_err(|e| {
                    SandboxError::Worker(anyhow::anyhow!("worker panicked: {e}"))
                })??;
                let duration = started.elapsed();
                debug!(?duration, bindings = result.bindings.len(), "execution completed");
                Ok(RawRun {
                    stdout: result.stdout,
                    value_repr: result.value_repr,
                    bindings: result.bindings,
                    duration,
                })
            }
            _ = tokio::time::sleep(timeout) => {
                // Raise the flag and abandon the worker; it stops at its
                // next interrupt poll and its results are dropped with the
                // discarded join handle.
                cancel.store(true, Ordering::Relaxed);
                warn!(?timeout, "execution deadline expired, worker abandoned");
                Err(SandboxError::Timeout(timeout))
            }
        }
    }
}

struct WorkerOutput {
    stdout: String,
    value_repr: Option<String>,
    bindings: Vec<(String, StoredValue)>,
}

/// Body of the blocking worker: interpret, guard, diff, freeze.
fn run_worker(
    config: &SandboxConfig,
    program: Program,
    namespace: HashMap<String, StoredValue>,
    cancel: Arc<AtomicBool>,
) -> Result<WorkerOutput> {
    let deadline = Instant::now() + config.timeout;
    let globals: HashMap<String, _> = namespace
        .iter()
        .map(|(name, stored)| (name.clone(), stored.thaw()))
        .collect();

    let mut interp = Interpreter::new(config, globals, cancel, deadline);
    let value = interp.run(&program).map_err(|fault| match fault {
        ExecFault::Runtime(message) => SandboxError::Runtime { message },
        ExecFault::Deadline => SandboxError::Timeout(config.timeout),
        ExecFault::Size(reason) => SandboxError::SizeViolation(reason),
    })?;

    let limits = GuardLimits::from(config);
    if let Some(value) = &value {
        check_value(value, &limits).map_err(|breach| SandboxError::SizeViolation(breach.reason))?;
    }
    // A bare None terminal value is suppressed, REPL-style.
    let value_repr = match &value {
        Some(crate::sandbox::value::Value::None) | None => None,
        Some(v) => Some(v.repr()),
    };

    let (finals, stdout) = interp.into_parts();
    let mut bindings = Vec::new();
    for (name, value) in finals {
        if is_builtin_name(&name) || name.starts_with('_') {
            continue;
        }
        let changed = match namespace.get(&name) {
            None => true,
            Some(old) => !values_equal(&old.thaw(), &value),
        };
        if !changed {
            continue;
        }
        check_value(&value, &limits)
            .map_err(|breach| SandboxError::SizeViolation(breach.reason))?;
        let frozen = value.freeze().map_err(|_| {
            SandboxError::SizeViolation(format!("variable '{name}' contains a reference cycle"))
        })?;
        bindings.push((name, frozen));
    }
    bindings.sort_by(|(a, _), (b, _)| a.cmp(b));

    Ok(WorkerOutput {
        stdout,
        value_repr,
        bindings,
    })
}
