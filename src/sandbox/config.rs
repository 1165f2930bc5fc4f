//! Sandbox configuration with builder pattern.

use std::time::Duration;

/// Configuration for the REPL sandbox.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Maximum execution time before timeout.
    pub timeout: Duration,
    /// Minimum spacing between one user's invocations.
    pub rate_limit: Duration,
    /// Namespace entry ceiling; exceeding it wipes the namespace.
    pub max_vars_per_user: usize,
    /// Result Guard: maximum length of any produced string.
    pub max_string_length: usize,
    /// Result Guard: maximum element count of any produced collection.
    pub max_collection_size: usize,
    /// Result Guard: maximum traversal depth of a produced value.
    pub max_value_depth: usize,
    /// Parser nesting and interpreter call-depth ceiling.
    pub max_recursion_depth: usize,
    /// Per-loop iteration budget.
    pub max_loop_iterations: u64,
    /// Total evaluation-step budget per run.
    pub max_fuel: u64,
    /// Captured-output byte ceiling.
    pub max_output_bytes: usize,
    /// Submitted source character ceiling.
    pub max_source_length: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            rate_limit: Duration::from_secs(1),
            max_vars_per_user: 500,
            max_string_length: 10_000,
            max_collection_size: 1_000,
            max_value_depth: 32,
            max_recursion_depth: 64,
            max_loop_iterations: 100_000,
            max_fuel: 1_000_000,
            max_output_bytes: 64 * 1024,
            max_source_length: 1_000,
        }
    }
}

impl SandboxConfig {
    /// Create a new builder for SandboxConfig.
    pub fn builder() -> SandboxConfigBuilder {
        SandboxConfigBuilder::default()
    }
}

/// Builder for creating SandboxConfig instances.
#[derive(Debug, Clone, Default)]
pub struct SandboxConfigBuilder {
    timeout: Option<Duration>,
    rate_limit: Option<Duration>,
    max_vars_per_user: Option<usize>,
    max_string_length: Option<usize>,
    max_collection_size: Option<usize>,
    max_value_depth: Option<usize>,
    max_recursion_depth: Option<usize>,
    max_loop_iterations: Option<u64>,
    max_fuel: Option<u64>,
    max_output_bytes: Option<usize>,
    max_source_length: Option<usize>,
}

impl SandboxConfigBuilder {
    /// Set the maximum execution timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the per-user invocation cooldown.
    pub fn rate_limit(mut self, cooldown: Duration) -> Self {
        self.rate_limit = Some(cooldown);
        self
    }

    /// Set the namespace entry ceiling.
    pub fn max_vars_per_user(mut self, count: usize) -> Self {
        self.max_vars_per_user = Some(count);
        self
    }

    /// Set the Result Guard string-length ceiling.
    pub fn max_string_length(mut self, chars: usize) -> Self {
        self.max_string_length = Some(chars);
        self
    }

    /// Set the Result Guard collection-size ceiling.
    pub fn max_collection_size(mut self, elements: usize) -> Self {
        self.max_collection_size = Some(elements);
        self
    }

    /// Set the Result Guard value-depth ceiling.
    pub fn max_value_depth(mut self, depth: usize) -> Self {
        self.max_value_depth = Some(depth);
        self
    }

    /// Set the parser nesting / call-depth ceiling.
    pub fn max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = Some(depth);
        self
    }

    /// Set the per-loop iteration budget.
    pub fn max_loop_iterations(mut self, iterations: u64) -> Self {
        self.max_loop_iterations = Some(iterations);
        self
    }

    /// Set the total evaluation-step budget.
    pub fn max_fuel(mut self, fuel: u64) -> Self {
        self.max_fuel = Some(fuel);
        self
    }

    /// Set the captured-output byte ceiling.
    pub fn max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = Some(bytes);
        self
    }

    /// Set the submitted-source character ceiling.
    pub fn max_source_length(mut self, chars: usize) -> Self {
        self.max_source_length = Some(chars);
        self
    }

    /// Build the SandboxConfig.
    pub fn build(self) -> SandboxConfig {
        let default = SandboxConfig::default();
        SandboxConfig {
            timeout: self.timeout.unwrap_or(default.timeout),
            rate_limit: self.rate_limit.unwrap_or(default.rate_limit),
            max_vars_per_user: self.max_vars_per_user.unwrap_or(default.max_vars_per_user),
            max_string_length: self.max_string_length.unwrap_or(default.max_string_length),
            max_collection_size: self
                .max_collection_size
                .unwrap_or(default.max_collection_size),
            max_value_depth: self.max_value_depth.unwrap_or(default.max_value_depth),
            max_recursion_depth: self
                .max_recursion_depth
                .unwrap_or(default.max_recursion_depth),
            max_loop_iterations: self
                .max_loop_iterations
                .unwrap_or(default.max_loop_iterations),
            max_fuel: self.max_fuel.unwrap_or(default.max_fuel),
            max_output_bytes: self.max_output_bytes.unwrap_or(default.max_output_bytes),
            max_source_length: self.max_source_length.unwrap_or(default.max_source_length),
        }
    }
}
