//! The REPL facade: the full request pipeline behind one call.
//!
//! Control flow per invocation: rate limiter → source ceiling → parse →
//! policy validator → per-user serialization lock → execution engine →
//! result guard (inside the engine) → namespace merge → formatted response.
//! Nothing earlier in the pipeline has side effects, so a rejected request
//! leaves no trace.

use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, SandboxError};
use crate::lang::parser::{parse, parse_expression};
use crate::sandbox::config::SandboxConfig;
use crate::sandbox::executor::PythonSandbox;
use crate::sandbox::namespace::NamespaceStore;
use crate::sandbox::policy;
use crate::sandbox::rate::RateLimiter;

/// Message-size limit of the chat transport this subsystem feeds.
pub const TRANSPORT_CHUNK_LIMIT: usize = 1990;

/// Response sentinel for runs that produce no output.
pub const DONE_SENTINEL: &str = "Done";

/// Result of one successful invocation.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Captured print output.
    pub stdout: String,
    /// `repr` of the terminal value, for expression submissions.
    pub value: Option<String>,
    /// Wall-clock execution time.
    pub duration: Duration,
    /// Entry count of the user's namespace after merging.
    pub vars_stored: usize,
}

/// A sandboxed Python REPL with per-user persistent namespaces.
pub struct PythonRepl {
    engine: PythonSandbox,
    store: NamespaceStore,
    limiter: RateLimiter,
}

impl PythonRepl {
    /// Create a REPL with the given configuration.
    pub fn new(config: SandboxConfig) -> Self {
        let store = NamespaceStore::new(config.max_vars_per_user);
        let limiter = RateLimiter::new(config.rate_limit);
        PythonRepl {
            engine: PythonSandbox::new(config),
            store,
            limiter,
        }
    }

    /// Execute a submission and return the typed result.
    pub async fn execute_raw(&self, user_id: &str, source: &str) -> Result<ExecutionResult> {
        let source = strip_code_fence(source);

        self.limiter
            .allow(user_id)
            .map_err(|retry_after| SandboxError::RateLimited { retry_after })?;

        let config = self.engine.config();
        let len = source.chars().count();
        if len > config.max_source_length {
            return Err(SandboxError::SourceTooLong {
                len,
                max: config.max_source_length,
            });
        }

        let program = parse(&source, config.max_recursion_depth).map_err(|e| {
            SandboxError::Syntax {
                message: e.message,
                line: e.line,
            }
        })?;

        policy::validate(&program)
            .map_err(|violation| SandboxError::SecurityRejected {
                rule: violation.rule,
            })?;

        // Same-user invocations are serialized for the whole run; different
        // users proceed concurrently on independent locks.
        let lock = self.store.user_lock(user_id);
        let _guard = lock.lock().await;

        let namespace = self.store.get(user_id);
        let run = self.engine.execute(program, namespace).await?;
        let vars_stored = self.store.merge(user_id, run.bindings);

        info!(
            user_id,
            duration = ?run.duration,
            vars_stored,
            "execution finished"
        );
        Ok(ExecutionResult {
            stdout: run.stdout,
            value: run.value_repr,
            duration: run.duration,
            vars_stored,
        })
    }

    /// Execute a submission and render the response text: captured output
    /// plus the terminal value, the `Done` sentinel when there is neither,
    /// or a stable prefixed fault message.
    pub async fn execute(&self, user_id: &str, source: &str) -> String {
        match self.execute_raw(user_id, source).await {
            Ok(result) => {
                let mut text = result.stdout;
                if let Some(value) = result.value {
                    text.push_str(&value);
                }
                if text.trim().is_empty() {
                    DONE_SENTINEL.to_string()
                } else {
                    text
                }
            }
            Err(error) => {
                debug!(user_id, %error, "execution failed");
                error.to_string()
            }
        }
    }

    /// The user's stored variables as sorted `(name, repr)` pairs.
    pub fn stored_vars(&self, user_id: &str) -> Vec<(String, String)> {
        self.store
            .list(user_id)
            .into_iter()
            .map(|(name, stored)| {
                let repr = stored.thaw().repr();
                (name, repr)
            })
            .collect()
    }

    /// Wipe the user's stored variables.
    pub fn clear_vars(&self, user_id: &str) {
        self.store.clear(user_id);
        info!(user_id, "namespace cleared");
    }

    /// Entry count of the user's namespace.
    pub fn vars_count(&self, user_id: &str) -> usize {
        self.store.len(user_id)
    }

    /// Whether `source` parses as a single expression (after fence
    /// stripping). Exposed for callers that want to hint response styling.
    pub fn is_expression(&self, source: &str) -> bool {
        let source = strip_code_fence(source);
        parse_expression(&source, self.engine.config().max_recursion_depth).is_ok()
    }
}

/// Strip a surrounding code fence and a leading `python`/`py` language tag,
/// the way chat clients submit code blocks.
pub fn strip_code_fence(source: &str) -> String {
    let trimmed = source.trim().trim_matches('`');
    let trimmed = trimmed
        .strip_prefix("python\n")
        .or_else(|| trimmed.strip_prefix("py\n"))
        .unwrap_or(trimmed);
    trimmed.trim_matches('\n').to_string()
}

/// Split response text into chunks no longer than `limit` characters, for
/// transports with a message-size cap.
pub fn split_into_chunks(text: &str, limit: usize) -> Vec<String> {
    if text.is_empty() || limit == 0 {
        return Vec::new();
    }
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    for c in text.chars() {
        if count == limit {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(c);
        count += 1;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("x = 1"), "x = 1");
        assert_eq!(strip_code_fence("```python\nx = 1\n```"), "x = 1");
        assert_eq!(strip_code_fence("```py\nx = 1\n```"), "x = 1");
        assert_eq!(strip_code_fence("`x + 1`"), "x + 1");
        assert_eq!(strip_code_fence("  x = 1  "), "x = 1");
    }

    #[test]
    fn test_split_into_chunks() {
        assert_eq!(split_into_chunks("", 10), Vec::<String>::new());
        assert_eq!(split_into_chunks("abc", 10), vec!["abc"]);
        assert_eq!(split_into_chunks("abcdef", 2), vec!["ab", "cd", "ef"]);
        assert_eq!(split_into_chunks("abcde", 2), vec!["ab", "cd", "e"]);
        // Multi-byte characters count as one each.
        let chunks = split_into_chunks("ééé", 2);
        assert_eq!(chunks, vec!["éé", "é"]);
    }

    #[tokio::test]
    async fn test_done_sentinel() {
        let repl = PythonRepl::new(SandboxConfig::default());
        assert_eq!(repl.execute("u", "x = 5").await, "Done");
    }

    #[tokio::test]
    async fn test_expression_value_rendered() {
        let repl = PythonRepl::new(
            SandboxConfig::builder()
                .rate_limit(Duration::from_millis(0))
                .build(),
        );
        repl.execute("u", "x = 5").await;
        assert_eq!(repl.execute("u", "x + 1").await, "6");
    }

    #[tokio::test]
    async fn test_is_expression() {
        let repl = PythonRepl::new(SandboxConfig::default());
        assert!(repl.is_expression("1 + 1"));
        assert!(!repl.is_expression("x = 1"));
    }
}
