//! End-to-end tests of the REPL pipeline: namespace persistence, user
//! isolation, eviction, rate limiting, and response formatting.

use std::sync::Arc;
use std::time::Duration;

use python_repl_sandbox_rs::prelude::*;
use python_repl_sandbox_rs::repl::{DONE_SENTINEL, TRANSPORT_CHUNK_LIMIT};

fn quick_config() -> SandboxConfig {
    SandboxConfig::builder()
        .timeout(Duration::from_secs(2))
        .rate_limit(Duration::from_millis(0))
        .build()
}

fn repl() -> PythonRepl {
    PythonRepl::new(quick_config())
}

/// Variables set by one run are visible to the next run of the same user.
#[tokio::test]
async fn test_namespace_persists_across_runs() {
    let repl = repl();
    assert_eq!(repl.execute("alice", "x = 5").await, DONE_SENTINEL);
    assert_eq!(repl.execute("alice", "x + 1").await, "6");
    assert_eq!(repl.execute("alice", "x = x + 10").await, DONE_SENTINEL);
    assert_eq!(repl.execute("alice", "x").await, "15");
}

/// User A persists `x`; user B must not see it.
#[tokio::test]
async fn test_namespace_isolation_between_users() {
    let repl = repl();
    assert_eq!(repl.execute("alice", "x = 5").await, DONE_SENTINEL);
    assert_eq!(repl.execute("alice", "x + 1").await, "6");

    let reply = repl.execute("bob", "x + 1").await;
    assert!(
        reply.starts_with("runtime error:") && reply.contains("'x' is not defined"),
        "user B must fault on user A's variable, got {reply:?}"
    );
}

/// Two users running identical code concurrently never cross-contaminate.
#[tokio::test]
async fn test_concurrent_users_do_not_contaminate() {
    let repl = Arc::new(repl());
    let code = "xs = []\nfor i in range(50):\n    xs.append(i)\nme = whoami";

    let seed_a = repl.execute("alice", "whoami = 'alice'").await;
    let seed_b = repl.execute("bob", "whoami = 'bob'").await;
    assert_eq!(seed_a, DONE_SENTINEL);
    assert_eq!(seed_b, DONE_SENTINEL);

    let (a, b) = tokio::join!(
        {
            let repl = Arc::clone(&repl);
            async move { repl.execute("alice", code).await }
        },
        {
            let repl = Arc::clone(&repl);
            async move { repl.execute("bob", code).await }
        }
    );
    assert_eq!(a, DONE_SENTINEL);
    assert_eq!(b, DONE_SENTINEL);

    assert_eq!(repl.execute("alice", "me").await, "'alice'");
    assert_eq!(repl.execute("bob", "me").await, "'bob'");
}

/// Same-user invocations are serialized in submission order.
#[tokio::test]
async fn test_same_user_runs_serialized() {
    let repl = Arc::new(repl());
    repl.execute("alice", "n = 0").await;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let repl = Arc::clone(&repl);
        handles.push(tokio::spawn(async move {
            repl.execute("alice", "n = n + 1").await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), DONE_SENTINEL);
    }
    // No lost updates: every increment saw the previous one.
    assert_eq!(repl.execute("alice", "n").await, "5");
}

/// Exceeding the namespace ceiling wipes everything; only the new run's
/// bindings survive.
#[tokio::test]
async fn test_namespace_eviction_is_full_reset() {
    let config = SandboxConfig::builder()
        .rate_limit(Duration::from_millis(0))
        .max_vars_per_user(3)
        .build();
    let repl = PythonRepl::new(config);

    repl.execute("alice", "a = 1\nb = 2\nc = 3").await;
    assert_eq!(repl.vars_count("alice"), 3);

    // The next merge would exceed the ceiling: full eviction first.
    repl.execute("alice", "d = 4").await;
    let names: Vec<String> = repl
        .stored_vars("alice")
        .into_iter()
        .map(|(n, _)| n)
        .collect();
    assert_eq!(names, vec!["d"]);
}

/// Two invocations closer together than the cooldown: the second is
/// rejected with no side effects.
#[tokio::test]
async fn test_rate_limiting() {
    let config = SandboxConfig::builder()
        .rate_limit(Duration::from_secs(60))
        .build();
    let repl = PythonRepl::new(config);

    assert_eq!(repl.execute("alice", "x = 1").await, DONE_SENTINEL);
    let result = repl.execute_raw("alice", "y = 2").await;
    assert!(matches!(result, Err(SandboxError::RateLimited { .. })));
    // The rejected call executed nothing.
    assert_eq!(repl.vars_count("alice"), 1);

    // Another user is unaffected.
    assert_eq!(repl.execute("bob", "x = 1").await, DONE_SENTINEL);
}

/// Output and terminal value compose into the response payload.
#[tokio::test]
async fn test_response_formatting() {
    let repl = repl();
    assert_eq!(repl.execute("u", "print('hi')").await, "hi\n");
    assert_eq!(repl.execute("u", "1 + 1").await, "2");
    assert_eq!(repl.execute("u", "'text'").await, "'text'");
    assert_eq!(repl.execute("u", "[1, 2]").await, "[1, 2]");
    assert_eq!(repl.execute("u", "None").await, DONE_SENTINEL);
    assert_eq!(repl.execute("u", "pass").await, DONE_SENTINEL);
}

/// Fault classes produce distinct stable prefixes.
#[tokio::test]
async fn test_fault_message_prefixes() {
    let repl = repl();
    assert!(repl
        .execute("u", "x ===")
        .await
        .starts_with("syntax error:"));
    assert!(repl
        .execute("u", "import os")
        .await
        .starts_with("operation not allowed:"));
    assert!(repl
        .execute("u", "1 / 0")
        .await
        .starts_with("runtime error:"));
    assert!(repl
        .execute("u", "'x' * 10**9")
        .await
        .starts_with("result too large:"));

    let config = SandboxConfig::builder()
        .rate_limit(Duration::from_secs(60))
        .build();
    let limited = PythonRepl::new(config);
    limited.execute("u", "1").await;
    assert!(limited
        .execute("u", "2")
        .await
        .starts_with("rate limited:"));

    let long_source = format!("x = {}", "1 + ".repeat(400));
    assert!(repl
        .execute("u", &long_source)
        .await
        .starts_with("source too long:"));
}

/// Code-fenced submissions are stripped before execution.
#[tokio::test]
async fn test_code_fence_stripping() {
    let repl = repl();
    assert_eq!(repl.execute("u", "```python\n1 + 1\n```").await, "2");
    assert_eq!(repl.execute("u", "`2 + 2`").await, "4");
}

/// The stored-variables listing renders sorted `name = repr` pairs.
#[tokio::test]
async fn test_stored_vars_listing_and_clear() {
    let repl = repl();
    repl.execute("alice", "b = [1, 2]\na = 'hi'").await;
    let vars = repl.stored_vars("alice");
    assert_eq!(
        vars,
        vec![
            ("a".to_string(), "'hi'".to_string()),
            ("b".to_string(), "[1, 2]".to_string()),
        ]
    );

    repl.clear_vars("alice");
    assert!(repl.stored_vars("alice").is_empty());
    // Cleared namespace behaves like a fresh one.
    let reply = repl.execute("alice", "a").await;
    assert!(reply.starts_with("runtime error:"));
}

/// Long responses chunk at the transport limit without splitting characters.
#[tokio::test]
async fn test_transport_chunking() {
    let repl = repl();
    let reply = repl.execute("u", "print('x' * 5000)").await;
    let chunks = split_into_chunks(&reply, TRANSPORT_CHUNK_LIMIT);
    assert!(chunks.len() > 1);
    assert!(chunks.iter().all(|c| c.chars().count() <= TRANSPORT_CHUNK_LIMIT));
    let rejoined: String = chunks.concat();
    assert_eq!(rejoined, reply);
}

/// Stored functions keep working on later invocations.
#[tokio::test]
async fn test_functions_persist_across_runs() {
    let repl = repl();
    repl.execute("alice", "def square(n):\n    return n * n")
        .await;
    assert_eq!(repl.execute("alice", "square(12)").await, "144");
}

/// Mutating a stored collection persists the mutation.
#[tokio::test]
async fn test_collection_mutation_persists() {
    let repl = repl();
    repl.execute("alice", "xs = [1]").await;
    repl.execute("alice", "xs.append(2)").await;
    assert_eq!(repl.execute("alice", "xs").await, "[1, 2]");
}

/// A failed run merges nothing, even bindings made before the fault.
#[tokio::test]
async fn test_failed_run_merges_nothing() {
    let repl = repl();
    let reply = repl.execute("alice", "a = 1\nb = missing").await;
    assert!(reply.starts_with("runtime error:"));
    assert!(repl.stored_vars("alice").is_empty());
}
