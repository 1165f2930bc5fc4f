//! Example of concurrent execution for many independent users.
//!
//! Each user's invocations are serialized, but different users run
//! concurrently on separate worker threads.
//!
//! Run with: cargo run --example concurrent_users

use std::sync::Arc;
use std::time::Instant;

use python_repl_sandbox_rs::prelude::*;

#[tokio::main]
async fn main() {
    println!("=== Concurrent Users Example ===\n");

    let repl = Arc::new(PythonRepl::new(
        SandboxConfig::builder()
            .rate_limit(std::time::Duration::from_millis(0))
            .build(),
    ));

    let tasks = [
        ("user-1", "sum([i ** 2 for i in range(500)])"),
        ("user-2", "len([x for x in range(1000) if x % 3 == 0])"),
        ("user-3", "''.join([chr(65 + i % 26) for i in range(50)])"),
        ("user-4", "max([i * (100 - i) for i in range(101)])"),
    ];

    println!("Starting {} concurrent executions...\n", tasks.len());
    let start = Instant::now();

    let mut handles = Vec::new();
    for (user, code) in tasks {
        let repl = Arc::clone(&repl);
        handles.push(tokio::spawn(async move {
            let reply = repl.execute(user, code).await;
            (user, code, reply)
        }));
    }

    for handle in handles {
        let (user, code, reply) = handle.await.expect("task panicked");
        println!("{user}: {code}");
        println!("  -> {reply}");
    }

    println!("\nAll executions finished in {:?}", start.elapsed());

    // Namespaces stayed isolated: none of the users can see another's state.
    let probe = repl.execute("user-1", "unknown_from_other_user").await;
    println!("Cross-user probe: {probe}");
}
