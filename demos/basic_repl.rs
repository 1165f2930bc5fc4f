//! Example of a basic REPL session with persistent variables.
//!
//! Run with: cargo run --example basic_repl

use python_repl_sandbox_rs::prelude::*;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    println!("=== Basic REPL Example ===\n");

    let repl = PythonRepl::new(
        SandboxConfig::builder()
            .rate_limit(std::time::Duration::from_millis(0))
            .build(),
    );

    let session = [
        "x = 5",
        "y = [i * x for i in range(4)]",
        "y",
        "total = sum(y)",
        "f'total is {total}'",
        "def double(n):\n    return n * 2",
        "double(total)",
    ];

    for code in session {
        let reply = repl.execute("demo-user", code).await;
        println!(">>> {code}");
        println!("{reply}\n");
    }

    println!("Stored variables:");
    for (name, repr) in repl.stored_vars("demo-user") {
        println!("  {name} = {repr}");
    }

    repl.clear_vars("demo-user");
    println!("\nAfter clearing: {} variables", repl.vars_count("demo-user"));
}
