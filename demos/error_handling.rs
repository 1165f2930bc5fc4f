//! Example of the sandbox fault taxonomy.
//!
//! Run with: cargo run --example error_handling

use std::time::Duration;

use python_repl_sandbox_rs::prelude::*;

#[tokio::main]
async fn main() {
    println!("=== Error Handling Example ===\n");

    let repl = PythonRepl::new(
        SandboxConfig::builder()
            .timeout(Duration::from_millis(500))
            .rate_limit(Duration::from_millis(0))
            .max_fuel(u64::MAX)
            .max_loop_iterations(u64::MAX)
            .build(),
    );

    let cases = [
        ("syntax fault", "def def def"),
        ("security: import", "import os"),
        ("security: reflection", "().__class__.__bases__"),
        ("security: dynamic eval", "eval('1 + 1')"),
        ("runtime fault", "1 / 0"),
        ("undefined name", "nope + 1"),
        ("timeout", "while True:\n    pass"),
        ("oversized result", "'x' * 10**8"),
    ];

    for (label, code) in cases {
        match repl.execute_raw("demo", code).await {
            Ok(result) => println!("{label}: ok -> {:?}", result.value),
            Err(e) => {
                println!("{label}: {e}");
                // Typed inspection for programmatic callers.
                if e.is_timeout() {
                    println!("  (worker was abandoned, nothing merged)");
                }
            }
        }
    }

    // Faults never corrupt stored state.
    println!("\nVariables after all failures: {}", repl.vars_count("demo"));
}
