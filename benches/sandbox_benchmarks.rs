//! Benchmarks for the REPL sandbox.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;
use tokio::runtime::Runtime;

use python_repl_sandbox_rs::lang::parser::parse;
use python_repl_sandbox_rs::prelude::*;
use python_repl_sandbox_rs::sandbox::policy;

fn bench_config() -> SandboxConfig {
    SandboxConfig::builder()
        .timeout(Duration::from_secs(5))
        .rate_limit(Duration::from_millis(0))
        .build()
}

/// Benchmark the static front half: parse + policy validation.
fn bench_parse_and_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_validate");
    let samples = [
        ("expression", "sum(i * i for i in range(100))"),
        (
            "statements",
            "total = 0\nfor i in range(10):\n    if i % 2 == 0:\n        total += i\nprint(total)",
        ),
        (
            "function",
            "def fib(n):\n    if n < 2:\n        return n\n    return fib(n - 1) + fib(n - 2)",
        ),
    ];
    for (name, source) in samples {
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), source, |b, source| {
            b.iter(|| {
                let program = parse(black_box(source), 64).unwrap();
                policy::validate(&program).unwrap();
                black_box(program)
            });
        });
    }
    group.finish();
}

/// Benchmark full executions through the REPL pipeline.
fn bench_execute(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("execute");

    let samples = [
        ("arithmetic", "2 ** 32 + 12345 * 678"),
        ("comprehension", "sum([i * i for i in range(1000)])"),
        ("string_ops", "'-'.join([str(i) for i in range(100)])"),
        (
            "user_function",
            "def fact(n):\n    total = 1\n    for i in range(2, n + 1):\n        total *= i\n    return total\nprint(fact(20))",
        ),
    ];
    for (name, source) in samples {
        group.bench_with_input(BenchmarkId::from_parameter(name), source, |b, source| {
            let repl = PythonRepl::new(bench_config());
            b.iter(|| {
                let reply = runtime.block_on(repl.execute("bench", black_box(source)));
                black_box(reply)
            });
        });
    }
    group.finish();
}

/// Benchmark persisted-namespace round trips (thaw, run, diff, freeze).
fn bench_namespace_round_trip(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("namespace");
    group.bench_function("persisted_increment", |b| {
        let repl = PythonRepl::new(bench_config());
        runtime.block_on(repl.execute("bench", "counter = 0"));
        b.iter(|| {
            let reply = runtime.block_on(repl.execute("bench", "counter = counter + 1"));
            black_box(reply)
        });
    });
    group.finish();
}

/// Benchmark concurrent executions across distinct users.
fn bench_concurrent_users(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("concurrent");
    group.sample_size(20);
    group.bench_function("eight_users", |b| {
        let repl = std::sync::Arc::new(PythonRepl::new(bench_config()));
        b.iter(|| {
            runtime.block_on(async {
                let mut handles = Vec::new();
                for user in 0..8 {
                    let repl = std::sync::Arc::clone(&repl);
                    handles.push(tokio::spawn(async move {
                        repl.execute(&format!("user-{user}"), "sum(range(500))").await
                    }));
                }
                for handle in handles {
                    black_box(handle.await.unwrap());
                }
            });
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_parse_and_validate,
    bench_execute,
    bench_namespace_round_trip,
    bench_concurrent_users
);
criterion_main!(benches);
