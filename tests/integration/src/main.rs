//! Integration Test Runner
//!
//! Runs each integration test target in turn and prints a summary.
//!
//! # Usage
//!
//! Run all categories:
//! ```text
//! cargo run -p integration-tests
//! ```
//!
//! Run the categories whose target name contains a word:
//! ```text
//! cargo run -p integration-tests -- orpc
//! ```
//!
//! Run one category directly:
//! ```text
//! cargo test -p integration-tests --test codec_tests
//! cargo test -p integration-tests --test dispatch_tests
//! cargo test -p integration-tests --test orpc_tests
//! ```
//!
//! Test logging is controlled with `RUST_LOG`, e.g. `RUST_LOG=dcerpc=debug`.

use std::process::Command;
use std::time::{Duration, Instant};

struct TestCategory {
    name: &'static str,
    description: &'static str,
    test_name: &'static str,
}

const TEST_CATEGORIES: &[TestCategory] = &[
    TestCategory {
        name: "Codec",
        description: "NDR layout of conformant structures, deferred pointers, truncation",
        test_name: "codec_tests",
    },
    TestCategory {
        name: "Dispatch",
        description: "Opnum routing, base ranges and faults over TCP",
        test_name: "dispatch_tests",
    },
    TestCategory {
        name: "ORPC",
        description: "DCOM envelope, causality echo and IPID addressing",
        test_name: "orpc_tests",
    },
];

struct Outcome {
    name: &'static str,
    success: bool,
    duration: Duration,
    summary: String,
}

fn run_category(category: &TestCategory) -> Outcome {
    println!("\n{}", "=".repeat(80));
    println!("Running: {} ({})", category.name, category.description);
    println!("{}", "=".repeat(80));

    let start = Instant::now();
    let output = Command::new("cargo")
        .args(["test", "-p", "integration-tests", "--test", category.test_name])
        .output();
    let duration = start.elapsed();

    let (success, summary) = match output {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if !stdout.is_empty() {
                println!("{}", stdout);
            }
            if !output.status.success() {
                eprintln!("{}", String::from_utf8_lossy(&output.stderr));
            }
            let summary = stdout
                .lines()
                .rev()
                .find(|line| line.starts_with("test result:"))
                .map(str::to_string)
                .unwrap_or_else(|| format!("exit code {:?}", output.status.code()));
            (output.status.success(), summary)
        }
        Err(e) => (false, format!("failed to execute cargo: {}", e)),
    };

    Outcome {
        name: category.name,
        success,
        duration,
        summary,
    }
}

fn main() {
    let filter = std::env::args().nth(1);
    let selected: Vec<&TestCategory> = TEST_CATEGORIES
        .iter()
        .filter(|c| filter.as_deref().map_or(true, |f| c.test_name.contains(f)))
        .collect();

    if selected.is_empty() {
        eprintln!("no test category matches {:?}", filter);
        std::process::exit(2);
    }

    let total_start = Instant::now();
    let outcomes: Vec<Outcome> = selected.into_iter().map(run_category).collect();

    println!("\n{}", "=".repeat(80));
    println!("SUMMARY ({:?})", total_start.elapsed());
    println!("{}", "=".repeat(80));
    println!("{:<12} {:<6} {:<12} {}", "Category", "Status", "Duration", "Details");
    println!("{}", "-".repeat(80));
    for outcome in &outcomes {
        let status = if outcome.success { "PASS" } else { "FAIL" };
        println!(
            "{:<12} {:<6} {:<12} {}",
            outcome.name,
            status,
            format!("{:.2?}", outcome.duration),
            outcome.summary
        );
    }

    if outcomes.iter().any(|o| !o.success) {
        std::process::exit(1);
    }
}
