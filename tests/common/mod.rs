//! Common test utilities for cross-backend tests.

use std::process::{Command, Output};

use tracing_subscriber::EnvFilter;

/// Log to the test harness when `RUST_LOG` is set.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn rustc() -> String {
    std::env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string())
}

/// Whether a Rust compiler can be invoked from the test environment.
#[allow(dead_code)]
pub fn rustc_available() -> bool {
    Command::new(rustc())
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success())
}

/// Compile a transpiled program with `rustc` and run the executable.
///
/// Integer overflow wraps in both backends, so overflow checks are disabled
/// to keep debug builds from panicking where the JIT wraps.
#[allow(dead_code)]
pub fn compile_and_run_rust(source: &str) -> Output {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let source_path = dir.path().join("program.rs");
    let binary_path = dir
        .path()
        .join(format!("program{}", std::env::consts::EXE_SUFFIX));
    std::fs::write(&source_path, source).expect("Failed to write Rust source");

    let compile = Command::new(rustc())
        .args(["--edition", "2021", "-C", "overflow-checks=off", "-o"])
        .arg(&binary_path)
        .arg(&source_path)
        .output()
        .expect("Failed to execute rustc");
    assert!(
        compile.status.success(),
        "rustc rejected the transpiled program:\n{}\n--- source ---\n{source}",
        String::from_utf8_lossy(&compile.stderr)
    );

    Command::new(&binary_path)
        .output()
        .expect("Failed to execute compiled program")
}
