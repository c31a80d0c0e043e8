use serial_test::serial;
use std::{path::PathBuf, process::Command};

fn build_processor() -> PathBuf {
    let build_output = Command::new("cargo")
        .args(["build", "--bin", "velo-processor"])
        .output()
        .expect("Failed to execute cargo build");

    if !build_output.status.success() {
        panic!(
            "Failed to build processor: {}\n{}",
            String::from_utf8_lossy(&build_output.stdout),
            String::from_utf8_lossy(&build_output.stderr)
        );
    }

    let profile = if cfg!(debug_assertions) { "debug" } else { "release" };
    std::env::current_dir()
        .unwrap()
        .join("target")
        .join(profile)
        .join("velo-processor")
}

/// The process exits non-zero when the database cannot be reached
#[test]
#[serial]
fn test_application_exits_on_connection_failure() {
    let binary_path = build_processor();

    let output = Command::new(binary_path)
        .env(
            "CONNECTION_STRING",
            "host=invalid_host port=5432 user=postgres password=wrong dbname=nonexistent"
        )
        .env("RUST_LOG", "error")
        .env("RABBITMQ_ENABLED", "false")
        .output()
        .expect("Failed to execute processor");

    assert!(!output.status.success(), "Process should fail with invalid connection");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Failed to connect to database"),
        "Should log connection error. Got: {}",
        stderr
    );
    assert!(
        stderr.contains("Application cannot start without a valid database connection"),
        "Should log clear message about needing database connection"
    );
    assert!(output.stdout.is_empty(), "No run summary should be printed");
}

/// Clap rejects a run without a connection string before anything starts
#[test]
#[serial]
fn test_application_exits_on_missing_connection_string() {
    let binary_path = build_processor();

    let temp_dir = std::env::temp_dir().join("velo_processor_test");
    std::fs::create_dir_all(&temp_dir).ok();

    let output = Command::new(&binary_path)
        .current_dir(&temp_dir)
        .env_clear()
        .env("PATH", std::env::var("PATH").unwrap_or_default())
        .output()
        .expect("Failed to execute processor");

    std::fs::remove_dir_all(&temp_dir).ok();

    assert!(
        !output.status.success(),
        "Process should fail without CONNECTION_STRING"
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("--connection-string"),
        "Should report the missing connection string. Got: {}",
        stderr
    );
}

/// An unparseable reference instant is rejected at argument parsing
#[test]
#[serial]
fn test_application_rejects_invalid_as_of() {
    let binary_path = build_processor();

    let output = Command::new(&binary_path)
        .args(["--connection-string", "host=localhost", "--as-of", "last monday"])
        .output()
        .expect("Failed to execute processor");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--as-of"));
}
