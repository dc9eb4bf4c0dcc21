use serial_test::serial;
use std::process::Command;

const BINARY: &str = env!("CARGO_BIN_EXE_story-evolver");

/// Test that the application exits with error code when database connection fails
#[test]
#[serial]
fn test_application_exits_on_connection_failure() {
    let output = Command::new(BINARY)
        .env(
            "CONNECTION_STRING",
            "host=invalid_host port=5432 user=postgres password=wrong dbname=nonexistent connect_timeout=5"
        )
        .env("JUDGE_COMMAND", "true")
        .env("GENERATOR_COMMAND", "true")
        .env("RUST_LOG", "error")
        .output()
        .expect("Failed to execute story-evolver");

    // Should exit with error code
    assert!(!output.status.success(), "Process should fail with invalid connection");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Failed to connect to database"),
        "Should log connection error"
    );
    assert!(
        stderr.contains("Application cannot start without a valid database connection"),
        "Should log clear message about needing database connection"
    );
}

/// Test that the application handles missing CONNECTION_STRING environment variable
#[test]
#[serial]
fn test_application_exits_on_missing_connection_string() {
    // Run from a directory without a .env file
    let temp_dir = std::env::temp_dir().join("story_evolver_test");
    std::fs::create_dir_all(&temp_dir).expect("Failed to create temp dir");

    let output = Command::new(BINARY)
        .current_dir(&temp_dir)
        .env_remove("CONNECTION_STRING")
        .env("JUDGE_COMMAND", "true")
        .env("GENERATOR_COMMAND", "true")
        .output()
        .expect("Failed to execute story-evolver");

    assert!(!output.status.success(), "Process should fail without a connection string");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("--connection-string"),
        "Should tell the user which argument is missing"
    );
}
