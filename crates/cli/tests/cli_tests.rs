//! CLI integration tests

use std::process::{Command, Output};

fn dwctl(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dwctl"))
        .args(args)
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute dwctl")
}

fn window_json(args: &[&str]) -> serde_json::Value {
    let mut full = vec!["--format", "json", "window"];
    full.extend_from_slice(args);
    let output = dwctl(&full);
    assert!(output.status.success(), "window command should succeed");
    serde_json::from_slice(&output.stdout).expect("window output should be JSON")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = dwctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("disruption window"), "Should show app description");
    assert!(stdout.contains("window"), "Should show window command");
    assert!(stdout.contains("node"), "Should show node command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = dwctl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("dwctl"), "Should show binary name");
}

#[test]
fn test_window_help() {
    let output = dwctl(&["window", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--schedule"));
    assert!(stdout.contains("--duration"));
    assert!(stdout.contains("--at"));
}

#[test]
fn test_window_requires_schedule() {
    let output = dwctl(&["window"]);
    assert!(!output.status.success(), "Missing --schedule should fail");
}

#[test]
fn test_window_open() {
    let json = window_json(&[
        "--schedule",
        "30 8 * * *",
        "--duration",
        "4h",
        "--at",
        "2024-05-01T10:00:00Z",
    ]);

    assert_eq!(json["active"], true);
    assert_eq!(json["state"], "open");
    assert_eq!(json["duration"], 4 * 3600);
    assert_eq!(json["anchor"], "2024-05-01T08:30:00Z");
}

#[test]
fn test_window_closed() {
    let json = window_json(&[
        "--schedule",
        "30 8 * * *",
        "--duration",
        "4h",
        "--at",
        "2024-05-01T12:30:00Z",
    ]);

    assert_eq!(json["active"], false);
    assert_eq!(json["state"], "closed");
    assert_eq!(json["anchor"], "2024-05-02T08:30:00Z");
}

#[test]
fn test_window_invalid_schedule_fails_open() {
    let json = window_json(&["--schedule", "hello", "--at", "2024-05-01T12:30:00Z"]);

    assert_eq!(json["active"], true);
    assert_eq!(json["state"], "invalid_schedule");
    assert_eq!(json["parse_failures"][0], "DisruptionWindowSchedule");
}

#[test]
fn test_window_short_duration_uses_default() {
    let json = window_json(&[
        "--schedule",
        "* * * * *",
        "--duration",
        "1h",
        "--at",
        "2024-05-01T12:30:00Z",
    ]);

    assert_eq!(json["active"], true);
    assert_eq!(json["duration"], 3 * 3600);
    assert_eq!(json["parse_failures"][0], "DisruptionWindowDuration");
}

#[test]
fn test_window_table_output() {
    let output = dwctl(&[
        "window",
        "--schedule",
        "@daily",
        "--at",
        "2024-05-01T01:00:00Z",
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("Disruption Window"));
    assert!(stdout.contains("Window is active"));
}

#[test]
fn test_window_rejects_bad_timestamp() {
    let output = dwctl(&["window", "--schedule", "* * * * *", "--at", "noon"]);
    assert!(!output.status.success());
}

#[test]
fn test_node_help() {
    let output = dwctl(&["node", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--kubeconfig"));
}
