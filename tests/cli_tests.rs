mod common;

use std::process::Command;

use common::*;

fn cli_command() -> Command {
    Command::new(env!("CARGO_BIN_EXE_work-tree"))
}

#[test]
fn test_cli_help() {
    let output = cli_command().arg("--help").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Run sample work trees"));
    assert!(stdout.contains("notifications"));
    assert!(stdout.contains("maintenance"));
    assert!(stdout.contains("sealed"));
    assert!(stdout.contains("fan-out"));
}

#[test]
fn test_cli_version() {
    let output = cli_command().arg("--version").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("work-tree"));
}

#[test]
fn test_cli_notifications_json() {
    let output = cli_command()
        .args(["notifications", "--email", "--json"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["status"], "completed");
    assert_eq!(
        value["context"]["workResults"]["logNotifications"]["result"]["notificationsSent"],
        serde_json::json!(["email"])
    );
}

#[test]
fn test_cli_maintenance_enabled() {
    let output = cli_command()
        .args(["maintenance", "--enabled"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("isSkipped: true"));
    assert!(stdout.contains("COMPLETED"));
}

#[test]
fn test_cli_sealed_invalid_user_fails() {
    let output = cli_command()
        .args(["sealed", "--user", ""])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Invalid user ID"));
}

#[test]
fn test_cli_fan_out_with_config() {
    let dir = create_test_dir();
    let config = write_config(dir.path(), "parallel_order: completion\n");

    let output = cli_command()
        .args(["fan-out", "--members", "2", "--delay-ms", "1", "--config"])
        .arg(&config)
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Using config"));
    assert!(stdout.contains("\"responded\":2"));
}

#[test]
fn test_cli_bad_config_exits_with_error() {
    let dir = create_test_dir();
    let config = write_config(dir.path(), "parallel_order: sideways\n");

    let output = cli_command()
        .args(["fan-out", "--config"])
        .arg(&config)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
}
