use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_schema_outputs_valid_json() {
    let mut cmd = Command::cargo_bin("coord-agent").unwrap();
    let output = cmd.arg("schema").arg("--format").arg("json").output().unwrap();
    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(parsed.is_array());
    assert!(!parsed.as_array().unwrap().is_empty());
}

#[test]
fn test_schema_markdown_mentions_known_tool() {
    let mut cmd = Command::cargo_bin("coord-agent").unwrap();
    cmd.arg("schema")
        .arg("--format")
        .arg("markdown")
        .assert()
        .success()
        .stdout(predicate::str::contains("team_create"));
}

#[test]
fn test_config_show_port_prints_a_number() {
    let mut cmd = Command::cargo_bin("coord-agent").unwrap();
    let output = cmd.arg("config").arg("show-port").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.trim().parse::<u16>().is_ok());
}

#[test]
fn test_robot_help_outputs_schema_version() {
    let mut cmd = Command::cargo_bin("coord-agent").unwrap();
    cmd.arg("--robot-help")
        .assert()
        .success()
        .stdout(predicate::str::contains("schema_version"));
}

#[test]
fn test_robot_status_reports_health() {
    let mut cmd = Command::cargo_bin("coord-agent").unwrap();
    cmd.arg("--robot-status")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\""));
}

#[test]
fn test_health_against_unreachable_server_fails() {
    let mut cmd = Command::cargo_bin("coord-agent").unwrap();
    cmd.arg("health")
        .arg("--url")
        .arg("http://127.0.0.1:1")
        .assert()
        .failure();
}

#[test]
fn test_version_prints_package_version() {
    let mut cmd = Command::cargo_bin("coord-agent").unwrap();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("coord-agent"));
}
