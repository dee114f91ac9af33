//! Smoke tests -- verify the binary runs and the subcommands respond.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_cli_help() {
    Command::cargo_bin("threatlens")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Event threat detection engine"));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("threatlens")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("threatlens"));
}

#[test]
fn test_serve_subcommand_exists() {
    Command::cargo_bin("threatlens")
        .unwrap()
        .args(["serve", "--help"])
        .assert()
        .success();
}

#[test]
fn test_detect_from_stdin_json() {
    Command::cargo_bin("threatlens")
        .unwrap()
        .env_remove("THREATLENS_CONFIG")
        .args(["detect", "--json", "--seed", "1"])
        .write_stdin(r#"{"port": 3389, "source_ip": "10.0.0.5"}"#)
        .assert()
        .success()
        .stdout(predicate::str::contains("suspicious_port"))
        .stdout(predicate::str::contains("ml_detected_threat"));
}

#[test]
fn test_detect_from_file_with_config() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = dir.path().join("threatlens.toml");
    std::fs::write(&config, "[detection]\nstochastic_probability = 0.0\n").unwrap();
    let input = dir.path().join("record.json");
    std::fs::write(&input, r#"{"url": "/index.html"}"#).unwrap();

    Command::cargo_bin("threatlens")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .arg("detect")
        .arg("--input")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("No threats detected."));
}

#[test]
fn test_detect_rejects_empty_record() {
    Command::cargo_bin("threatlens")
        .unwrap()
        .env_remove("THREATLENS_CONFIG")
        .arg("detect")
        .write_stdin("{}")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid record"));
}

#[test]
fn test_config_prints_defaults() {
    Command::cargo_bin("threatlens")
        .unwrap()
        .env_remove("THREATLENS_CONFIG")
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("anomaly_threshold = 10"))
        .stdout(predicate::str::contains("listen_address = \"0.0.0.0:5000\""));
}
