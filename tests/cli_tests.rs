//! Tests for the `pulse` binary

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn pulse(project: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("pulse").unwrap();
    cmd.arg("--path").arg(project.path());
    cmd
}

#[test]
fn test_collect_prints_metrics_json() {
    let temp_dir = TempDir::new().unwrap();

    let output = pulse(&temp_dir).arg("collect").output().unwrap();
    assert!(output.status.success());

    let metrics: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(metrics.get("velocity").is_some());
    assert_eq!(metrics["trends"]["velocityTrend"], "stable");
    assert!(temp_dir.path().join(".doplan/stats/statistics.json").exists());
}

#[test]
fn test_collect_no_save_leaves_no_log() {
    let temp_dir = TempDir::new().unwrap();

    pulse(&temp_dir)
        .args(["collect", "--no-save"])
        .assert()
        .success()
        .stdout(predicate::str::contains("calculatedAt"));
    assert!(!temp_dir.path().join(".doplan/stats/statistics.json").exists());
}

#[test]
fn test_latest_on_empty_history_fails() {
    let temp_dir = TempDir::new().unwrap();

    pulse(&temp_dir)
        .arg("latest")
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("No historical data available"));
}

#[test]
fn test_history_filters_and_clear() {
    let temp_dir = TempDir::new().unwrap();
    pulse(&temp_dir).arg("collect").assert().success();
    pulse(&temp_dir).arg("collect").assert().success();

    let output = pulse(&temp_dir).arg("history").output().unwrap();
    let entries: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries[0]["metrics"].get("trends").is_none());

    let output = pulse(&temp_dir)
        .args(["history", "--until", "2000-01-01T00:00:00Z"])
        .output()
        .unwrap();
    let entries: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout).unwrap();
    assert!(entries.is_empty());

    pulse(&temp_dir)
        .arg("trends")
        .assert()
        .success()
        .stdout(predicate::str::contains("completionTrend"));

    pulse(&temp_dir).arg("clear").assert().success();
    pulse(&temp_dir).arg("latest").assert().failure();
}

#[test]
fn test_invalid_config_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir_all(temp_dir.path().join(".doplan")).unwrap();
    fs::write(temp_dir.path().join(".doplan/stats.toml"), "retention = 0\n").unwrap();

    pulse(&temp_dir)
        .arg("collect")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("retention"));
}
