//! Integration tests for the replitrace command line
#![allow(deprecated)] // suppress assert_cmd::Command::cargo_bin deprecation in tests

mod utils;

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use utils::{main_capture, peer_capture, CaptureBuilder};

fn catalog_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("main.ndjson"), main_capture().build()).unwrap();
    fs::write(dir.path().join("peer.ndjson"), peer_capture().build()).unwrap();
    fs::write(
        dir.path().join("old.ndjson"),
        CaptureBuilder::new(7, -600).init(7, 0.0, -600, "Old").build(),
    )
    .unwrap();
    fs::write(dir.path().join("notes.txt"), "not a capture").unwrap();
    dir
}

fn replitrace() -> Command {
    Command::cargo_bin("replitrace").unwrap()
}

fn analyze(dir: &Path) -> Command {
    let mut cmd = replitrace();
    cmd.arg("analyze").arg(dir).arg("--main").arg("1");
    cmd
}

#[test]
fn test_list_captures() {
    let dir = catalog_dir();
    replitrace()
        .arg("list")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("ID"))
        .stdout(predicate::str::contains("main.ndjson"))
        .stdout(predicate::str::contains("peer.ndjson"))
        .stdout(predicate::str::contains("notes.txt").not());
}

#[test]
fn test_analyze_text_without_draining() {
    let dir = catalog_dir();
    analyze(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Replication Analysis (capture 1)"))
        .stdout(predicate::str::contains("Server"))
        .stdout(predicate::str::contains("capture 2:"))
        .stdout(predicate::str::contains("/Game/Foo").not());
}

#[test]
fn test_analyze_json_with_draining() {
    let dir = catalog_dir();
    let output = analyze(dir.path())
        .arg("--drain-peers")
        .arg("--format")
        .arg("json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["format"], "replitrace-json-v1");
    assert_eq!(report["main_capture"], 1);
    assert_eq!(report["peer_captures"].as_array().unwrap().len(), 1);

    let sequence = &report["protocols"][0]["objects"][0]["sequences"][0];
    assert_eq!(report["protocols"][0]["objects"][0]["path"], "/Game/Foo");
    assert_eq!(sequence["id"], 5);
    assert_eq!(sequence["start"], 8.0);
    assert!(sequence["end"].is_null());
    assert_eq!(sequence["state"], "open");
}

#[test]
fn test_analyze_config_file() {
    let dir = catalog_dir();
    let config = dir.path().join("replitrace.toml");
    fs::write(&config, "drain_peer_captures = true\ndiscovery_tolerance_secs = 1.0\n").unwrap();

    // Peer was created 2s after main, outside a 1s tolerance
    analyze(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("--format")
        .arg("json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"peer_captures\": []"));
}

#[test]
fn test_tolerance_flag_overrides_config() {
    let dir = catalog_dir();
    let config = dir.path().join("replitrace.toml");
    fs::write(&config, "discovery_tolerance_secs = 1.0\n").unwrap();

    analyze(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("--tolerance")
        .arg("5")
        .assert()
        .success()
        .stdout(predicate::str::contains("capture 2:"));
}

#[test]
fn test_unknown_main_capture_fails() {
    let dir = catalog_dir();
    replitrace()
        .arg("analyze")
        .arg(dir.path())
        .arg("--main")
        .arg("42")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Capture 42 not found"));
}

#[test]
fn test_invalid_config_fails() {
    let dir = catalog_dir();
    let config = dir.path().join("bad.toml");
    fs::write(&config, "tick_interval_events = 0\n").unwrap();

    analyze(dir.path())
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("tick_interval_events"));
}

#[test]
fn test_missing_catalog_dir_fails() {
    replitrace()
        .arg("list")
        .arg("/nonexistent/replitrace-captures")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to open capture catalog"));
}
