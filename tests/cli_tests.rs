//! Integration tests for the AppRun CLI
//!
//! These tests run the actual CLI binary and verify output. No engine is
//! needed: every case fails or finishes before the first engine call.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get the binary to test
fn apprun_cmd() -> Command {
    let mut cmd = Command::cargo_bin("apprun").unwrap();
    cmd.env_remove("APPRUN_ENGINE_URL")
        .env_remove("APPRUN_STORE_PATH")
        .env("RUST_LOG", "error");
    cmd
}

/// Temp dir holding a config file pointing the store inside the dir
fn config_dir() -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    let store = dir.path().join("runs.ndjson");
    fs::write(
        &path,
        format!(
            "[engine]\nurl = \"http://127.0.0.1:9\"\n\n[store]\npath = {:?}\n",
            store.to_string_lossy()
        ),
    )
    .unwrap();
    (dir, path)
}

#[test]
fn test_help_flag() {
    apprun_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run multi-block apps"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn test_run_help_lists_modes() {
    apprun_cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--stream"))
        .stdout(predicate::str::contains("--blocking"))
        .stdout(predicate::str::contains("--block-filter"));
}

#[test]
fn test_config_path_uses_override() {
    apprun_cmd()
        .args(["--config-file", "/tmp/custom-apprun.toml", "config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/tmp/custom-apprun.toml"));
}

#[test]
fn test_config_show_masks_secrets() {
    let (_dir, path) = config_dir();
    let mut content = fs::read_to_string(&path).unwrap();
    content.push_str("\n[[providers]]\nprovider_id = \"openai\"\nconfig = { api_key = \"sk-supersecret\" }\n");
    fs::write(&path, content).unwrap();

    apprun_cmd()
        .args(["--config-file", path.to_str().unwrap(), "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("http://127.0.0.1:9"))
        .stdout(predicate::str::contains("openai"))
        .stdout(predicate::str::contains("sk-supersecret").not());
}

#[test]
fn test_malformed_config_fails_with_fix() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[engine\nurl =").unwrap();

    apprun_cmd()
        .args(["--config-file", path.to_str().unwrap(), "config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("APPRUN-040"))
        .stderr(predicate::str::contains("Fix:"));
}

#[test]
fn test_runs_empty_store() {
    let (_dir, path) = config_dir();

    apprun_cmd()
        .args(["--config-file", path.to_str().unwrap(), "runs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No runs recorded"));
}

#[test]
fn test_run_with_invalid_inputs_is_invalid_request() {
    let (dir, path) = config_dir();
    let blocks = dir.path().join("blocks.json");
    let inputs = dir.path().join("inputs.json");
    fs::write(&blocks, r#"{"INPUT": {"type": "input"}}"#).unwrap();
    // Not an array
    fs::write(&inputs, r#"{"question": "2+2?"}"#).unwrap();

    apprun_cmd()
        .args([
            "--config-file",
            path.to_str().unwrap(),
            "run",
            "--project",
            "p1",
            "--app",
            "a1",
            "--user",
            "u1",
            "--hash",
            "h1",
            "--config",
            blocks.to_str().unwrap(),
            "--inputs",
            inputs.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stdout(predicate::str::contains("invalid_request_error"))
        .stderr(predicate::str::contains("APPRUN-001"));
}

#[test]
fn test_run_with_missing_file_fails() {
    let (dir, path) = config_dir();

    apprun_cmd()
        .args([
            "--config-file",
            path.to_str().unwrap(),
            "run",
            "--project",
            "p1",
            "--app",
            "a1",
            "--user",
            "u1",
            "--hash",
            "h1",
            "--config",
            dir.path().join("missing.json").to_str().unwrap(),
            "--inputs",
            dir.path().join("missing.json").to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("APPRUN-043"));
}

#[test]
fn test_show_rejects_bad_block_spec() {
    apprun_cmd()
        .args(["show", "--project", "p1", "run-1", "--block", "widget:X"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown block type"));
}
