//! Integration tests for the `todo-panel` CLI.
//!
//! Each test points the binary at a temp data directory, runs it as a
//! subprocess and checks stdout and the files it leaves behind.

use std::fs;
use std::path::Path;
use std::process::Command;

fn run(dir: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_todo-panel"))
        .arg("--dir")
        .arg(dir)
        .args(args)
        .env_remove("TODO_PANEL_DIR")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run todo-panel");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn run_ok(dir: &Path, args: &[&str]) -> String {
    let (stdout, stderr, success) = run(dir, args);
    if !success {
        panic!(
            "todo-panel {:?} failed:\nstdout: {}\nstderr: {}",
            args, stdout, stderr
        );
    }
    stdout
}

/// The short id printed by `add`
fn added_id(stdout: &str) -> String {
    stdout
        .split_whitespace()
        .nth(1)
        .unwrap_or_else(|| panic!("no id in output: {}", stdout))
        .to_string()
}

#[test]
fn test_add_and_list() {
    let tmp = tempfile::TempDir::new().unwrap();
    run_ok(tmp.path(), &["add", "Buy milk", "--due", "2030-01-02"]);
    run_ok(tmp.path(), &["add", "Call mom"]);

    let out = run_ok(tmp.path(), &["list"]);
    assert!(out.contains("pending (2)"));
    assert!(out.contains("Buy milk"));
    assert!(out.contains("2030-01-02"));
    assert!(out.contains("Call mom"));

    let data: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(tmp.path().join("data.json")).unwrap()).unwrap();
    assert_eq!(data["version"], "1.0");
    assert_eq!(data["todos"].as_array().unwrap().len(), 2);
}

#[test]
fn test_toggle_moves_to_completed() {
    let tmp = tempfile::TempDir::new().unwrap();
    let id = added_id(&run_ok(tmp.path(), &["add", "Write report"]));

    let out = run_ok(tmp.path(), &["toggle", &id]);
    assert!(out.starts_with("Done"));

    let out = run_ok(tmp.path(), &["list"]);
    assert!(out.contains("completed (1)"));
    assert!(out.contains("[x]"));
}

#[test]
fn test_empty_content_is_rejected() {
    let tmp = tempfile::TempDir::new().unwrap();
    let (_, stderr, success) = run(tmp.path(), &["add", "   "]);
    assert!(!success);
    assert!(stderr.contains("empty"), "stderr: {}", stderr);
}

#[test]
fn test_due_offset_out_of_range_is_rejected() {
    let tmp = tempfile::TempDir::new().unwrap();
    let (_, stderr, success) = run(tmp.path(), &["add", "x", "--due", "+99999999"]);
    assert!(!success);
    assert!(stderr.contains("date out of range"), "stderr: {}", stderr);
    assert!(!stderr.contains("panicked"));

    let out = run_ok(tmp.path(), &["add", "y", "--due", "+3"]);
    assert!(out.starts_with("Added"));
}

#[test]
fn test_fractional_split_is_kept() {
    let tmp = tempfile::TempDir::new().unwrap();
    let out = run_ok(tmp.path(), &["settings", "--split", "0.75:0.25"]);
    assert!(out.contains("splitRatio:  0.75:0.25"));

    let data: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(tmp.path().join("data.json")).unwrap()).unwrap();
    assert_eq!(data["settings"]["splitRatio"], serde_json::json!([0.75, 0.25]));
}

#[test]
fn test_unknown_sort_mode_is_rejected() {
    let tmp = tempfile::TempDir::new().unwrap();
    let (_, stderr, success) = run(tmp.path(), &["sort", "alphabetical"]);
    assert!(!success);
    assert!(stderr.contains("dueDate_asc"));
}

#[test]
fn test_subtasks_are_listed_under_parent() {
    let tmp = tempfile::TempDir::new().unwrap();
    let id = added_id(&run_ok(tmp.path(), &["add", "Plan trip"]));
    run_ok(tmp.path(), &["sub", "add", &id, "Book flights"]);
    run_ok(tmp.path(), &["sub", "add", &id, "Book hotel"]);

    let out = run_ok(tmp.path(), &["list"]);
    assert!(out.contains("[0/2]"));
    assert!(out.contains("├─"));
    assert!(out.contains("└─"));
    assert!(out.contains("Book hotel"));
}

#[test]
fn test_migrate_legacy_file() {
    let tmp = tempfile::TempDir::new().unwrap();
    fs::write(
        tmp.path().join("data.json"),
        r#"[{"id":"a","text":"x","created_at":"2025-01-01T00:00:00Z","position":0}]"#,
    )
    .unwrap();

    let out = run_ok(tmp.path(), &["migrate"]);
    assert!(out.contains("Migrated legacy-array"));

    let out = run_ok(tmp.path(), &["migrate"]);
    assert!(out.contains("up to date"));

    let out = run_ok(tmp.path(), &["backups", "list"]);
    assert!(out.contains("data_legacy_backup_"));
}

#[test]
fn test_links_are_detected() {
    let tmp = tempfile::TempDir::new().unwrap();
    let id = added_id(&run_ok(
        tmp.path(),
        &["add", "Read www.example.com/post before friday"],
    ));
    let out = run_ok(tmp.path(), &["links", &id]);
    assert!(out.contains("https://www.example.com/post"));
}

#[test]
fn test_config_is_saved() {
    let tmp = tempfile::TempDir::new().unwrap();
    run_ok(tmp.path(), &["config", "--max-backups", "4"]);
    let raw = fs::read_to_string(tmp.path().join("config.json")).unwrap();
    assert!(raw.contains("\"maxBackups\": 4"));

    let (_, _, success) = run(tmp.path(), &["config", "--max-backups", "0"]);
    assert!(!success);
}
