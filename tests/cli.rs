//! Exit codes and output of the media-categorizer binary

mod common;

use common::WEDDING_MAPPINGS;
use media_categorizer::{AssetId, OpenStore, SqliteStore};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn categorizer(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_media-categorizer"))
        .args(args)
        .output()
        .expect("binary runs")
}

/// Write a config and a seeded on-disk database into `dir`
fn fixture(dir: &Path, settings: &str, mappings: &str) -> (PathBuf, PathBuf) {
    let db = dir.join("media.db");
    let store = SqliteStore::open(&db).unwrap();
    store.insert_asset(1, "https://example.test/uploads/Smith_Formals_001.jpg", "").unwrap();
    store.insert_asset(2, "https://example.test/uploads/IMG_0002.jpg", "").unwrap();
    drop(store);

    let config = dir.join("config.yml");
    let yaml = format!(
        "settings:\n  db_path: {}\n  output_csv_path: {}\n{}{}",
        db.display(),
        dir.join("logs/report-{date}.csv").display(),
        settings,
        mappings
    );
    std::fs::write(&config, yaml).unwrap();
    (config, db)
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn missing_config_exits_with_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.yml");
    let output = categorizer(&["--config", missing.to_str().unwrap(), "--dry-run"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Cannot read"));
}

#[test]
fn invalid_mode_names_the_field() {
    let dir = tempfile::tempdir().unwrap();
    let (config, _) = fixture(dir.path(), "  apply_taxonomy:\n    mode: leaves_only\n", WEDDING_MAPPINGS);
    let output = categorizer(&["--config", config.to_str().unwrap(), "--dry-run"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("settings.apply_taxonomy.mode"));
}

#[test]
fn empty_mappings_are_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let (config, _) = fixture(dir.path(), "", "mappings: {}\n");
    let output = categorizer(&["--config", config.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("No mappings defined"));
}

#[test]
fn dry_run_prints_summary_and_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (config, db) = fixture(dir.path(), "", WEDDING_MAPPINGS);
    let plan = dir.path().join("plan.json");

    let output = categorizer(&[
        "--config",
        config.to_str().unwrap(),
        "--dry-run",
        "--plan-json",
        plan.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Smith_Formals_001.jpg"));
    assert!(stdout.contains("would apply"));
    // Keywords and term paths follow the status column
    let row = stdout.lines().find(|line| line.contains("Smith_Formals_001.jpg")).unwrap();
    let after_status = row.split("would apply").nth(1).unwrap();
    assert!(after_status.contains("Formals"));
    assert!(after_status.contains("Wedding, Wedding > Portraits"));
    assert!(stdout.contains("2 assignment(s) planned"));

    let plan: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(plan).unwrap()).unwrap();
    assert_eq!(plan["new_terms"].as_array().unwrap().len(), 2);

    let store = SqliteStore::open(&db).unwrap();
    assert_eq!(store.term_total().unwrap(), 0);
}

#[test]
fn apply_commits_and_writes_report() {
    let dir = tempfile::tempdir().unwrap();
    let (config, db) = fixture(dir.path(), "", WEDDING_MAPPINGS);
    let audit = dir.path().join("audit.jsonl");

    let output = categorizer(&[
        "--config",
        config.to_str().unwrap(),
        "--audit-jsonl",
        audit.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let store = SqliteStore::open(&db).unwrap();
    assert_eq!(store.terms_of(AssetId(1)).unwrap().len(), 2);

    let reports: Vec<_> = std::fs::read_dir(dir.path().join("logs")).unwrap().collect();
    assert_eq!(reports.len(), 1);

    let events = std::fs::read_to_string(audit).unwrap();
    assert!(events.lines().any(|line| line.contains("\"event\":\"term_created\"")));
}

#[test]
fn db_flag_overrides_config() {
    let dir = tempfile::tempdir().unwrap();
    let (config, _) = fixture(dir.path(), "", WEDDING_MAPPINGS);
    let other = dir.path().join("other.db");
    SqliteStore::open(&other).unwrap();

    let output = categorizer(&[
        "--config",
        config.to_str().unwrap(),
        "--db",
        other.to_str().unwrap(),
        "--dry-run",
    ]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("0 asset(s) scanned"));
}
