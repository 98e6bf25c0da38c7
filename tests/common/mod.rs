//! Shared fixtures for the integration tests

#![allow(dead_code)]

use media_categorizer::{AuditLog, Categorizer, Config, OpenStore, RunMode, RunOutcome, SqliteStore};
use std::path::Path;
use std::sync::Arc;

/// Two rules sharing the `Wedding` ancestor
pub const WEDDING_MAPPINGS: &str = r#"
mappings:
  Formals:
    match: Formals
    terms: ["Wedding > Portraits"]
  Candids:
    match: Candids
    terms: ["Wedding > Preparations"]
"#;

/// Build a config from the wedding mappings plus a `settings:` block.
/// The CSV report goes under `out_dir`.
pub fn wedding_config(out_dir: &Path, settings: &str) -> Config {
    let yaml = format!(
        "settings:\n  output_csv_path: {}\n{}{}",
        out_dir.join("report.csv").display(),
        settings,
        WEDDING_MAPPINGS
    );
    Config::from_yaml_str(&yaml).expect("fixture config must parse")
}

/// In-memory store seeded with attachments, keyed by id and upload filename
pub fn seeded_store(assets: &[(i64, &str)]) -> Arc<SqliteStore> {
    let store = SqliteStore::open_in_memory().expect("in-memory store");
    for (id, filename) in assets {
        store
            .insert_asset(*id, &format!("https://example.test/wp-content/uploads/2024/06/{}", filename), "")
            .expect("seed asset");
    }
    Arc::new(store)
}

pub fn run(store: &Arc<SqliteStore>, config: &Config, mode: RunMode) -> RunOutcome {
    let categorizer = Categorizer::new(Arc::new(config.clone()), store.clone());
    categorizer
        .run(mode, &mut AuditLog::new())
        .expect("run should succeed")
}

/// The CSV report without its header and timestamp column
pub fn report_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .expect("report exists")
        .lines()
        .skip(1)
        .map(|line| line.rsplit_once(',').map(|(head, _)| head.to_string()).unwrap_or_default())
        .collect()
}
