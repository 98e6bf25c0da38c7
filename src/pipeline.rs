//! One categorization run, end to end
//!
//! compile rules -> load term cache -> load assets -> match (parallel) -> plan
//! -> load existing relationships -> apply -> export the audit report.

use crate::apply::{ApplyEngine, ApplyError, ApplyReport, BackupHook, CacheInvalidator, CreationConfirmer};
use crate::audit::{AuditEvent, AuditLog, AuditRow};
use crate::config::{Config, ConfigError};
use crate::matching::{MatchError, MatchResult, RuleMatcher};
use crate::plan::{AssignmentPlan, AssignmentPlanner};
use crate::storage::{StorageError, TermStore};
use crate::taxonomy::{AssetId, AssetRecord, TermCache};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CategorizerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Operation failed, changes rolled back: {0}")]
    Apply(#[from] ApplyError),

    #[error("Failed to write report {}: {source}", path.display())]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Plan and report; no writes, no CSV
    DryRun,
    /// Plan and write the CSV report; no store writes
    Export,
    /// Commit the plan and write the CSV report
    Apply,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunMode::DryRun => "dry-run",
            RunMode::Export => "export",
            RunMode::Apply => "apply",
        })
    }
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub mode: RunMode,
    pub run_id: uuid::Uuid,
    pub assets_scanned: usize,
    pub assets_matched: usize,
    /// Rules dropped because their pattern did not compile
    pub skipped_rules: Vec<String>,
    pub plan: AssignmentPlan,
    pub report: ApplyReport,
    #[serde(skip)]
    pub rows: Vec<AuditRow>,
    /// Where the CSV report went, if it was written
    pub csv_path: Option<PathBuf>,
}

pub struct Categorizer {
    config: Arc<Config>,
    store: Arc<dyn TermStore>,
    engine: ApplyEngine,
    limit: Option<usize>,
}

impl Categorizer {
    pub fn new(config: Arc<Config>, store: Arc<dyn TermStore>) -> Self {
        let engine = ApplyEngine::new(store.clone()).with_creation_policy(config.settings.term_creation);
        let limit = config.settings.limit;
        Self {
            config,
            store,
            engine,
            limit,
        }
    }

    /// Cap the number of assets loaded; overrides `settings.limit`
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        if limit.is_some() {
            self.limit = limit;
        }
        self
    }

    pub fn with_backup(mut self, hook: impl BackupHook + 'static) -> Self {
        self.engine = self.engine.with_backup(hook);
        self
    }

    pub fn with_invalidator(mut self, hook: impl CacheInvalidator + 'static) -> Self {
        self.engine = self.engine.with_invalidator(hook);
        self
    }

    pub fn with_confirmer(mut self, confirmer: impl CreationConfirmer + 'static) -> Self {
        self.engine = self.engine.with_confirmer(confirmer);
        self
    }

    pub fn run(&self, mode: RunMode, audit: &mut AuditLog) -> Result<RunOutcome, CategorizerError> {
        let started = Utc::now();
        let settings = &self.config.settings;
        info!(run = %audit.run_id(), %mode, taxonomy_mode = %settings.mode, "starting run");

        let matcher = RuleMatcher::compile(&self.config.rules, settings.invalid_regex)?;
        for key in matcher.skipped() {
            audit.record(AuditEvent::Error {
                asset_id: None,
                message: format!("mapping '{}' skipped: invalid regex pattern", key),
            });
        }

        let mut cache = TermCache::from_nodes(self.store.load_terms()?);
        let assets = self.store.load_assets(self.limit)?;
        info!(assets = assets.len(), terms = cache.len(), "loaded store snapshot");

        let matches = matcher.match_assets(&assets);
        let assets_matched = record_matches(&assets, &matches, audit);
        info!(matched = assets_matched, scanned = assets.len(), "matching complete");

        let plan = AssignmentPlanner::new(&mut cache, settings.mode).plan(&matches, audit);
        let existing = self.store.load_relationships()?;

        let result = self.engine.apply(&plan, &existing, mode != RunMode::Apply, audit);
        let report = match result {
            Ok(report) => report,
            Err(e) => {
                audit.flush();
                return Err(e.into());
            }
        };

        let csv_path = match mode {
            RunMode::DryRun => None,
            RunMode::Export | RunMode::Apply => {
                let path = settings.csv_path(started);
                match audit.export_csv(&path) {
                    Ok(()) => {
                        info!(path = %path.display(), "report written");
                        Some(path)
                    }
                    // The apply already committed, so a lost report is only a warning
                    Err(e) if mode == RunMode::Apply => {
                        warn!(path = %path.display(), error = %e, "could not write report");
                        None
                    }
                    Err(source) => {
                        audit.flush();
                        return Err(CategorizerError::Export { path, source });
                    }
                }
            }
        };
        audit.flush();

        Ok(RunOutcome {
            mode,
            run_id: audit.run_id(),
            assets_scanned: assets.len(),
            assets_matched,
            skipped_rules: matcher.skipped().to_vec(),
            plan,
            report,
            rows: audit.rows(),
            csv_path,
        })
    }
}

/// Record one `Matched` event per asset with at least one match. Returns how
/// many assets matched.
fn record_matches(assets: &[AssetRecord], matches: &[MatchResult], audit: &mut AuditLog) -> usize {
    let mut keys: HashMap<AssetId, Vec<String>> = HashMap::new();
    for m in matches {
        keys.entry(m.asset_id).or_default().push(m.rule_key.clone());
    }

    let mut matched = 0;
    for asset in assets {
        if let Some(rule_keys) = keys.remove(&asset.id) {
            matched += 1;
            audit.record(AuditEvent::Matched {
                asset_id: asset.id,
                filename: asset.filename.clone(),
                rule_keys,
            });
        }
    }
    matched
}
