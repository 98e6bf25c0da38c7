//! Audit log: every decision a run makes, in order
//!
//! Recording is infallible for callers. The optional JSON-lines stream and
//! the CSV export can fail; those failures are reported through `tracing`
//! and counted, never propagated into planning or apply.

use crate::taxonomy::{AssetId, TermId, TermPath};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::{debug, warn};
use uuid::Uuid;

/// CSV header of the exported report
pub const CSV_HEADER: &str = "asset_id,filename,matched_keywords,terms_assigned,terms_created,timestamp";

/// Why an assignment was not written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another rule or path of the same asset already yielded this term
    DuplicateInPlan,
    /// The store already relates the asset to this term
    AlreadyRelated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    Matched {
        asset_id: AssetId,
        filename: String,
        rule_keys: Vec<String>,
    },
    TermResolved {
        asset_id: AssetId,
        path: TermPath,
        existing: usize,
        missing: usize,
    },
    TermCreated {
        asset_id: AssetId,
        path: TermPath,
        id: TermId,
    },
    TermAssigned {
        asset_id: AssetId,
        path: TermPath,
        id: TermId,
    },
    AssignmentSkippedDuplicate {
        asset_id: AssetId,
        path: TermPath,
        reason: SkipReason,
    },
    Error {
        asset_id: Option<AssetId>,
        message: String,
    },
}

impl AuditEvent {
    pub fn asset_id(&self) -> Option<AssetId> {
        match self {
            Self::Matched { asset_id, .. }
            | Self::TermResolved { asset_id, .. }
            | Self::TermCreated { asset_id, .. }
            | Self::TermAssigned { asset_id, .. }
            | Self::AssignmentSkippedDuplicate { asset_id, .. } => Some(*asset_id),
            Self::Error { asset_id, .. } => *asset_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub run_id: Uuid,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AuditEvent,
}

/// One row of the tabular report
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRow {
    pub asset_id: AssetId,
    pub filename: String,
    pub matched_keywords: Vec<String>,
    pub terms_assigned: Vec<String>,
    pub terms_created: Vec<String>,
    pub errors: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditRow {
    fn empty(asset_id: AssetId, at: DateTime<Utc>) -> Self {
        Self {
            asset_id,
            filename: String::new(),
            matched_keywords: Vec::new(),
            terms_assigned: Vec::new(),
            terms_created: Vec::new(),
            errors: Vec::new(),
            timestamp: at,
        }
    }

    /// The row as one CSV line (no trailing newline)
    pub fn to_csv(&self) -> String {
        format!(
            "{},{},{},{},{},{}",
            self.asset_id,
            quote(&self.filename),
            quote(&self.matched_keywords.join(",")),
            quote(&self.terms_assigned.join(",")),
            quote(&self.terms_created.join(",")),
            self.timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
        )
    }
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

pub struct AuditLog {
    run_id: Uuid,
    entries: Vec<AuditEntry>,
    stream: Option<Box<dyn Write + Send>>,
    stream_failures: usize,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("run_id", &self.run_id)
            .field("entries", &self.entries.len())
            .field("streaming", &self.stream.is_some())
            .field("stream_failures", &self.stream_failures)
            .finish()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            entries: Vec::new(),
            stream: None,
            stream_failures: 0,
        }
    }

    /// Mirror every recorded event as one JSON line to `writer`
    pub fn with_stream(mut self, writer: impl Write + Send + 'static) -> Self {
        self.stream = Some(Box::new(writer));
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn record(&mut self, event: AuditEvent) {
        match &event {
            AuditEvent::Error { asset_id, message } => {
                warn!(run = %self.run_id, asset = ?asset_id.map(|a| a.0), %message, "audit: error");
            }
            other => debug!(run = %self.run_id, event = ?other, "audit"),
        }

        let entry = AuditEntry {
            run_id: self.run_id,
            at: Utc::now(),
            event,
        };
        self.stream_entry(&entry);
        self.entries.push(entry);
    }

    fn stream_entry(&mut self, entry: &AuditEntry) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        let result = serde_json::to_string(entry)
            .map_err(io::Error::from)
            .and_then(|line| writeln!(stream, "{}", line));
        if let Err(e) = result {
            if self.stream_failures == 0 {
                warn!(run = %self.run_id, error = %e, "audit stream write failed; further failures are counted only");
            }
            self.stream_failures += 1;
        }
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn events(&self) -> impl Iterator<Item = &AuditEvent> {
        self.entries.iter().map(|e| &e.event)
    }

    /// Number of events the stream failed to take
    pub fn stream_failures(&self) -> usize {
        self.stream_failures
    }

    /// Flush the JSON-lines stream, if any. Failures are reported, not returned.
    pub fn flush(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            if let Err(e) = stream.flush() {
                warn!(run = %self.run_id, error = %e, "audit stream flush failed");
                self.stream_failures += 1;
            }
        }
    }

    /// Fold events into one row per asset, in order of first appearance
    pub fn rows(&self) -> Vec<AuditRow> {
        let mut rows: Vec<AuditRow> = Vec::new();
        let mut index: HashMap<AssetId, usize> = HashMap::new();

        for entry in &self.entries {
            let Some(asset_id) = entry.event.asset_id() else {
                continue;
            };
            let slot = *index.entry(asset_id).or_insert_with(|| {
                rows.push(AuditRow::empty(asset_id, entry.at));
                rows.len() - 1
            });
            let row = &mut rows[slot];

            match &entry.event {
                AuditEvent::Matched {
                    filename, rule_keys, ..
                } => {
                    row.filename = filename.clone();
                    row.matched_keywords = rule_keys.clone();
                    row.timestamp = entry.at;
                }
                AuditEvent::TermCreated { path, .. } => row.terms_created.push(path.to_string()),
                AuditEvent::TermAssigned { path, .. } => row.terms_assigned.push(path.to_string()),
                AuditEvent::Error { message, .. } => row.errors.push(message.clone()),
                AuditEvent::TermResolved { .. } | AuditEvent::AssignmentSkippedDuplicate { .. } => {}
            }
        }

        rows
    }

    /// Write the tabular report as CSV
    pub fn write_csv<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writeln!(writer, "{}", CSV_HEADER)?;
        for row in self.rows() {
            writeln!(writer, "{}", row.to_csv())?;
        }
        writer.flush()
    }

    /// Write the CSV report to `path`, creating parent directories
    pub fn export_csv(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        self.write_csv(BufWriter::new(File::create(path)?))
    }
}
