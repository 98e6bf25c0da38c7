//! media-categorizer: rule-based taxonomy assignment for media libraries
//!
//! Filenames of media assets are matched against configured rules; each rule
//! maps to hierarchical term paths (`"Wedding > Portraits"`). Missing terms are
//! created parents-first, assets are related to the resulting terms, and every
//! decision lands in an audit log.
//!
//! # Core Concepts
//!
//! - **Mapping rules**: substring or regex patterns tied to term paths
//! - **Term cache**: the run's view of which (name, parent) terms exist
//! - **Assignment plan**: per-asset term ids plus the terms to create
//! - **Apply engine**: one all-or-nothing transaction, safe to re-run
//!
//! # Example
//!
//! ```
//! use media_categorizer::{match_filename, MappingRule};
//!
//! let rules = vec![MappingRule::keyword("Formals", "formals", &["Wedding > Portraits"])];
//! let matched = match_filename("Smith_Formals_001.jpg", &rules).unwrap();
//! assert!(matched.contains("Formals"));
//! ```

pub mod apply;
pub mod audit;
pub mod config;
pub mod matching;
pub mod pipeline;
pub mod plan;
pub mod storage;
pub mod taxonomy;

pub use apply::{ApplyEngine, ApplyError, ApplyReport, AssetOutcome, AssetStatus, CreationPolicy};
pub use audit::{AuditEvent, AuditLog, AuditRow, CSV_HEADER};
pub use config::{Config, ConfigError, Settings};
pub use matching::{match_filename, InvalidPatternPolicy, MappingRule, MatchError, MatchResult, RuleMatcher};
pub use pipeline::{Categorizer, CategorizerError, RunMode, RunOutcome};
pub use plan::{AssignmentPlan, AssignmentPlanner, TaxonomyMode};
pub use storage::{OpenStore, SqliteStore, StorageError, StorageResult, TermStore, TermTransaction};
pub use taxonomy::{AssetId, AssetRecord, TermCache, TermId, TermNode, TermPath, TermPathError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
