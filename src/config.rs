//! YAML configuration
//!
//! The file is deserialized into raw structs that mirror its shape, then
//! validated into an immutable [`Config`]. Validation happens before any asset
//! is touched and every error names the offending field.

use crate::apply::CreationPolicy;
use crate::matching::{InvalidPatternPolicy, MappingRule};
use crate::plan::TaxonomyMode;
use crate::storage::DEFAULT_TAXONOMY;
use crate::taxonomy::{TermPath, TermPathError};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config.yml";
pub const DEFAULT_CSV_PATH: &str = "./logs/media-categorizer-log.csv";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("settings.apply_taxonomy.mode: invalid mode '{0}' (expected all, children_only or bottom_only)")]
    InvalidMode(String),

    #[error("No mappings defined in configuration")]
    NoMappings,

    #[error("mappings.{rule}: {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("mappings.{rule}.match must not be empty")]
    EmptyPattern { rule: String },

    #[error("mappings.{rule}.terms: malformed term path '{path}': {source}")]
    MalformedTermPath {
        rule: String,
        path: String,
        #[source]
        source: TermPathError,
    },

    #[error("{0} is required")]
    MissingField(String),
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    settings: RawSettings,
    #[serde(default)]
    mappings: Option<serde_yaml::Mapping>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    db_path: Option<PathBuf>,
    wp_path: Option<PathBuf>,
    taxonomy: Option<String>,
    output_csv_path: Option<String>,
    limit: Option<usize>,
    invalid_regex: InvalidPatternPolicy,
    term_creation: CreationPolicy,
    /// Defaults to on whenever `wp_path` is set
    flush_cache: Option<bool>,
    apply_taxonomy: RawApplyTaxonomy,
    backup: RawBackup,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawApplyTaxonomy {
    mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawBackup {
    enabled: bool,
    output_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMapping {
    #[serde(rename = "match")]
    pattern: Option<String>,
    #[serde(default)]
    regex: bool,
    #[serde(default)]
    terms: RawTerms,
}

/// `terms` may be a single path or a list of paths
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTerms {
    One(String),
    Many(Vec<String>),
}

impl Default for RawTerms {
    fn default() -> Self {
        RawTerms::Many(Vec::new())
    }
}

impl RawTerms {
    fn into_vec(self) -> Vec<String> {
        match self {
            RawTerms::One(path) => vec![path],
            RawTerms::Many(paths) => paths,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSettings {
    pub enabled: bool,
    /// Path template; may contain `{date}` or `{timestamp}`
    pub output_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub db_path: Option<PathBuf>,
    pub wp_path: Option<PathBuf>,
    pub taxonomy: String,
    pub mode: TaxonomyMode,
    /// Path template; may contain `{date}` or `{timestamp}`
    pub output_csv_path: String,
    pub limit: Option<usize>,
    pub invalid_regex: InvalidPatternPolicy,
    pub term_creation: CreationPolicy,
    pub flush_cache: bool,
    pub backup: BackupSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: None,
            wp_path: None,
            taxonomy: DEFAULT_TAXONOMY.to_string(),
            mode: TaxonomyMode::All,
            output_csv_path: DEFAULT_CSV_PATH.to_string(),
            limit: None,
            invalid_regex: InvalidPatternPolicy::Fail,
            term_creation: CreationPolicy::Auto,
            flush_cache: false,
            backup: BackupSettings {
                enabled: false,
                output_path: None,
            },
        }
    }
}

impl Settings {
    /// CSV report path for a run started at `now`
    pub fn csv_path(&self, now: DateTime<Utc>) -> PathBuf {
        PathBuf::from(expand_path_template(&self.output_csv_path, now))
    }

    /// Backup path for a run started at `now`, if one is configured
    pub fn backup_path(&self, now: DateTime<Utc>) -> Option<PathBuf> {
        self.backup
            .output_path
            .as_deref()
            .map(|template| PathBuf::from(expand_path_template(template, now)))
    }
}

/// Validated, immutable configuration. Rules keep file order.
#[derive(Debug, Clone)]
pub struct Config {
    pub settings: Settings,
    pub rules: Vec<MappingRule>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes as unit, not as an empty map
        let raw: RawConfig = if text.trim().is_empty() {
            RawConfig::default()
        } else {
            serde_yaml::from_str(text)?
        };
        let settings = validate_settings(raw.settings)?;
        let rules = validate_mappings(raw.mappings.unwrap_or_default())?;
        Ok(Self { settings, rules })
    }
}

fn validate_settings(raw: RawSettings) -> Result<Settings, ConfigError> {
    let mode = match raw.apply_taxonomy.mode {
        None => TaxonomyMode::All,
        Some(mode) => mode
            .parse::<TaxonomyMode>()
            .map_err(|e| ConfigError::InvalidMode(e.0))?,
    };

    if raw.backup.enabled && raw.backup.output_path.is_none() {
        return Err(ConfigError::MissingField("settings.backup.output_path".into()));
    }
    let flush_cache = raw.flush_cache.unwrap_or(raw.wp_path.is_some());
    if (raw.backup.enabled || flush_cache) && raw.wp_path.is_none() {
        return Err(ConfigError::MissingField("settings.wp_path".into()));
    }

    let taxonomy = raw
        .taxonomy
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TAXONOMY.to_string());

    Ok(Settings {
        db_path: raw.db_path,
        wp_path: raw.wp_path,
        taxonomy,
        mode,
        output_csv_path: raw.output_csv_path.unwrap_or_else(|| DEFAULT_CSV_PATH.to_string()),
        limit: raw.limit,
        invalid_regex: raw.invalid_regex,
        term_creation: raw.term_creation,
        flush_cache,
        backup: BackupSettings {
            enabled: raw.backup.enabled,
            output_path: raw.backup.output_path,
        },
    })
}

fn validate_mappings(mappings: serde_yaml::Mapping) -> Result<Vec<MappingRule>, ConfigError> {
    if mappings.is_empty() {
        return Err(ConfigError::NoMappings);
    }

    let mut rules = Vec::with_capacity(mappings.len());
    for (key, value) in mappings {
        let key = match key {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Number(n) => n.to_string(),
            other => {
                return Err(ConfigError::InvalidRule {
                    rule: format!("{:?}", other),
                    reason: "mapping keys must be strings".into(),
                })
            }
        };
        let raw: RawMapping = serde_yaml::from_value(value).map_err(|e| ConfigError::InvalidRule {
            rule: key.clone(),
            reason: e.to_string(),
        })?;

        let pattern = raw
            .pattern
            .ok_or_else(|| ConfigError::MissingField(format!("mappings.{}.match", key)))?;
        if pattern.trim().is_empty() {
            return Err(ConfigError::EmptyPattern { rule: key });
        }

        let term_paths = raw.terms.into_vec();
        for path in &term_paths {
            TermPath::parse(path).map_err(|source| ConfigError::MalformedTermPath {
                rule: key.clone(),
                path: path.clone(),
                source,
            })?;
        }

        rules.push(MappingRule {
            key,
            pattern,
            is_regex: raw.regex,
            term_paths,
        });
    }
    Ok(rules)
}

/// Expand `{date}` (`%Y-%m-%d`) and `{timestamp}` (`%Y%m%d-%H%M%S`)
pub fn expand_path_template(template: &str, now: DateTime<Utc>) -> String {
    template
        .replace("{date}", &now.format("%Y-%m-%d").to_string())
        .replace("{timestamp}", &now.format("%Y%m%d-%H%M%S").to_string())
}
