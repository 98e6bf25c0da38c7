//! Mapping rules and their compiled form

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A configured association between a filename pattern and term paths.
///
/// The key is a label for reporting only; it plays no part in matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRule {
    pub key: String,
    pub pattern: String,
    pub is_regex: bool,
    /// Raw term paths, in configured order
    pub term_paths: Vec<String>,
}

impl MappingRule {
    /// A case-insensitive substring rule
    pub fn keyword(key: impl Into<String>, pattern: impl Into<String>, term_paths: &[&str]) -> Self {
        Self {
            key: key.into(),
            pattern: pattern.into(),
            is_regex: false,
            term_paths: term_paths.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// A regular-expression rule
    pub fn regex(key: impl Into<String>, pattern: impl Into<String>, term_paths: &[&str]) -> Self {
        Self {
            is_regex: true,
            ..Self::keyword(key, pattern, term_paths)
        }
    }
}

/// Errors raised while compiling rules
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Invalid regex pattern '{pattern}' in mapping '{key}': {source}")]
    InvalidPattern {
        key: String,
        pattern: String,
        #[source]
        source: Box<regex::Error>,
    },
}

/// What to do with a rule whose regex does not compile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidPatternPolicy {
    /// Abort on the first invalid pattern
    #[default]
    Fail,
    /// Drop the rule for the rest of the run and report it
    Skip,
}

#[derive(Debug, Clone)]
pub(crate) enum Pattern {
    /// Lowercased needle
    Substring(String),
    Regex(Regex),
}

impl Pattern {
    pub(crate) fn compile(rule: &MappingRule) -> Result<Self, MatchError> {
        if !rule.is_regex {
            return Ok(Self::Substring(rule.pattern.to_lowercase()));
        }
        Regex::new(&rule.pattern)
            .map(Self::Regex)
            .map_err(|e| MatchError::InvalidPattern {
                key: rule.key.clone(),
                pattern: rule.pattern.clone(),
                source: Box::new(e),
            })
    }

    /// `lowered` is the filename already lowercased, shared across substring rules
    pub(crate) fn is_match(&self, filename: &str, lowered: &str) -> bool {
        match self {
            Self::Substring(needle) => lowered.contains(needle.as_str()),
            Self::Regex(re) => re.is_match(filename),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substring_is_case_insensitive() {
        let pattern = Pattern::compile(&MappingRule::keyword("f", "FORMALS", &[])).unwrap();
        let name = "smith_formals_001.jpg";
        assert!(pattern.is_match(name, &name.to_lowercase()));
    }

    #[test]
    fn regex_is_case_sensitive_unless_flagged() {
        let plain = Pattern::compile(&MappingRule::regex("r", r"ring_\d+", &[])).unwrap();
        let flagged = Pattern::compile(&MappingRule::regex("r", r"(?i)ring_\d+", &[])).unwrap();
        let name = "RING_12.jpg";
        let lowered = name.to_lowercase();
        assert!(!plain.is_match(name, &lowered));
        assert!(flagged.is_match(name, &lowered));
    }

    #[test]
    fn invalid_regex_names_the_rule() {
        let err = Pattern::compile(&MappingRule::regex("Broken", "([a-z", &[])).unwrap_err();
        let MatchError::InvalidPattern { key, pattern, .. } = err;
        assert_eq!(key, "Broken");
        assert_eq!(pattern, "([a-z");
    }
}
