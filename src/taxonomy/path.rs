//! Hierarchical term paths ("Wedding > Portraits", "Wedding/Portraits")

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separators accepted between levels of a term path
pub const SEPARATORS: [char; 2] = ['>', '/'];

/// Errors produced while parsing a term path
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TermPathError {
    #[error("Invalid term path '{path}': level {level} is empty")]
    InvalidTermPath { path: String, level: usize },
}

/// An ordered list of term names, root first
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermPath(Vec<String>);

impl TermPath {
    /// Parse a human-authored path. Every level must be non-empty after trimming.
    pub fn parse(raw: &str) -> Result<Self, TermPathError> {
        let mut levels = Vec::new();
        for (index, segment) in raw.split(SEPARATORS).enumerate() {
            let name = segment.trim();
            if name.is_empty() {
                return Err(TermPathError::InvalidTermPath {
                    path: raw.to_string(),
                    level: index + 1,
                });
            }
            levels.push(name.to_string());
        }
        Ok(Self(levels))
    }

    /// Build a path from already-split levels
    pub fn from_levels<I, S>(levels: I) -> Result<Self, TermPathError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let levels: Vec<String> = levels.into_iter().map(|s| s.into().trim().to_string()).collect();
        if levels.is_empty() {
            return Err(TermPathError::InvalidTermPath {
                path: String::new(),
                level: 1,
            });
        }
        if let Some(index) = levels.iter().position(|l| l.is_empty()) {
            return Err(TermPathError::InvalidTermPath {
                path: levels.join(" > "),
                level: index + 1,
            });
        }
        Ok(Self(levels))
    }

    pub fn levels(&self) -> &[String] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// The deepest level name
    pub fn leaf(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or_default()
    }

    /// The path made of the first `depth` levels
    pub fn prefix(&self, depth: usize) -> TermPath {
        TermPath(self.0[..depth.min(self.0.len())].to_vec())
    }
}

impl std::fmt::Display for TermPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join(" > "))
    }
}

impl std::str::FromStr for TermPath {
    type Err = TermPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arrow_and_slash_separators() {
        let arrow = TermPath::parse("Wedding > Portraits").unwrap();
        let slash = TermPath::parse("Wedding/Portraits").unwrap();
        assert_eq!(arrow, slash);
        assert_eq!(arrow.levels(), ["Wedding", "Portraits"]);
        assert_eq!(arrow.to_string(), "Wedding > Portraits");
    }

    #[test]
    fn single_level_path() {
        let path = TermPath::parse("  Events ").unwrap();
        assert_eq!(path.depth(), 1);
        assert_eq!(path.leaf(), "Events");
    }

    #[test]
    fn stray_separator_is_rejected() {
        let err = TermPath::parse("Wedding >> Portraits").unwrap_err();
        assert_eq!(
            err,
            TermPathError::InvalidTermPath {
                path: "Wedding >> Portraits".to_string(),
                level: 2
            }
        );
        assert!(TermPath::parse("Wedding >").is_err());
        assert!(TermPath::parse("").is_err());
        assert!(TermPath::parse("   ").is_err());
    }

    #[test]
    fn prefix_returns_ancestor_paths() {
        let path = TermPath::parse("A > B > C").unwrap();
        assert_eq!(path.prefix(1).to_string(), "A");
        assert_eq!(path.prefix(2).to_string(), "A > B");
        assert_eq!(path.prefix(9), path);
    }

    #[test]
    fn from_levels_rejects_blank_level() {
        assert!(TermPath::from_levels(["Wedding", " "]).is_err());
        assert!(TermPath::from_levels(Vec::<String>::new()).is_err());
        assert_eq!(TermPath::from_levels(["A", "B"]).unwrap().depth(), 2);
    }
}
