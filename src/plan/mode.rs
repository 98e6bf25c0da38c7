//! Taxonomy modes: which levels of a matched hierarchy get attached

use crate::taxonomy::TermId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid taxonomy mode '{0}' (expected all, children_only or bottom_only)")]
pub struct InvalidMode(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxonomyMode {
    /// Every level of the path
    #[default]
    All,
    /// Every level that has a child in the path (all but the leaf)
    ChildrenOnly,
    /// The leaf only
    BottomOnly,
}

impl TaxonomyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::ChildrenOnly => "children_only",
            Self::BottomOnly => "bottom_only",
        }
    }

    /// Select from one resolved path (root first) the ids to assign.
    ///
    /// A single-level path has no hierarchy to filter, so every mode keeps it.
    pub fn select(&self, ids: &[TermId]) -> Vec<TermId> {
        if ids.len() < 2 {
            return ids.to_vec();
        }
        match self {
            Self::All => ids.to_vec(),
            Self::ChildrenOnly => ids[..ids.len() - 1].to_vec(),
            Self::BottomOnly => ids[ids.len() - 1..].to_vec(),
        }
    }
}

impl std::fmt::Display for TaxonomyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaxonomyMode {
    type Err = InvalidMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "all" => Ok(Self::All),
            "children_only" => Ok(Self::ChildrenOnly),
            "bottom_only" => Ok(Self::BottomOnly),
            other => Err(InvalidMode(other.to_string())),
        }
    }
}
