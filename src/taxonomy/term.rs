//! Term and asset records

use serde::{Deserialize, Serialize};

/// Identifier of a content-library asset (attachment post ID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub i64);

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AssetId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Identifier of a taxonomy term
///
/// Terms that already exist in the store carry their row id. Terms planned
/// during a run get a provisional id until the apply transaction persists them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermId {
    /// Row id of a persisted term
    Stored(i64),
    /// Provisional id allocated by the term cache, in planning order
    Planned(u32),
}

impl TermId {
    /// True if the term still has to be created
    pub fn is_planned(&self) -> bool {
        matches!(self, Self::Planned(_))
    }

    /// The persisted row id, if any
    pub fn stored(&self) -> Option<i64> {
        match self {
            Self::Stored(id) => Some(*id),
            Self::Planned(_) => None,
        }
    }
}

impl std::fmt::Display for TermId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stored(id) => write!(f, "{}", id),
            Self::Planned(seq) => write!(f, "new#{}", seq),
        }
    }
}

/// A single node of the taxonomy tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermNode {
    pub id: TermId,
    pub name: String,
    /// `None` for top-level terms
    pub parent: Option<TermId>,
}

impl TermNode {
    pub fn new(id: TermId, name: impl Into<String>, parent: Option<TermId>) -> Self {
        Self {
            id,
            name: name.into(),
            parent,
        }
    }

    /// A term already present in the store
    pub fn stored(id: i64, name: impl Into<String>, parent: Option<i64>) -> Self {
        Self::new(TermId::Stored(id), name, parent.map(TermId::Stored))
    }
}

/// Snapshot of one content-library entry for the duration of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: AssetId,
    pub filename: String,
    pub title: String,
}

impl AssetRecord {
    pub fn new(id: impl Into<AssetId>, filename: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            title: title.into(),
        }
    }

    /// Build a record from a stored attachment GUID/URL, keeping only its basename
    pub fn from_guid(id: impl Into<AssetId>, guid: &str, title: impl Into<String>) -> Self {
        Self::new(id, filename_from_guid(guid), title)
    }
}

/// Last path component of an attachment URL or path
pub fn filename_from_guid(guid: &str) -> &str {
    let trimmed = guid.trim_end_matches('/');
    trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed)
}
