//! Storage trait definitions

use crate::taxonomy::{AssetId, AssetRecord, TermNode};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store lock poisoned")]
    Lock,

    #[error("Term not found: {0}")]
    TermNotFound(i64),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Existing (asset, term row id) relationships
pub type RelationshipSet = HashSet<(AssetId, i64)>;

/// Read side of the term store plus a way into a write transaction.
///
/// Implementations must be thread-safe (Send + Sync).
pub trait TermStore: Send + Sync {
    /// Every term of the configured taxonomy, ordered by id
    fn load_terms(&self) -> StorageResult<Vec<TermNode>>;

    /// Assets to categorize, ordered by id, optionally only the first `limit`
    fn load_assets(&self, limit: Option<usize>) -> StorageResult<Vec<AssetRecord>>;

    /// Relationships between assets and terms of the configured taxonomy
    fn load_relationships(&self) -> StorageResult<RelationshipSet>;

    /// Open a write transaction. Dropping it without `commit` rolls back.
    fn begin(&self) -> StorageResult<Box<dyn TermTransaction + '_>>;
}

/// An open all-or-nothing write transaction
pub trait TermTransaction {
    /// Insert a term and return its new row id
    fn create_term(&mut self, name: &str, parent: Option<i64>) -> StorageResult<i64>;

    /// Relate an asset to a term. Returns false if the pair already existed.
    fn relate(&mut self, asset: AssetId, term: i64) -> StorageResult<bool>;

    /// Recompute and persist the usage count of each term
    fn recount(&mut self, terms: &[i64]) -> StorageResult<()>;

    fn commit(self: Box<Self>) -> StorageResult<()>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: TermStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
