//! Applying assignment plans to the term store

mod engine;
pub mod hooks;

pub use engine::{ApplyEngine, ApplyReport, AssetOutcome, AssetStatus, CreatedTerm};
pub use hooks::{
    BackupHook, CacheInvalidator, CreationConfirmer, CreationPolicy, HookError, WpCli, WpCliBackup,
    WpCliCacheFlush,
};

use crate::storage::StorageError;
use crate::taxonomy::{AssetId, TermId, TermPath};
use thiserror::Error;

/// Errors that abort an apply. None of them leave partial writes behind.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("Backup failed, nothing was changed: {0}")]
    Backup(#[source] HookError),

    #[error("Creation of {count} new term(s) was not confirmed")]
    CreationDeclined { count: usize },

    #[error("Could not open transaction: {0}")]
    Begin(#[source] StorageError),

    #[error("Failed to create term '{term}' for asset {asset}: {source}")]
    CreateTerm {
        asset: AssetId,
        term: TermPath,
        #[source]
        source: StorageError,
    },

    #[error("Failed to relate asset {asset} to term '{term}': {source}")]
    Relate {
        asset: AssetId,
        term: TermPath,
        #[source]
        source: StorageError,
    },

    #[error("Plan for asset {asset} references unknown term {term}")]
    UnknownTerm { asset: AssetId, term: TermId },

    #[error("Failed to update term counts: {0}")]
    Recount(#[source] StorageError),

    #[error("Commit failed: {0}")]
    Commit(#[source] StorageError),
}

impl ApplyError {
    /// The asset whose assignment caused the failure, when known
    pub fn asset(&self) -> Option<AssetId> {
        match self {
            Self::CreateTerm { asset, .. } | Self::Relate { asset, .. } | Self::UnknownTerm { asset, .. } => {
                Some(*asset)
            }
            _ => None,
        }
    }
}
