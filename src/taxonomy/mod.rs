//! Taxonomy model: terms, term paths, the per-run term cache and path resolution

mod cache;
mod path;
pub mod resolver;
mod term;

pub use cache::TermCache;
pub use path::{TermPath, TermPathError, SEPARATORS};
pub use resolver::{ensure, resolve, Resolution, ResolvedPath};
pub use term::{filename_from_guid, AssetId, AssetRecord, TermId, TermNode};
