//! Storage backends
//!
//! The engine talks to the term store through the `TermStore` trait: bulk reads
//! at run start, one `TermTransaction` for the apply phase. The primary
//! implementation is `SqliteStore`.

mod sqlite;
mod traits;

pub use sqlite::{slugify, SqliteStore, DEFAULT_TAXONOMY};
pub use traits::{OpenStore, RelationshipSet, StorageError, StorageResult, TermStore, TermTransaction};
