//! Term path resolution against the term cache

use super::cache::TermCache;
use super::path::TermPath;
use super::term::TermId;
use tracing::debug;

/// Read-only view of how far a path already exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Ids of the levels found in the cache, root first
    pub existing_ids: Vec<TermId>,
    /// Names of the levels that must be created, starting at the first miss
    pub missing_levels: Vec<String>,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.missing_levels.is_empty()
    }
}

/// A path whose every level now has an id (stored or planned)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub path: TermPath,
    /// One id per level, root first
    pub ids: Vec<TermId>,
    /// Ids this call planned, in creation order (parents first)
    pub created: Vec<TermId>,
    /// Number of levels that were already present before this call
    pub existing: usize,
}

impl ResolvedPath {
    pub fn leaf(&self) -> Option<TermId> {
        self.ids.last().copied()
    }
}

/// Walk `path` top-down without touching the cache.
///
/// Once a level misses, every level below it is missing too: a child cannot
/// exist under a parent that does not.
pub fn resolve(path: &TermPath, cache: &TermCache) -> Resolution {
    let mut existing_ids = Vec::with_capacity(path.depth());
    let mut parent = None;

    for (index, name) in path.levels().iter().enumerate() {
        match cache.get(name, parent) {
            Some(node) => {
                existing_ids.push(node.id);
                parent = Some(node.id);
            }
            None => {
                return Resolution {
                    existing_ids,
                    missing_levels: path.levels()[index..].to_vec(),
                };
            }
        }
    }

    Resolution {
        existing_ids,
        missing_levels: Vec::new(),
    }
}

/// Resolve `path` and plan every missing level in the cache.
///
/// Planned levels are visible to the next level of this path and to every
/// later call in the run, so the same (name, parent) is never planned twice.
pub fn ensure(path: &TermPath, cache: &mut TermCache) -> ResolvedPath {
    let resolution = resolve(path, cache);
    let existing = resolution.existing_ids.len();
    let mut ids = resolution.existing_ids;
    let mut created = Vec::with_capacity(resolution.missing_levels.len());
    let mut parent = ids.last().copied();

    for name in &resolution.missing_levels {
        let node = cache.plan_child(name, parent);
        debug!(term = %name, id = %node.id, parent = ?parent, "planned term");
        ids.push(node.id);
        created.push(node.id);
        parent = Some(node.id);
    }

    ResolvedPath {
        path: path.clone(),
        ids,
        created,
        existing,
    }
}
