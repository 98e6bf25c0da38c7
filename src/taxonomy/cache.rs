//! In-memory mirror of the taxonomy for one run
//!
//! The cache is the only source of truth for existence checks while a run
//! plans its work. It only ever grows: stored terms are bulk-loaded at start,
//! planned terms are added as the resolver needs them.

use super::path::TermPath;
use super::term::{TermId, TermNode};
use std::collections::HashMap;
use tracing::debug;

/// Composite lookup key. Names compare case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TermKey {
    name: String,
    parent: Option<TermId>,
}

impl TermKey {
    fn new(name: &str, parent: Option<TermId>) -> Self {
        Self {
            name: name.trim().to_lowercase(),
            parent,
        }
    }
}

#[derive(Debug, Default)]
pub struct TermCache {
    by_key: HashMap<TermKey, TermId>,
    nodes: HashMap<TermId, TermNode>,
    next_planned: u32,
}

impl TermCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache from the store's current terms
    pub fn from_nodes(nodes: impl IntoIterator<Item = TermNode>) -> Self {
        let mut cache = Self::new();
        cache.bulk_load(nodes);
        cache
    }

    /// Load existing terms. When the store holds two rows with the same
    /// (name, parent), the first one loaded wins.
    pub fn bulk_load(&mut self, nodes: impl IntoIterator<Item = TermNode>) {
        for node in nodes {
            let key = TermKey::new(&node.name, node.parent);
            if let Some(existing) = self.by_key.get(&key) {
                debug!(name = %node.name, kept = %existing, ignored = %node.id, "duplicate term in store");
                self.nodes.insert(node.id, node);
                continue;
            }
            self.by_key.insert(key, node.id);
            self.nodes.insert(node.id, node);
        }
    }

    /// Look up a term by name under a parent (`None` for top level)
    pub fn get(&self, name: &str, parent: Option<TermId>) -> Option<&TermNode> {
        self.by_key
            .get(&TermKey::new(name, parent))
            .and_then(|id| self.nodes.get(id))
    }

    /// Look up a term by id
    pub fn node(&self, id: TermId) -> Option<&TermNode> {
        self.nodes.get(&id)
    }

    /// Add a node. A later `get` with the same (name, parent) returns it.
    pub fn put(&mut self, node: TermNode) {
        if let TermId::Planned(seq) = node.id {
            self.next_planned = self.next_planned.max(seq + 1);
        }
        self.by_key.insert(TermKey::new(&node.name, node.parent), node.id);
        self.nodes.insert(node.id, node);
    }

    /// Allocate a provisional id for a term that does not exist yet and add it
    pub fn plan_child(&mut self, name: &str, parent: Option<TermId>) -> TermNode {
        let node = TermNode::new(TermId::Planned(self.next_planned), name, parent);
        self.put(node.clone());
        node
    }

    /// Root-first path of a cached term
    pub fn path_of(&self, id: TermId) -> Option<TermPath> {
        let mut levels = Vec::new();
        let mut current = Some(id);
        while let Some(cursor) = current {
            // A parent cycle in store data would otherwise loop forever
            if levels.len() > self.nodes.len() {
                return None;
            }
            let node = self.nodes.get(&cursor)?;
            levels.push(node.name.clone());
            current = node.parent;
        }
        levels.reverse();
        TermPath::from_levels(levels).ok()
    }

    /// Number of distinct terms (stored and planned)
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of terms planned during this run
    pub fn planned_count(&self) -> usize {
        self.nodes.keys().filter(|id| id.is_planned()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wedding_cache() -> TermCache {
        TermCache::from_nodes([
            TermNode::stored(1, "Wedding", None),
            TermNode::stored(2, "Portraits", Some(1)),
            TermNode::stored(3, "Portraits", None),
        ])
    }

    #[test]
    fn same_leaf_under_different_parents() {
        let cache = wedding_cache();
        assert_eq!(cache.get("Portraits", Some(TermId::Stored(1))).unwrap().id, TermId::Stored(2));
        assert_eq!(cache.get("Portraits", None).unwrap().id, TermId::Stored(3));
        assert!(cache.get("Portraits", Some(TermId::Stored(3))).is_none());
    }

    #[test]
    fn lookup_ignores_case() {
        let cache = wedding_cache();
        assert_eq!(cache.get("wedding", None).unwrap().id, TermId::Stored(1));
        assert_eq!(cache.get("WEDDING ", None).unwrap().id, TermId::Stored(1));
    }

    #[test]
    fn put_is_read_your_writes() {
        let mut cache = wedding_cache();
        let planned = cache.plan_child("Ceremony", Some(TermId::Stored(1)));
        assert_eq!(planned.id, TermId::Planned(0));
        assert_eq!(cache.get("Ceremony", Some(TermId::Stored(1))), Some(&planned));

        let next = cache.plan_child("Vows", Some(planned.id));
        assert_eq!(next.id, TermId::Planned(1));
        assert_eq!(cache.planned_count(), 2);
    }

    #[test]
    fn first_duplicate_wins_on_bulk_load() {
        let cache = TermCache::from_nodes([
            TermNode::stored(10, "Events", None),
            TermNode::stored(11, "events", None),
        ]);
        assert_eq!(cache.get("Events", None).unwrap().id, TermId::Stored(10));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn path_of_walks_to_root() {
        let mut cache = wedding_cache();
        let ceremony = cache.plan_child("Ceremony", Some(TermId::Stored(1)));
        assert_eq!(cache.path_of(ceremony.id).unwrap().to_string(), "Wedding > Ceremony");
        assert_eq!(cache.path_of(TermId::Stored(3)).unwrap().to_string(), "Portraits");
        assert!(cache.path_of(TermId::Stored(99)).is_none());
    }

    #[test]
    fn path_of_survives_parent_cycle() {
        let cache = TermCache::from_nodes([
            TermNode::stored(1, "A", Some(2)),
            TermNode::stored(2, "B", Some(1)),
        ]);
        assert!(cache.path_of(TermId::Stored(1)).is_none());
    }
}
