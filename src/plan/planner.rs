//! Assignment planning: matched rules -> deduplicated term ids per asset

use super::mode::TaxonomyMode;
use crate::audit::{AuditEvent, AuditLog, SkipReason};
use crate::matching::MatchResult;
use crate::taxonomy::{ensure, AssetId, TermCache, TermId, TermPath};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// A term the asset should be related to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedTerm {
    pub id: TermId,
    pub path: TermPath,
}

/// A term node that does not exist yet and will be created on apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedTerm {
    pub id: TermId,
    pub name: String,
    pub parent: Option<TermId>,
    pub path: TermPath,
    /// First asset whose paths needed this term
    pub introduced_by: AssetId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPlan {
    pub asset_id: AssetId,
    /// Rule keys that matched, in configured order
    pub matched_rules: Vec<String>,
    /// Final term set, without duplicates
    pub terms: Vec<AssignedTerm>,
    /// Planned terms first introduced by this asset, parents first
    pub created: Vec<TermId>,
    /// Paths that could not be resolved
    pub errors: Vec<String>,
}

impl AssetPlan {
    fn new(asset_id: AssetId) -> Self {
        Self {
            asset_id,
            matched_rules: Vec::new(),
            terms: Vec::new(),
            created: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Assigned terms that still need their node created
    pub fn pending_terms(&self) -> impl Iterator<Item = &AssignedTerm> {
        self.terms.iter().filter(|t| t.id.is_planned())
    }

    pub fn term_ids(&self) -> Vec<TermId> {
        self.terms.iter().map(|t| t.id).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentPlan {
    pub mode: TaxonomyMode,
    /// One entry per matched asset, in match order
    pub assets: Vec<AssetPlan>,
    /// Terms to create, parents before children
    pub new_terms: Vec<PlannedTerm>,
}

impl AssignmentPlan {
    pub fn asset(&self, id: AssetId) -> Option<&AssetPlan> {
        self.assets.iter().find(|a| a.asset_id == id)
    }

    pub fn new_term(&self, id: TermId) -> Option<&PlannedTerm> {
        self.new_terms.iter().find(|t| t.id == id)
    }

    /// Total number of (asset, term) assignments in the plan
    pub fn assignment_count(&self) -> usize {
        self.assets.iter().map(|a| a.terms.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.new_terms.is_empty() && self.assets.iter().all(|a| a.terms.is_empty())
    }
}

/// Builds an `AssignmentPlan` against a run's term cache.
///
/// The planner holds the only mutable borrow of the cache while it runs, so
/// term planning is serialized by construction.
pub struct AssignmentPlanner<'c> {
    cache: &'c mut TermCache,
    mode: TaxonomyMode,
}

impl<'c> AssignmentPlanner<'c> {
    pub fn new(cache: &'c mut TermCache, mode: TaxonomyMode) -> Self {
        Self { cache, mode }
    }

    pub fn plan(&mut self, matches: &[MatchResult], audit: &mut AuditLog) -> AssignmentPlan {
        let mut assets: Vec<AssetPlan> = Vec::new();
        let mut paths_by_asset: Vec<Vec<String>> = Vec::new();
        let mut index: HashMap<AssetId, usize> = HashMap::new();

        for m in matches {
            let slot = *index.entry(m.asset_id).or_insert_with(|| {
                assets.push(AssetPlan::new(m.asset_id));
                paths_by_asset.push(Vec::new());
                assets.len() - 1
            });
            if !assets[slot].matched_rules.contains(&m.rule_key) {
                assets[slot].matched_rules.push(m.rule_key.clone());
            }
            for raw in &m.term_paths {
                if !paths_by_asset[slot].contains(raw) {
                    paths_by_asset[slot].push(raw.clone());
                }
            }
        }

        let mut new_terms = Vec::new();
        for (asset, raw_paths) in assets.iter_mut().zip(&paths_by_asset) {
            self.plan_asset(asset, raw_paths, &mut new_terms, audit);
        }

        info!(
            mode = %self.mode,
            assets = assets.len(),
            new_terms = new_terms.len(),
            "assignment plan built"
        );

        AssignmentPlan {
            mode: self.mode,
            assets,
            new_terms,
        }
    }

    fn plan_asset(
        &mut self,
        asset: &mut AssetPlan,
        raw_paths: &[String],
        new_terms: &mut Vec<PlannedTerm>,
        audit: &mut AuditLog,
    ) {
        let mut seen: HashSet<TermId> = HashSet::new();

        for raw in raw_paths {
            let path = match TermPath::parse(raw) {
                Ok(path) => path,
                Err(e) => {
                    warn!(asset = %asset.asset_id, error = %e, "skipping unresolvable term path");
                    audit.record(AuditEvent::Error {
                        asset_id: Some(asset.asset_id),
                        message: e.to_string(),
                    });
                    asset.errors.push(e.to_string());
                    continue;
                }
            };

            let resolved = ensure(&path, self.cache);
            audit.record(AuditEvent::TermResolved {
                asset_id: asset.asset_id,
                path: path.clone(),
                existing: resolved.existing,
                missing: resolved.created.len(),
            });

            for (offset, id) in resolved.created.iter().enumerate() {
                let depth = resolved.existing + offset + 1;
                let level_path = self.cache.path_of(*id).unwrap_or_else(|| path.prefix(depth));
                new_terms.push(PlannedTerm {
                    id: *id,
                    name: level_path.leaf().to_string(),
                    parent: depth.checked_sub(2).map(|i| resolved.ids[i]),
                    path: level_path,
                    introduced_by: asset.asset_id,
                });
                asset.created.push(*id);
            }

            for id in self.mode.select(&resolved.ids) {
                // Stored names win over the rule's spelling
                let term_path = self.cache.path_of(id).unwrap_or_else(|| {
                    let depth = resolved.ids.iter().position(|x| *x == id).map_or(path.depth(), |i| i + 1);
                    path.prefix(depth)
                });
                if seen.insert(id) {
                    asset.terms.push(AssignedTerm { id, path: term_path });
                } else {
                    debug!(asset = %asset.asset_id, term = %term_path, "duplicate assignment collapsed");
                    audit.record(AuditEvent::AssignmentSkippedDuplicate {
                        asset_id: asset.asset_id,
                        path: term_path,
                        reason: SkipReason::DuplicateInPlan,
                    });
                }
            }
        }
    }
}
