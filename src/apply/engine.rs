//! Apply engine: turns an assignment plan into store writes
//!
//! Commit mode runs as one transaction:
//!
//! 1. create planned terms, parents first
//! 2. insert missing asset/term relationships
//! 3. recompute usage counts of every touched term
//!
//! then asks the host to drop its term caches. Any failure in 1-3 drops the
//! transaction, which rolls everything back.

use super::hooks::{BackupHook, CacheInvalidator, CreationConfirmer, CreationPolicy};
use super::ApplyError;
use crate::audit::{AuditEvent, AuditLog, SkipReason};
use crate::plan::{AssignedTerm, AssignmentPlan};
use crate::storage::{RelationshipSet, TermStore};
use crate::taxonomy::{AssetId, TermId, TermPath};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    /// New terms or relationships were written
    Applied,
    /// Dry run: new terms or relationships would be written
    WouldApply,
    /// Nothing to do; every relationship already exists
    NoOp,
    /// Nothing to do because every path of the asset failed to resolve
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetOutcome {
    pub asset_id: AssetId,
    pub status: AssetStatus,
    /// Terms first introduced by this asset (created or to be created)
    pub created: Vec<TermPath>,
    /// Relationships written (or to be written)
    pub related: Vec<TermPath>,
    /// Relationships that already existed
    pub skipped: Vec<TermPath>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedTerm {
    /// Stored id after commit, planned id in a dry run
    pub id: TermId,
    pub path: TermPath,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub dry_run: bool,
    pub assets: Vec<AssetOutcome>,
    pub terms_created: Vec<CreatedTerm>,
    pub new_relationships: usize,
    pub counts_updated: usize,
    pub cache_invalidated: bool,
}

impl ApplyReport {
    pub fn asset(&self, id: AssetId) -> Option<&AssetOutcome> {
        self.assets.iter().find(|a| a.asset_id == id)
    }

    /// True if the run wrote (or would write) nothing
    pub fn is_noop(&self) -> bool {
        self.terms_created.is_empty() && self.new_relationships == 0
    }
}

/// Per-asset split of planned assignments against existing relationships
struct AssetWork<'p> {
    asset_id: AssetId,
    new: Vec<&'p AssignedTerm>,
    existing: Vec<&'p AssignedTerm>,
    created: Vec<TermPath>,
    errors: &'p [String],
}

impl<'p> AssetWork<'p> {
    fn split(plan: &'p AssignmentPlan, existing: &RelationshipSet) -> Vec<Self> {
        plan.assets
            .iter()
            .map(|asset| {
                let (existing_terms, new_terms): (Vec<_>, Vec<_>) = asset.terms.iter().partition(|t| {
                    t.id.stored()
                        .is_some_and(|row| existing.contains(&(asset.asset_id, row)))
                });
                AssetWork {
                    asset_id: asset.asset_id,
                    new: new_terms,
                    existing: existing_terms,
                    created: asset
                        .created
                        .iter()
                        .filter_map(|id| plan.new_term(*id).map(|t| t.path.clone()))
                        .collect(),
                    errors: &asset.errors,
                }
            })
            .collect()
    }
}

/// What the transaction actually wrote
struct Committed {
    /// Planned id -> stored row id
    ids: HashMap<TermId, i64>,
    /// Per asset, the assignments the store accepted as new
    related: HashMap<AssetId, Vec<TermPath>>,
    /// Per asset, assignments the store already had despite the snapshot
    already: HashMap<AssetId, Vec<TermPath>>,
    counts_updated: usize,
}

pub struct ApplyEngine {
    store: Arc<dyn TermStore>,
    policy: CreationPolicy,
    backup: Option<Box<dyn BackupHook>>,
    invalidator: Option<Box<dyn CacheInvalidator>>,
    confirmer: Option<Box<dyn CreationConfirmer>>,
}

impl ApplyEngine {
    pub fn new(store: Arc<dyn TermStore>) -> Self {
        Self {
            store,
            policy: CreationPolicy::Auto,
            backup: None,
            invalidator: None,
            confirmer: None,
        }
    }

    pub fn with_creation_policy(mut self, policy: CreationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_backup(mut self, hook: impl BackupHook + 'static) -> Self {
        self.backup = Some(Box::new(hook));
        self
    }

    pub fn with_invalidator(mut self, hook: impl CacheInvalidator + 'static) -> Self {
        self.invalidator = Some(Box::new(hook));
        self
    }

    pub fn with_confirmer(mut self, confirmer: impl CreationConfirmer + 'static) -> Self {
        self.confirmer = Some(Box::new(confirmer));
        self
    }

    pub fn apply(
        &self,
        plan: &AssignmentPlan,
        existing: &RelationshipSet,
        dry_run: bool,
        audit: &mut AuditLog,
    ) -> Result<ApplyReport, ApplyError> {
        let work = AssetWork::split(plan, existing);
        let pending: usize = work.iter().map(|w| w.new.len()).sum();

        if dry_run {
            info!(new_terms = plan.new_terms.len(), new_relationships = pending, "dry run: nothing written");
            return Ok(self.dry_run_report(plan, &work, pending, audit));
        }

        if plan.new_terms.is_empty() && pending == 0 {
            info!(assets = work.len(), "plan already applied; no writes");
            return Ok(self.commit_report(plan, &work, None, false, audit));
        }

        let committed = match self.prepare(plan).and_then(|()| self.commit(plan, &work)) {
            Ok(committed) => committed,
            Err(e) => {
                warn!(error = %e, "apply aborted");
                audit.record(AuditEvent::Error {
                    asset_id: e.asset(),
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        let cache_invalidated = match &self.invalidator {
            Some(invalidator) => match invalidator.invalidate() {
                Ok(()) => true,
                Err(e) => {
                    audit.record(AuditEvent::Error {
                        asset_id: None,
                        message: format!("cache invalidation failed: {}", e),
                    });
                    false
                }
            },
            None => false,
        };

        Ok(self.commit_report(plan, &work, Some(committed), cache_invalidated, audit))
    }

    /// Confirmation and backup. Both run before the transaction opens.
    fn prepare(&self, plan: &AssignmentPlan) -> Result<(), ApplyError> {
        self.check_creation(plan)?;
        if let Some(backup) = &self.backup {
            backup.backup().map_err(ApplyError::Backup)?;
        }
        Ok(())
    }

    fn check_creation(&self, plan: &AssignmentPlan) -> Result<(), ApplyError> {
        if self.policy != CreationPolicy::Confirm || plan.new_terms.is_empty() {
            return Ok(());
        }
        let approved = self
            .confirmer
            .as_ref()
            .is_some_and(|confirmer| confirmer.confirm(&plan.new_terms));
        if approved {
            Ok(())
        } else {
            Err(ApplyError::CreationDeclined {
                count: plan.new_terms.len(),
            })
        }
    }

    /// Steps 1-3 inside one transaction. Returning early drops the
    /// transaction, which rolls it back.
    fn commit(&self, plan: &AssignmentPlan, work: &[AssetWork<'_>]) -> Result<Committed, ApplyError> {
        let mut tx = self.store.begin().map_err(ApplyError::Begin)?;
        let mut ids: HashMap<TermId, i64> = HashMap::new();
        let mut touched: BTreeSet<i64> = BTreeSet::new();

        for term in &plan.new_terms {
            let parent = match term.parent {
                None => None,
                Some(TermId::Stored(row)) => Some(row),
                Some(planned) => Some(*ids.get(&planned).ok_or(ApplyError::UnknownTerm {
                    asset: term.introduced_by,
                    term: planned,
                })?),
            };
            let row = tx
                .create_term(&term.name, parent)
                .map_err(|source| ApplyError::CreateTerm {
                    asset: term.introduced_by,
                    term: term.path.clone(),
                    source,
                })?;
            debug!(term = %term.path, id = row, "created term");
            ids.insert(term.id, row);
            touched.insert(row);
        }

        let mut related: HashMap<AssetId, Vec<TermPath>> = HashMap::new();
        let mut already: HashMap<AssetId, Vec<TermPath>> = HashMap::new();
        for asset in work {
            for assigned in &asset.new {
                let row = match assigned.id {
                    TermId::Stored(row) => row,
                    planned => *ids.get(&planned).ok_or(ApplyError::UnknownTerm {
                        asset: asset.asset_id,
                        term: planned,
                    })?,
                };
                let inserted = tx
                    .relate(asset.asset_id, row)
                    .map_err(|source| ApplyError::Relate {
                        asset: asset.asset_id,
                        term: assigned.path.clone(),
                        source,
                    })?;
                let bucket = if inserted { &mut related } else { &mut already };
                bucket.entry(asset.asset_id).or_default().push(assigned.path.clone());
                touched.insert(row);
            }
        }

        let touched: Vec<i64> = touched.into_iter().collect();
        tx.recount(&touched).map_err(ApplyError::Recount)?;
        tx.commit().map_err(ApplyError::Commit)?;

        info!(
            terms_created = ids.len(),
            relationships = related.values().map(Vec::len).sum::<usize>(),
            counts_updated = touched.len(),
            "apply committed"
        );

        Ok(Committed {
            ids,
            related,
            already,
            counts_updated: touched.len(),
        })
    }

    fn dry_run_report(
        &self,
        plan: &AssignmentPlan,
        work: &[AssetWork<'_>],
        pending: usize,
        audit: &mut AuditLog,
    ) -> ApplyReport {
        let mut assets = Vec::with_capacity(work.len());

        for asset in work {
            let plan_asset = plan.asset(asset.asset_id);
            for id in plan_asset.map(|a| a.created.as_slice()).unwrap_or_default() {
                if let Some(term) = plan.new_term(*id) {
                    audit.record(AuditEvent::TermCreated {
                        asset_id: asset.asset_id,
                        path: term.path.clone(),
                        id: term.id,
                    });
                }
            }
            for assigned in &asset.new {
                audit.record(AuditEvent::TermAssigned {
                    asset_id: asset.asset_id,
                    path: assigned.path.clone(),
                    id: assigned.id,
                });
            }
            record_existing(audit, asset.asset_id, asset.existing.iter().map(|t| &t.path));

            let related: Vec<TermPath> = asset.new.iter().map(|t| t.path.clone()).collect();
            assets.push(AssetOutcome {
                asset_id: asset.asset_id,
                status: status(true, &asset.created, &related, asset.errors),
                created: asset.created.clone(),
                related,
                skipped: asset.existing.iter().map(|t| t.path.clone()).collect(),
                errors: asset.errors.to_vec(),
            });
        }

        ApplyReport {
            dry_run: true,
            assets,
            terms_created: plan
                .new_terms
                .iter()
                .map(|t| CreatedTerm {
                    id: t.id,
                    path: t.path.clone(),
                })
                .collect(),
            new_relationships: pending,
            counts_updated: 0,
            cache_invalidated: false,
        }
    }

    fn commit_report(
        &self,
        plan: &AssignmentPlan,
        work: &[AssetWork<'_>],
        committed: Option<Committed>,
        cache_invalidated: bool,
        audit: &mut AuditLog,
    ) -> ApplyReport {
        let mut committed = committed.unwrap_or_else(|| Committed {
            ids: HashMap::new(),
            related: HashMap::new(),
            already: HashMap::new(),
            counts_updated: 0,
        });
        let mut assets = Vec::with_capacity(work.len());
        let mut new_relationships = 0;

        for asset in work {
            let plan_asset = plan.asset(asset.asset_id);
            for id in plan_asset.map(|a| a.created.as_slice()).unwrap_or_default() {
                if let (Some(term), Some(row)) = (plan.new_term(*id), committed.ids.get(id)) {
                    audit.record(AuditEvent::TermCreated {
                        asset_id: asset.asset_id,
                        path: term.path.clone(),
                        id: TermId::Stored(*row),
                    });
                }
            }

            let related = committed.related.remove(&asset.asset_id).unwrap_or_default();
            for path in &related {
                let id = asset
                    .new
                    .iter()
                    .find(|t| &t.path == path)
                    .map(|t| t.id)
                    .map(|id| committed.ids.get(&id).map_or(id, |row| TermId::Stored(*row)));
                if let Some(id) = id {
                    audit.record(AuditEvent::TermAssigned {
                        asset_id: asset.asset_id,
                        path: path.clone(),
                        id,
                    });
                }
            }

            let mut skipped: Vec<TermPath> = asset.existing.iter().map(|t| t.path.clone()).collect();
            skipped.extend(committed.already.remove(&asset.asset_id).unwrap_or_default());
            record_existing(audit, asset.asset_id, skipped.iter());

            let created = if committed.ids.is_empty() {
                Vec::new()
            } else {
                asset.created.clone()
            };
            new_relationships += related.len();
            assets.push(AssetOutcome {
                asset_id: asset.asset_id,
                status: status(false, &created, &related, asset.errors),
                created,
                related,
                skipped,
                errors: asset.errors.to_vec(),
            });
        }

        let terms_created = plan
            .new_terms
            .iter()
            .filter_map(|t| {
                committed.ids.get(&t.id).map(|row| CreatedTerm {
                    id: TermId::Stored(*row),
                    path: t.path.clone(),
                })
            })
            .collect();

        ApplyReport {
            dry_run: false,
            assets,
            terms_created,
            new_relationships,
            counts_updated: committed.counts_updated,
            cache_invalidated,
        }
    }
}

fn record_existing<'a>(audit: &mut AuditLog, asset_id: AssetId, paths: impl Iterator<Item = &'a TermPath>) {
    for path in paths {
        audit.record(AuditEvent::AssignmentSkippedDuplicate {
            asset_id,
            path: path.clone(),
            reason: SkipReason::AlreadyRelated,
        });
    }
}

fn status(dry_run: bool, created: &[TermPath], related: &[TermPath], errors: &[String]) -> AssetStatus {
    if !created.is_empty() || !related.is_empty() {
        if dry_run {
            AssetStatus::WouldApply
        } else {
            AssetStatus::Applied
        }
    } else if !errors.is_empty() {
        AssetStatus::Failed
    } else {
        AssetStatus::NoOp
    }
}
