//! Assignment planning

mod mode;
mod planner;

pub use mode::{InvalidMode, TaxonomyMode};
pub use planner::{AssetPlan, AssignedTerm, AssignmentPlan, AssignmentPlanner, PlannedTerm};
