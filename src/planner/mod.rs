//! Planning module for catalog reconciliation.
//!
//! This module tags desired objects with ownership metadata, compares them
//! with the observed catalog, sweeps orphans, orders the resulting
//! operations and executes plans.

mod tagger;
mod diff;
mod sweep;
mod plan;
mod executor;

pub use tagger::{
    MetadataTagger, OWNER_TAG_KEY, RETENTION_POLICY_KEY, RuntimeDefaults, owner_tag_of,
    retention_of,
};
pub use diff::{Classification, DiffEngine, DiffResult, ObjectDiff};
pub use sweep::{Deletion, OrphanSweep};
pub use plan::{DependencyRules, Operation, OperationKind, Phase, Plan, Planner};
pub use executor::{Batch, Outcome, PlanExecutor, Step};
