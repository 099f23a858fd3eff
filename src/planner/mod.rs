//! Planning.
//!
//! This module computes the proposed next state of each resource instance,
//! diffs it against prior state, orders the resulting plans into a change
//! set and executes that change set.

mod diff;
mod engine;
mod executor;
mod modifier;
mod plan;
mod reference;

pub use diff::{compute_changes, AttributeChange};
pub use engine::plan_resource;
pub use executor::{ActionResult, ExecutionResult, PlanExecutor, Replanner};
pub use modifier::{
    default_value, requires_replace, requires_replace_if, use_state_for_unknown, DefaultValue, ModifierRequest,
    ModifierResponse, PlanModifier, ReplacePredicate, RequiresReplaceIf, UseStateForUnknown,
};
pub use plan::{Action, ChangeAction, ChangeKind, ChangeSet, PlannedResource, ResourcePlan};
pub use reference::{references, resolve_references, Reference, REF_MARKER};
