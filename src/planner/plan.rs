//! Resource plans and change sets.
//!
//! A [`ResourcePlan`] is the planning result for one instance. A
//! [`ChangeSet`] orders the plans of many instances into executable
//! [`ChangeAction`]s whose dependency indices always point backwards, so a
//! sequential walk honours every edge.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::diag::Diagnostics;
use crate::value::{Path, Value};

use super::diff::AttributeChange;

/// Action chosen for a resource instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    /// Nothing to do.
    NoOp,
    /// Create a new remote resource.
    Create,
    /// Update the remote resource in place.
    Update,
    /// Destroy then create.
    Replace,
    /// Destroy the remote resource.
    Destroy,
}

/// Planning result for one resource instance.
#[derive(Debug, Clone)]
pub struct ResourcePlan {
    /// Chosen action.
    pub action: Action,
    /// Prior state, if the resource exists.
    pub prior: Option<Value>,
    /// Configuration, if the resource is still configured.
    pub config: Option<Value>,
    /// Proposed next state, absent for destroy.
    pub proposed: Option<Value>,
    /// Changed attributes that force replacement.
    pub requires_replace: Vec<Path>,
    /// Changed attributes.
    pub changes: Vec<AttributeChange>,
    /// Warnings collected during planning.
    pub diagnostics: Diagnostics,
}

impl ResourcePlan {
    pub(crate) const fn without_config(action: Action, prior: Option<Value>) -> Self {
        Self {
            action,
            prior,
            config: None,
            proposed: None,
            requires_replace: Vec::new(),
            changes: Vec::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Returns true if applying the plan would do nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.action == Action::NoOp
    }
}

/// One instance's plan, tagged with its address and parent edges.
#[derive(Debug, Clone)]
pub struct PlannedResource {
    /// Instance address, e.g. `pingone_population.staff`.
    pub address: String,
    /// Resource type name.
    pub resource_type: String,
    /// Planning result.
    pub plan: ResourcePlan,
    /// Addresses of the instances this one depends on.
    pub depends_on: Vec<String>,
}

/// Kind of a single remote operation in a change set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Create.
    Create,
    /// Update in place.
    Update,
    /// Delete.
    Delete,
}

/// A single executable action.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeAction {
    /// Operation.
    pub kind: ChangeKind,
    /// Instance address.
    pub address: String,
    /// Resource type name.
    pub resource_type: String,
    /// Why the action is needed.
    pub reason: String,
    /// Indices of actions that must succeed first.
    pub dependencies: Vec<usize>,
}

/// Ordered actions for a whole configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeSet {
    /// When the change set was built.
    pub created_at: DateTime<Utc>,
    /// Actions in execution order.
    pub actions: Vec<ChangeAction>,
}

impl ChangeSet {
    /// Orders the given plans into a change set.
    ///
    /// Deletes run children first and creates run parents first. A replace
    /// becomes a delete followed by a create that depends on it, and a
    /// parent's delete waits for the deletes of its children.
    #[must_use]
    pub fn from_plans(resources: &[PlannedResource]) -> Self {
        let by_address: HashMap<&str, &PlannedResource> =
            resources.iter().map(|r| (r.address.as_str(), r)).collect();
        let mut depth_cache = HashMap::new();
        let mut depths: BTreeMap<&str, usize> = BTreeMap::new();
        for r in resources {
            depths.insert(&r.address, depth(&r.address, &by_address, &mut depth_cache, 0));
        }

        let mut actions: Vec<ChangeAction> = Vec::new();
        let mut delete_index: HashMap<&str, usize> = HashMap::new();
        let mut write_index: HashMap<&str, usize> = HashMap::new();

        // Deletes, deepest first.
        let mut deleting: Vec<&PlannedResource> = resources
            .iter()
            .filter(|r| matches!(r.plan.action, Action::Destroy | Action::Replace))
            .collect();
        deleting.sort_by_key(|r| std::cmp::Reverse(depths[r.address.as_str()]));
        for r in deleting {
            let dependencies = resources
                .iter()
                .filter(|child| child.depends_on.contains(&r.address))
                .filter_map(|child| delete_index.get(child.address.as_str()).copied())
                .collect();
            let reason = if r.plan.action == Action::Replace {
                replace_reason(&r.plan)
            } else {
                String::from("Resource removed from configuration")
            };
            delete_index.insert(&r.address, actions.len());
            actions.push(ChangeAction {
                kind: ChangeKind::Delete,
                address: r.address.clone(),
                resource_type: r.resource_type.clone(),
                reason,
                dependencies,
            });
        }

        // Creates and updates, shallowest first.
        let mut writing: Vec<&PlannedResource> = resources
            .iter()
            .filter(|r| matches!(r.plan.action, Action::Create | Action::Update | Action::Replace))
            .collect();
        writing.sort_by_key(|r| depths[r.address.as_str()]);
        for r in writing {
            let mut dependencies: Vec<usize> = r
                .depends_on
                .iter()
                .filter_map(|parent| write_index.get(parent.as_str()).copied())
                .collect();
            if let Some(own_delete) = delete_index.get(r.address.as_str()) {
                dependencies.push(*own_delete);
            }
            let (kind, reason) = match r.plan.action {
                Action::Update => (
                    ChangeKind::Update,
                    format!("{} attribute(s) changed", r.plan.changes.len()),
                ),
                Action::Replace => (ChangeKind::Create, replace_reason(&r.plan)),
                _ => (ChangeKind::Create, String::from("Resource defined in configuration")),
            };
            write_index.insert(&r.address, actions.len());
            actions.push(ChangeAction {
                kind,
                address: r.address.clone(),
                resource_type: r.resource_type.clone(),
                reason,
                dependencies,
            });
        }

        Self {
            created_at: Utc::now(),
            actions,
        }
    }

    /// Returns true if the change set has no actions.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns the number of actions of `kind`.
    #[must_use]
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.actions.iter().filter(|a| a.kind == kind).count()
    }

    /// Returns the actions that depend on the action at `index`.
    #[must_use]
    pub fn dependent_actions(&self, index: usize) -> Vec<(usize, &ChangeAction)> {
        self.actions
            .iter()
            .enumerate()
            .filter(|(_, a)| a.dependencies.contains(&index))
            .collect()
    }
}

fn replace_reason(plan: &ResourcePlan) -> String {
    let forced: Vec<String> = plan.requires_replace.iter().map(ToString::to_string).collect();
    format!("Replacing because {} forces a new resource", forced.join(", "))
}

fn depth<'a>(
    address: &'a str,
    by_address: &HashMap<&'a str, &'a PlannedResource>,
    cache: &mut HashMap<&'a str, usize>,
    guard: usize,
) -> usize {
    if let Some(d) = cache.get(address) {
        return *d;
    }
    // Cycles are the orchestrator's problem; cap the walk.
    if guard > by_address.len() {
        return 0;
    }
    let d = by_address.get(address).copied().map_or(0, |r: &'a PlannedResource| {
        r.depends_on
            .iter()
            .filter(|p| by_address.contains_key(p.as_str()))
            .map(|p| depth(p, by_address, cache, guard + 1) + 1)
            .max()
            .unwrap_or(0)
    });
    cache.insert(address, d);
    d
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoOp => "no-op",
            Self::Create => "create",
            Self::Update => "update-in-place",
            Self::Replace => "replace",
            Self::Destroy => "destroy",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.address)?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.actions.is_empty() {
            return write!(f, "No changes required");
        }
        writeln!(f, "Change set ({} actions):", self.actions.len())?;
        for (i, action) in self.actions.iter().enumerate() {
            writeln!(f, "  {i}. {action}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planned(address: &str, action: Action, depends_on: &[&str]) -> PlannedResource {
        let mut plan = ResourcePlan::without_config(action, None);
        if action == Action::Replace {
            plan.requires_replace = vec![Path::root().attr("region")];
        }
        PlannedResource {
            address: address.to_string(),
            resource_type: String::from("test"),
            plan,
            depends_on: depends_on.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn test_replace_cascades_child_destroy_first() {
        let set = ChangeSet::from_plans(&[
            planned("pingone_environment.main", Action::Replace, &[]),
            planned("pingone_population.staff", Action::Destroy, &["pingone_environment.main"]),
        ]);

        assert_eq!(set.actions.len(), 3);
        assert_eq!(set.actions[0].kind, ChangeKind::Delete);
        assert_eq!(set.actions[0].address, "pingone_population.staff");
        assert_eq!(set.actions[1].kind, ChangeKind::Delete);
        assert_eq!(set.actions[1].address, "pingone_environment.main");
        assert_eq!(set.actions[1].dependencies, vec![0]);
        assert_eq!(set.actions[2].kind, ChangeKind::Create);
        assert_eq!(set.actions[2].dependencies, vec![1]);
        assert!(set.actions[2].reason.contains("region"));
    }

    #[test]
    fn test_creates_run_parents_first() {
        let set = ChangeSet::from_plans(&[
            planned("pingone_population.staff", Action::Create, &["pingone_environment.main"]),
            planned("pingone_environment.main", Action::Create, &[]),
        ]);

        assert_eq!(set.actions[0].address, "pingone_environment.main");
        assert_eq!(set.actions[1].dependencies, vec![0]);
        assert_eq!(set.count(ChangeKind::Create), 2);
    }

    #[test]
    fn test_noop_plans_produce_no_actions() {
        let set = ChangeSet::from_plans(&[planned("a", Action::NoOp, &[])]);
        assert!(set.is_empty());
        assert_eq!(set.to_string(), "No changes required");
    }
}
