//! Change-set executor.
//!
//! Walks a [`ChangeSet`] in order, dispatching each action to the
//! lifecycle driver and writing the outcome into the state document.
//! Actions whose dependencies failed are skipped.

use std::collections::{HashMap, HashSet};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::diag::Diagnostics;
use crate::error::Result;
use crate::lifecycle::{ApplyResult, Lifecycle};
use crate::state::{HistoryEntry, HistoryOperation, InstanceState, StateDocument};

use super::plan::{Action, ChangeAction, ChangeKind, ChangeSet, PlannedResource, ResourcePlan};

/// Re-plans an instance right before its create or update runs, once the
/// instances it references have reached their new state.
pub trait Replanner: Send + Sync {
    /// Returns a fresh plan, or `None` to keep the original one.
    ///
    /// # Errors
    ///
    /// Returns the planning failure; the action is then marked failed.
    fn replan(&self, resource: &PlannedResource, kind: ChangeKind, state: &StateDocument)
    -> Result<Option<ResourcePlan>>;
}

/// Executor for change sets.
pub struct PlanExecutor<'a> {
    /// Lifecycle driver.
    lifecycle: &'a Lifecycle,
    /// Whether to continue on errors.
    continue_on_error: bool,
    /// Late planning hook.
    replanner: Option<&'a dyn Replanner>,
}

impl std::fmt::Debug for PlanExecutor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanExecutor")
            .field("continue_on_error", &self.continue_on_error)
            .field("replanner", &self.replanner.is_some())
            .finish_non_exhaustive()
    }
}

/// Result of executing a single action.
#[derive(Debug)]
pub struct ActionResult {
    /// Action index.
    pub index: usize,
    /// Action that was executed.
    pub action: ChangeAction,
    /// Whether the action succeeded.
    pub success: bool,
    /// Whether the action was skipped because a dependency failed.
    pub skipped: bool,
    /// Remote identifier after the action, if any.
    pub resource_id: Option<String>,
    /// Error message (if failed).
    pub error: Option<String>,
    /// Diagnostics reported by the action.
    pub diagnostics: Diagnostics,
}

/// Result of executing a whole change set.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Individual action results.
    pub results: Vec<ActionResult>,
    /// Total actions executed.
    pub total_executed: usize,
    /// Number of successful actions.
    pub successful: usize,
    /// Number of failed actions.
    pub failed: usize,
    /// Number of skipped actions (due to dependency failures).
    pub skipped: usize,
    /// Whether the entire change set succeeded.
    pub success: bool,
}

impl<'a> PlanExecutor<'a> {
    /// Creates a new executor.
    #[must_use]
    pub const fn new(lifecycle: &'a Lifecycle) -> Self {
        Self {
            lifecycle,
            continue_on_error: false,
            replanner: None,
        }
    }

    /// Sets the hook consulted before each create and update.
    #[must_use]
    pub const fn with_replanner(mut self, replanner: &'a dyn Replanner) -> Self {
        self.replanner = Some(replanner);
        self
    }

    /// Sets whether to continue on errors.
    #[must_use]
    pub const fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Executes `change_set`, whose actions were built from `resources`.
    ///
    /// Every outcome, including partial state left by a failed action, is
    /// written into `state`, and a history entry is appended.
    pub async fn execute(
        &self,
        change_set: &ChangeSet,
        resources: &[PlannedResource],
        state: &mut StateDocument,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        info!("Executing change set with {} actions", change_set.actions.len());

        if change_set.is_empty() {
            return ExecutionResult {
                results: vec![],
                total_executed: 0,
                successful: 0,
                failed: 0,
                skipped: 0,
                success: true,
            };
        }

        let by_address: HashMap<&str, &PlannedResource> =
            resources.iter().map(|r| (r.address.as_str(), r)).collect();
        let mut results = Vec::new();
        let mut failed_indices: HashSet<usize> = HashSet::new();

        for (idx, action) in change_set.actions.iter().enumerate() {
            if action.dependencies.iter().any(|dep| failed_indices.contains(dep)) {
                warn!(address = %action.address, "Skipping action {} due to failed dependencies", idx);
                results.push(ActionResult {
                    index: idx,
                    action: action.clone(),
                    success: false,
                    skipped: true,
                    resource_id: None,
                    error: Some(String::from("Skipped due to dependency failure")),
                    diagnostics: Diagnostics::new(),
                });
                failed_indices.insert(idx);
                continue;
            }

            let result = match by_address.get(action.address.as_str()) {
                Some(resource) => self.execute_action(idx, action, resource, state, cancel).await,
                None => ActionResult {
                    index: idx,
                    action: action.clone(),
                    success: false,
                    skipped: false,
                    resource_id: None,
                    error: Some(String::from("No plan for this address")),
                    diagnostics: Diagnostics::new(),
                },
            };

            if !result.success {
                failed_indices.insert(idx);
                if !self.continue_on_error {
                    results.push(result);
                    break;
                }
            }
            results.push(result);
        }

        let successful = results.iter().filter(|r| r.success).count();
        let skipped = results.iter().filter(|r| r.skipped).count();
        let failed = results.len() - successful - skipped;

        let execution_result = ExecutionResult {
            total_executed: results.len(),
            successful,
            failed,
            skipped,
            success: failed == 0 && skipped == 0,
            results,
        };

        let addresses = change_set.actions.iter().map(|a| a.address.clone()).collect();
        let history_entry = if execution_result.success {
            HistoryEntry::new(HistoryOperation::Apply, addresses)
        } else {
            HistoryEntry::failed(
                HistoryOperation::Apply,
                addresses,
                &format!("{} actions failed", execution_result.failed),
            )
        };
        state.add_history(history_entry);

        execution_result
    }

    async fn execute_action(
        &self,
        index: usize,
        action: &ChangeAction,
        resource: &PlannedResource,
        state: &mut StateDocument,
        cancel: &CancellationToken,
    ) -> ActionResult {
        info!(address = %action.address, kind = ?action.kind, "Executing action {}: {}", index, action.reason);

        let replanned = match (self.replanner, action.kind) {
            (Some(replanner), ChangeKind::Create | ChangeKind::Update) => {
                match replanner.replan(resource, action.kind, state) {
                    Ok(plan) => plan,
                    Err(e) => return Self::failure(index, action, e.to_string()),
                }
            }
            _ => None,
        };
        let plan = replanned.as_ref().unwrap_or(&resource.plan);
        match (action.kind, plan.action) {
            (ChangeKind::Update, Action::NoOp) => {
                info!(address = %action.address, "Nothing left to update");
                return ActionResult {
                    index,
                    action: action.clone(),
                    success: true,
                    skipped: false,
                    resource_id: None,
                    error: None,
                    diagnostics: Diagnostics::new(),
                };
            }
            (ChangeKind::Update, Action::Replace | Action::Create) => {
                return Self::failure(
                    index,
                    action,
                    String::from("Referenced values now force a new resource; plan again"),
                );
            }
            _ => {}
        }

        let outcome = match (action.kind, plan.prior.as_ref(), plan.proposed.as_ref()) {
            (ChangeKind::Create, _, Some(planned)) => {
                self.lifecycle
                    .create(&action.address, &action.resource_type, planned, cancel)
                    .await
            }
            (ChangeKind::Update, Some(prior), Some(planned)) => {
                self.lifecycle
                    .update(&action.address, &action.resource_type, prior, planned, cancel)
                    .await
            }
            (ChangeKind::Delete, Some(prior), _) => {
                self.lifecycle
                    .delete(&action.address, &action.resource_type, prior, cancel)
                    .await
            }
            (ChangeKind::Delete, None, _) => {
                info!(address = %action.address, "Nothing to delete");
                return ActionResult {
                    index,
                    action: action.clone(),
                    success: true,
                    skipped: false,
                    resource_id: None,
                    error: None,
                    diagnostics: Diagnostics::new(),
                };
            }
            _ => {
                return Self::failure(index, action, String::from("Plan is missing the values this action needs"));
            }
        };

        self.record(resource, &outcome, state);

        let resource_id = outcome
            .state
            .as_ref()
            .and_then(|s| s.attr("id").as_str().map(ToString::to_string));
        match outcome.error {
            None => ActionResult {
                index,
                action: action.clone(),
                success: true,
                skipped: false,
                resource_id,
                error: None,
                diagnostics: outcome.diagnostics,
            },
            Some(e) => {
                error!(address = %action.address, error = %e, "Action failed");
                ActionResult {
                    index,
                    action: action.clone(),
                    success: false,
                    skipped: false,
                    resource_id,
                    error: Some(e.to_string()),
                    diagnostics: outcome.diagnostics,
                }
            }
        }
    }

    fn failure(index: usize, action: &ChangeAction, message: String) -> ActionResult {
        error!(address = %action.address, error = %message, "Action failed");
        ActionResult {
            index,
            action: action.clone(),
            success: false,
            skipped: false,
            resource_id: None,
            error: Some(message),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Writes the state an action left behind.
    fn record(&self, resource: &PlannedResource, outcome: &ApplyResult, state: &mut StateDocument) {
        match &outcome.state {
            Some(value) => {
                let version = self
                    .lifecycle
                    .registry()
                    .get(&resource.resource_type)
                    .map_or(0, |rt| rt.schema.version);
                state.set(
                    resource.address.clone(),
                    InstanceState::new(&resource.resource_type, version, value)
                        .with_dependencies(resource.depends_on.clone()),
                );
            }
            None => {
                state.remove(&resource.address);
            }
        }
    }
}

impl ExecutionResult {
    /// Returns true if all actions succeeded.
    #[must_use]
    pub const fn all_successful(&self) -> bool {
        self.success && self.failed == 0 && self.skipped == 0
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Executed {} actions: {} successful, {} failed, {} skipped",
            self.total_executed, self.successful, self.failed, self.skipped
        )
    }
}
