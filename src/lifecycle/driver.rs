//! The lifecycle driver.
//!
//! Wraps every handler call with the rules that hold for all resource
//! types: one operation at a time per instance, a read after every write,
//! trigger attributes carried over from the plan, the parent existence
//! check, per-operation timeouts and cancellation, partial state on failure,
//! and the post-apply consistency check.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::client::ApiClient;
use crate::config::OperationTimeouts;
use crate::diag::Diagnostics;
use crate::error::{LifecycleError, PlanError, ProviderError, Result};
use crate::planner::{Action, ResourcePlan};
use crate::schema::{Attribute, Nesting, Registry, ResourceType, Schema};
use crate::value::{equal, Path, Value};

use super::handler::{OpContext, ReadOutcome, StateWriter, UpdateOutcome};

/// Lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Create.
    Create,
    /// Read.
    Read,
    /// Update.
    Update,
    /// Delete.
    Delete,
    /// Import.
    Import,
}

impl Operation {
    /// Wall-clock budget of this operation.
    #[must_use]
    pub const fn timeout(self, timeouts: &OperationTimeouts) -> Duration {
        match self {
            Self::Create => timeouts.create,
            Self::Read | Self::Import => timeouts.read,
            Self::Update => timeouts.update,
            Self::Delete => timeouts.delete,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Import => "import",
        };
        write!(f, "{s}")
    }
}

/// Outcome of a write operation.
///
/// `state` is what should be persisted for the instance: the new state on
/// success, and on failure whatever the remote system is known to hold
/// (partial state after a create, the prior state after a failed update).
/// `None` means the instance has no state.
#[derive(Debug)]
pub struct ApplyResult {
    /// State to persist.
    pub state: Option<Value>,
    /// Warnings and errors collected along the way.
    pub diagnostics: Diagnostics,
    /// The failure, if any.
    pub error: Option<ProviderError>,
}

impl ApplyResult {
    const fn ok(state: Option<Value>, diagnostics: Diagnostics) -> Self {
        Self {
            state,
            diagnostics,
            error: None,
        }
    }

    const fn failed(state: Option<Value>, diagnostics: Diagnostics, error: ProviderError) -> Self {
        Self {
            state,
            diagnostics,
            error: Some(error),
        }
    }

    /// Returns true if the operation succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A resource brought under management by import.
#[derive(Debug, Clone)]
pub struct ImportedResource {
    /// Resource type name.
    pub resource_type: String,
    /// State read from the remote system.
    pub state: Value,
    /// Warnings collected during the read.
    pub diagnostics: Diagnostics,
}

type LockMap = std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>;

/// Exclusive hold on one instance address. The address leaves the lock map
/// once no other operation is waiting on it.
struct InstanceGuard<'a> {
    locks: &'a LockMap,
    address: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InstanceGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(&self.address).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.address);
        }
    }
}

/// Runs handler operations for every registered resource type.
pub struct Lifecycle {
    client: Arc<ApiClient>,
    registry: Arc<Registry>,
    timeouts: OperationTimeouts,
    locks: LockMap,
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("types", &self.registry.len())
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl Lifecycle {
    /// Creates a driver with default timeouts.
    #[must_use]
    pub fn new(client: Arc<ApiClient>, registry: Arc<Registry>) -> Self {
        Self {
            client,
            registry,
            timeouts: OperationTimeouts::default(),
            locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the per-operation timeouts.
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: OperationTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Registry the driver dispatches through.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    async fn lock_instance(&self, address: &str) -> InstanceGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(address.to_string()).or_default())
        };
        let mut held = InstanceGuard {
            locks: &self.locks,
            address: address.to_string(),
            guard: None,
        };
        held.guard = Some(lock.lock_owned().await);
        held
    }

    fn context<'a>(&'a self, rt: &'a ResourceType, address: &'a str, cancel: &CancellationToken) -> OpContext<'a> {
        OpContext {
            client: &self.client,
            resource_type: &rt.name,
            address,
            cancel: cancel.clone(),
            partial: StateWriter::default(),
        }
    }

    /// Applies a plan to one instance.
    pub async fn apply(
        &self,
        address: &str,
        resource_type: &str,
        plan: &ResourcePlan,
        cancel: &CancellationToken,
    ) -> ApplyResult {
        let _guard = self.lock_instance(address).await;
        let rt = match self.registry.get(resource_type) {
            Ok(rt) => rt,
            Err(e) => return ApplyResult::failed(plan.prior.clone(), Diagnostics::new(), e.into()),
        };

        match (plan.action, plan.prior.as_ref(), plan.proposed.as_ref()) {
            (Action::NoOp, prior, _) => ApplyResult::ok(prior.cloned(), Diagnostics::new()),
            (Action::Create, _, Some(planned)) => self.create_unlocked(rt, address, planned, cancel).await,
            (Action::Update, Some(prior), Some(planned)) => {
                self.update_unlocked(rt, address, prior, planned, cancel).await
            }
            (Action::Destroy, Some(prior), _) => self.delete_unlocked(rt, address, prior, cancel).await,
            (Action::Replace, Some(prior), Some(planned)) => {
                let deleted = self.delete_unlocked(rt, address, prior, cancel).await;
                if !deleted.is_success() {
                    return deleted;
                }
                let mut created = self.create_unlocked(rt, address, planned, cancel).await;
                let mut diagnostics = deleted.diagnostics;
                diagnostics.extend(created.diagnostics);
                created.diagnostics = diagnostics;
                created
            }
            (action, prior, _) => ApplyResult::failed(
                prior.cloned(),
                Diagnostics::new(),
                ProviderError::internal(format!("plan for {address} is incomplete for action {action}")),
            ),
        }
    }

    /// Creates one instance and reads it back.
    pub async fn create(
        &self,
        address: &str,
        resource_type: &str,
        planned: &Value,
        cancel: &CancellationToken,
    ) -> ApplyResult {
        let _guard = self.lock_instance(address).await;
        match self.registry.get(resource_type) {
            Ok(rt) => self.create_unlocked(rt, address, planned, cancel).await,
            Err(e) => ApplyResult::failed(None, Diagnostics::new(), e.into()),
        }
    }

    /// Updates one instance and reads it back.
    pub async fn update(
        &self,
        address: &str,
        resource_type: &str,
        prior: &Value,
        planned: &Value,
        cancel: &CancellationToken,
    ) -> ApplyResult {
        let _guard = self.lock_instance(address).await;
        match self.registry.get(resource_type) {
            Ok(rt) => self.update_unlocked(rt, address, prior, planned, cancel).await,
            Err(e) => ApplyResult::failed(Some(prior.clone()), Diagnostics::new(), e.into()),
        }
    }

    /// Deletes one instance.
    pub async fn delete(
        &self,
        address: &str,
        resource_type: &str,
        current: &Value,
        cancel: &CancellationToken,
    ) -> ApplyResult {
        let _guard = self.lock_instance(address).await;
        match self.registry.get(resource_type) {
            Ok(rt) => self.delete_unlocked(rt, address, current, cancel).await,
            Err(e) => ApplyResult::failed(Some(current.clone()), Diagnostics::new(), e.into()),
        }
    }

    /// Refreshes one instance. `None` means the resource is gone and its
    /// state should be cleared.
    ///
    /// # Errors
    ///
    /// Returns the classified API error, [`LifecycleError::Cancelled`] or
    /// [`LifecycleError::Timeout`].
    pub async fn read(
        &self,
        address: &str,
        resource_type: &str,
        current: &Value,
        cancel: &CancellationToken,
    ) -> Result<(Option<Value>, Diagnostics)> {
        let _guard = self.lock_instance(address).await;
        let rt = self.registry.get(resource_type)?;
        let mut diags = Diagnostics::new();
        let outcome = self
            .read_unlocked(rt, address, current, Operation::Read, cancel, &mut diags)
            .await;
        outcome.map(|state| (state, diags))
    }

    /// Imports the resource identified by `id` as the instance at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidImportId`] for a malformed id,
    /// [`LifecycleError::MissingValue`] if the resource does not exist, or
    /// any read error.
    pub async fn import(
        &self,
        address: &str,
        resource_type: &str,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ImportedResource>> {
        let rt = self.registry.get(resource_type)?;
        let mut initial = rt.import_format.initial_state(id)?;
        for name in rt.schema.attributes.keys() {
            if initial.attr(name).is_null() {
                initial.set_attr(name.clone(), Value::Null);
            }
        }

        let _guard = self.lock_instance(address).await;
        let mut diagnostics = Diagnostics::new();
        let state = self
            .read_unlocked(rt, address, &initial, Operation::Import, cancel, &mut diagnostics)
            .await?
            .ok_or_else(|| LifecycleError::MissingValue {
                resource_type: resource_type.to_string(),
                message: format!("cannot import non-existent remote object \"{id}\""),
            })?;

        info!(resource_type, id, "Imported resource");
        Ok(vec![ImportedResource {
            resource_type: resource_type.to_string(),
            state,
            diagnostics,
        }])
    }

    async fn create_unlocked(
        &self,
        rt: &ResourceType,
        address: &str,
        planned: &Value,
        cancel: &CancellationToken,
    ) -> ApplyResult {
        let ctx = self.context(rt, address, cancel);
        let mut diags = Diagnostics::new();

        let op = async {
            let created = rt.handler.create(&ctx, planned, &mut diags).await?;
            let created = carry_triggers(&rt.schema, planned, created);
            ctx.partial.record(created.clone());

            let ReadOutcome::Found(state) = rt.handler.read(&ctx, &created, &mut diags).await? else {
                return Err(vanished(rt, &created, Operation::Create));
            };
            let state = carry_triggers(&rt.schema, planned, state);
            check_consistency(&rt.schema, planned, &state)?;
            Ok(state)
        };
        let outcome = self.bounded(rt, address, Operation::Create, cancel, op).await;

        match outcome {
            Ok(state) => {
                info!(address, resource_type = %rt.name, "Created resource");
                ApplyResult::ok(Some(state), diags)
            }
            Err(e) => {
                let partial = ctx.partial.take();
                if partial.is_some() {
                    warn!(address, error = %e, "Create failed after the resource was allocated; keeping partial state");
                }
                ApplyResult::failed(partial, diags, e)
            }
        }
    }

    async fn update_unlocked(
        &self,
        rt: &ResourceType,
        address: &str,
        prior: &Value,
        planned: &Value,
        cancel: &CancellationToken,
    ) -> ApplyResult {
        let ctx = self.context(rt, address, cancel);
        let mut diags = Diagnostics::new();

        let op = async {
            let updated = match rt.handler.update(&ctx, prior, planned, &mut diags).await? {
                UpdateOutcome::Updated(updated) => carry_triggers(&rt.schema, planned, updated),
                UpdateOutcome::NotFound => return Ok(None),
            };
            ctx.partial.record(updated.clone());

            let ReadOutcome::Found(state) = rt.handler.read(&ctx, &updated, &mut diags).await? else {
                return Err(vanished(rt, &updated, Operation::Update));
            };
            let state = carry_triggers(&rt.schema, planned, state);
            check_consistency(&rt.schema, planned, &state)?;
            Ok(Some(state))
        };
        let outcome = self.bounded(rt, address, Operation::Update, cancel, op).await;

        match outcome {
            Ok(Some(state)) => {
                info!(address, resource_type = %rt.name, "Updated resource");
                ApplyResult::ok(Some(state), diags)
            }
            Ok(None) => {
                warn!(address, "Resource disappeared before update; it will be recreated");
                diags.warning(
                    None,
                    "Resource no longer exists",
                    format!("{address} was not found while updating. The next plan will create it again."),
                );
                ApplyResult::ok(None, diags)
            }
            Err(e) => {
                let state = ctx.partial.take().unwrap_or_else(|| prior.clone());
                ApplyResult::failed(Some(state), diags, e)
            }
        }
    }

    async fn delete_unlocked(
        &self,
        rt: &ResourceType,
        address: &str,
        current: &Value,
        cancel: &CancellationToken,
    ) -> ApplyResult {
        let ctx = self.context(rt, address, cancel);
        let mut diags = Diagnostics::new();
        let op = rt.handler.delete(&ctx, current, &mut diags);
        let outcome = self.bounded(rt, address, Operation::Delete, cancel, op).await;

        match outcome {
            Ok(()) => {
                info!(address, resource_type = %rt.name, "Deleted resource");
                ApplyResult::ok(None, diags)
            }
            Err(e) => ApplyResult::failed(Some(current.clone()), diags, e),
        }
    }

    async fn read_unlocked(
        &self,
        rt: &ResourceType,
        address: &str,
        current: &Value,
        operation: Operation,
        cancel: &CancellationToken,
        diags: &mut Diagnostics,
    ) -> Result<Option<Value>> {
        let ctx = self.context(rt, address, cancel);
        let op = async {
            let ReadOutcome::Found(state) = rt.handler.read(&ctx, current, diags).await? else {
                return Ok(None);
            };
            if let Some(parent) = &rt.parent
                && let Some(parent_id) = state.attr(&parent.attribute).as_str()
            {
                let parent_rt = self.registry.get(&parent.resource_type)?;
                if !parent_rt.handler.exists(&ctx, parent_id).await? {
                    info!(address, parent = %parent.resource_type, parent_id, "Parent no longer exists");
                    crate::client::classify::not_found_warning(diags, None);
                    return Ok(None);
                }
            }
            Ok(Some(carry_triggers(&rt.schema, current, state)))
        };
        self.bounded(rt, address, operation, cancel, op).await
    }

    async fn bounded<T, F>(
        &self,
        rt: &ResourceType,
        address: &str,
        operation: Operation,
        cancel: &CancellationToken,
        fut: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let timeout = operation.timeout(&self.timeouts);
        let span = info_span!(
            "lifecycle",
            resource_type = %rt.name,
            address,
            operation = %operation,
            operation_id = %Uuid::new_v4(),
        );

        async {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    warn!("Operation cancelled");
                    Err(LifecycleError::Cancelled {
                        operation: operation.to_string(),
                        address: address.to_string(),
                    }
                    .into())
                }
                outcome = tokio::time::timeout(timeout, fut) => match outcome {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(timeout_secs = timeout.as_secs(), "Operation timed out");
                        Err(LifecycleError::Timeout {
                            operation: operation.to_string(),
                            address: address.to_string(),
                            timeout,
                        }
                        .into())
                    }
                },
            }
        }
        .instrument(span)
        .await
    }
}

fn vanished(rt: &ResourceType, state: &Value, operation: Operation) -> ProviderError {
    LifecycleError::Vanished {
        resource_type: rt.name.clone(),
        id: state.attr("id").as_str().unwrap_or("(unknown id)").to_string(),
        operation: operation.to_string(),
    }
    .into()
}

/// Copies trigger attributes from `source` into `state`.
fn carry_triggers(schema: &Schema, source: &Value, mut state: Value) -> Value {
    for (name, attr) in &schema.attributes {
        if attr.trigger {
            state.set_attr(name.clone(), source.attr(name).clone());
        }
    }
    state
}

/// Checks that `state` keeps every known planned value and has no unknowns.
fn check_consistency(schema: &Schema, planned: &Value, state: &Value) -> std::result::Result<(), PlanError> {
    check_known(&schema.attributes, &Path::root(), planned, state)?;
    for name in schema.attributes.keys() {
        if !state.attr(name).is_fully_known() {
            return Err(PlanError::inconsistent(
                Path::root().attr(name.clone()),
                "provider returned an unknown value after apply",
            ));
        }
    }
    Ok(())
}

fn check_known(
    attributes: &BTreeMap<String, Attribute>,
    base: &Path,
    planned: &Value,
    state: &Value,
) -> std::result::Result<(), PlanError> {
    for (name, attr) in attributes {
        let path = base.attr(name.clone());
        let p = planned.attr(name);
        if attr.trigger || p.is_unknown() {
            continue;
        }
        if p.is_fully_known() {
            if !equal(p, state.attr(name), &attr.attr_type()) {
                return Err(PlanError::inconsistent(
                    &path,
                    "provider produced a value that differs from the planned value",
                ));
            }
        } else if let (Some(children), Some(Nesting::Single)) = (attr.children(), attr.nesting()) {
            check_known(children, &path, p, state.attr(name))?;
        }
    }
    Ok(())
}
