//! The orchestrator-facing reconciler.
//!
//! [`Reconciler`] answers the handshake calls an orchestrator makes for
//! each resource instance (`get_schema`, `validate_config`, `plan`,
//! `apply`, `import`, `upgrade_state`) and offers the same operations over
//! whole configuration and state documents for the command line.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::ApiClient;
use crate::config::OperationTimeouts;
use crate::diag::Diagnostics;
use crate::error::{PlanError, ProviderError, Result};
use crate::lifecycle::{ApplyResult, ImportedResource, Lifecycle};
use crate::planner::{
    plan_resource, references, resolve_references, ChangeKind, ChangeSet, ExecutionResult, PlanExecutor,
    PlannedResource, Reference, Replanner, ResourcePlan,
};
use crate::schema::{Registry, ResourceType, ResourceTypeDump};
use crate::state::{self as state_mod, HistoryEntry, HistoryOperation, InstanceState, StateDocument};
use crate::validators;
use crate::value::{parse, parse_strict, Value};

/// Desired configuration of many resource instances.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigDocument {
    /// Instances keyed by address, e.g. `pingone_population.staff`.
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceConfig>,
}

/// Desired configuration of one resource instance.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceConfig {
    /// Resource type; defaults to the address up to its first `.`.
    #[serde(rename = "type", default)]
    pub resource_type: Option<String>,
    /// Addresses this instance depends on.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Attribute values.
    pub config: JsonValue,
}

impl ResourceConfig {
    /// Resolved resource type of the instance at `address`.
    #[must_use]
    pub fn type_name<'a>(&'a self, address: &'a str) -> &'a str {
        self.resource_type
            .as_deref()
            .unwrap_or_else(|| address.split('.').next().unwrap_or(address))
    }
}

/// Outcome of refreshing a state document.
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// Instances whose state was re-read.
    pub refreshed: Vec<String>,
    /// Instances removed because they no longer exist.
    pub removed: Vec<String>,
    /// Warnings collected along the way.
    pub diagnostics: Diagnostics,
    /// Instances that could not be refreshed, with the reason.
    pub errors: Vec<(String, String)>,
}

/// Reconciler over a registry of resource types.
#[derive(Debug)]
pub struct Reconciler {
    registry: Arc<Registry>,
    lifecycle: Option<Lifecycle>,
}

impl Reconciler {
    /// Creates a reconciler that can validate and plan but not call PingOne.
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
            lifecycle: None,
        }
    }

    /// Attaches an API client, enabling apply, read and import.
    #[must_use]
    pub fn with_client(mut self, client: ApiClient, timeouts: OperationTimeouts) -> Self {
        self.lifecycle =
            Some(Lifecycle::new(Arc::new(client), Arc::clone(&self.registry)).with_timeouts(timeouts));
        self
    }

    /// Registered resource types.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn lifecycle(&self) -> Result<&Lifecycle> {
        self.lifecycle
            .as_ref()
            .ok_or_else(|| ProviderError::internal("no PingOne client is configured"))
    }

    /// Every resource type with its schema.
    #[must_use]
    pub fn get_schema(&self) -> BTreeMap<String, ResourceTypeDump> {
        self.registry.dump()
    }

    /// Validates a configuration without planning it.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::UnknownResourceType`] or
    /// [`PlanError::TypeMismatch`]; validation problems are returned as
    /// diagnostics.
    pub fn validate_config(&self, resource_type: &str, config: &JsonValue) -> Result<Diagnostics> {
        let rt = self.registry.get(resource_type)?;
        let (value, mut diagnostics) = parse(config, &rt.schema.object_type())?;
        diagnostics.extend(validators::validate_config(&rt.schema, &value));
        Ok(diagnostics)
    }

    /// Plans one instance from wire-form prior state and configuration.
    ///
    /// `prior` must already be at the current schema version; run
    /// [`Reconciler::upgrade_state`] first otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::ValidationFailure`] when the configuration is
    /// invalid, or any other planning error.
    pub fn plan(
        &self,
        resource_type: &str,
        prior: Option<&JsonValue>,
        config: Option<&JsonValue>,
    ) -> Result<ResourcePlan> {
        let rt = self.registry.get(resource_type)?;
        let prior = prior
            .map(|raw| parse_strict(raw, &rt.schema.object_type()))
            .transpose()?;
        plan_with(rt, prior.as_ref(), config)
    }

    /// Applies a plan to one instance.
    ///
    /// # Errors
    ///
    /// Fails only when no API client is configured; operation failures are
    /// reported inside the [`ApplyResult`].
    pub async fn apply(
        &self,
        address: &str,
        resource_type: &str,
        plan: &ResourcePlan,
        cancel: &CancellationToken,
    ) -> Result<ApplyResult> {
        Ok(self.lifecycle()?.apply(address, resource_type, plan, cancel).await)
    }

    /// Reads one instance; `None` means it no longer exists.
    ///
    /// # Errors
    ///
    /// Returns the read failure.
    pub async fn read(
        &self,
        address: &str,
        resource_type: &str,
        current: &Value,
        cancel: &CancellationToken,
    ) -> Result<(Option<Value>, Diagnostics)> {
        self.lifecycle()?.read(address, resource_type, current, cancel).await
    }

    /// Imports the remote object identified by `id` as the instance at
    /// `address`.
    ///
    /// # Errors
    ///
    /// Returns the import failure.
    pub async fn import(
        &self,
        address: &str,
        resource_type: &str,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ImportedResource>> {
        self.lifecycle()?.import(address, resource_type, id, cancel).await
    }

    /// Upgrades wire-form state written with schema `version`.
    ///
    /// # Errors
    ///
    /// Returns the [`crate::error::StateError`] describing why the state
    /// cannot be upgraded.
    pub fn upgrade_state(&self, resource_type: &str, version: u64, raw: &JsonValue) -> Result<Value> {
        let rt = self.registry.get(resource_type)?;
        Ok(state_mod::upgrade_state(
            resource_type,
            &rt.schema,
            &rt.upgraders,
            version,
            raw,
        )?)
    }

    /// Decodes a persisted instance, upgrading it to the current schema.
    ///
    /// # Errors
    ///
    /// See [`Reconciler::upgrade_state`].
    pub fn decode(&self, instance: &InstanceState) -> Result<Value> {
        self.upgrade_state(&instance.resource_type, instance.schema_version, &instance.value)
    }

    fn encode(&self, resource_type: &str, value: &Value, depends_on: Vec<String>) -> Result<InstanceState> {
        let rt = self.registry.get(resource_type)?;
        Ok(InstanceState::new(resource_type, rt.schema.version, value).with_dependencies(depends_on))
    }

    /// Plans every configured instance plus the destruction of every
    /// instance that is in state but no longer configured.
    ///
    /// Instances are planned after the instances they reference, and each
    /// `$ref` resolves to the referenced instance's proposed value. A
    /// referenced instance that is still to be created therefore yields an
    /// unknown.
    ///
    /// # Errors
    ///
    /// Returns the first planning failure.
    pub fn plan_document(&self, config: &ConfigDocument, state: &StateDocument) -> Result<Vec<PlannedResource>> {
        let mut planned = Vec::new();
        let mut proposed: HashMap<String, Value> = HashMap::new();

        for address in planning_order(config)? {
            let Some(rc) = config.resources.get(&address) else {
                continue;
            };
            let type_name = rc.type_name(&address);
            let rt = self.registry.get(type_name)?;
            let prior = match state.get(&address) {
                Some(instance) if instance.resource_type != type_name => {
                    return Err(ProviderError::internal(format!(
                        "{address} is recorded as {} but configured as {type_name}",
                        instance.resource_type
                    )));
                }
                Some(instance) => Some(self.decode(instance)?),
                None => None,
            };
            let resolved = resolve_references(&address, &rc.config, &mut |r: &Reference| {
                self.check_reference(&address, r, config)?;
                proposed
                    .get(&r.address)
                    .map(|value| value.attr(&r.attribute).to_json())
                    .ok_or_else(|| unresolved(&address, r, "referenced instance has no plan"))
            })?;
            let plan = plan_with(rt, prior.as_ref(), Some(&resolved))
                .inspect_err(|e| debug!(address = %address, error = %e, "Planning failed"))?;
            if let Some(value) = &plan.proposed {
                proposed.insert(address.clone(), value.clone());
            }
            planned.push(PlannedResource {
                depends_on: dependencies(&address, rc)?,
                resource_type: type_name.to_string(),
                plan,
                address,
            });
        }

        for (address, instance) in &state.resources {
            if config.resources.contains_key(address) {
                continue;
            }
            let rt = self.registry.get(&instance.resource_type)?;
            let prior = self.decode(instance)?;
            planned.push(PlannedResource {
                address: address.clone(),
                resource_type: instance.resource_type.clone(),
                plan: plan_resource(&rt.schema, Some(&prior), None)?,
                depends_on: instance.depends_on.clone(),
            });
        }

        Ok(planned)
    }

    /// A reference must name a configured instance and one of its
    /// top-level attributes.
    fn check_reference(
        &self,
        address: &str,
        r: &Reference,
        config: &ConfigDocument,
    ) -> std::result::Result<(), PlanError> {
        let Some(target) = config.resources.get(&r.address) else {
            return Err(unresolved(address, r, "referenced instance is not configured"));
        };
        let rt = self.registry.get(target.type_name(&r.address))?;
        if !rt.schema.attributes.contains_key(&r.attribute) {
            return Err(unresolved(address, r, "no such attribute"));
        }
        Ok(())
    }

    /// Plans and applies a configuration document against `state`.
    ///
    /// Instances holding references are planned again right before their
    /// action runs, so a child created in the same run sees its parent's
    /// new identifier.
    ///
    /// # Errors
    ///
    /// Returns a planning failure or a missing client; action failures are
    /// reported in the [`ExecutionResult`] and reflected in `state`.
    pub async fn apply_document(
        &self,
        config: &ConfigDocument,
        state: &mut StateDocument,
        continue_on_error: bool,
        cancel: &CancellationToken,
    ) -> Result<(ChangeSet, ExecutionResult)> {
        let lifecycle = self.lifecycle()?;
        let planned = self.plan_document(config, state)?;
        let change_set = ChangeSet::from_plans(&planned);
        info!(actions = change_set.actions.len(), "Applying change set");

        let replanner = DocumentReplanner {
            reconciler: self,
            config,
        };
        let executor = PlanExecutor::new(lifecycle)
            .with_continue_on_error(continue_on_error)
            .with_replanner(&replanner);
        let result = executor.execute(&change_set, &planned, state, cancel).await;
        Ok((change_set, result))
    }

    /// Re-reads every instance of `state`, dropping the ones that are gone.
    ///
    /// # Errors
    ///
    /// Fails only when no API client is configured.
    pub async fn refresh_document(&self, state: &mut StateDocument, cancel: &CancellationToken) -> Result<RefreshReport> {
        let lifecycle = self.lifecycle()?;
        let mut report = RefreshReport::default();

        let instances: Vec<(String, InstanceState)> =
            state.resources.iter().map(|(a, i)| (a.clone(), i.clone())).collect();
        for (address, instance) in instances {
            let outcome = match self.decode(&instance) {
                Ok(current) => {
                    lifecycle
                        .read(&address, &instance.resource_type, &current, cancel)
                        .await
                }
                Err(e) => Err(e),
            };
            match outcome {
                Ok((Some(value), diagnostics)) => {
                    report.diagnostics.extend(diagnostics);
                    state.set(
                        address.clone(),
                        self.encode(&instance.resource_type, &value, instance.depends_on.clone())?,
                    );
                    report.refreshed.push(address);
                }
                Ok((None, diagnostics)) => {
                    report.diagnostics.extend(diagnostics);
                    info!(address = %address, "Resource no longer exists; removing from state");
                    state.remove(&address);
                    report.removed.push(address);
                }
                Err(e) => {
                    warn!(address = %address, error = %e, "Refresh failed");
                    report.errors.push((address, e.to_string()));
                }
            }
        }

        let addresses = report.refreshed.iter().chain(&report.removed).cloned().collect();
        state.add_history(if report.errors.is_empty() {
            HistoryEntry::new(HistoryOperation::Refresh, addresses)
        } else {
            HistoryEntry::failed(
                HistoryOperation::Refresh,
                addresses,
                &format!("{} instances could not be refreshed", report.errors.len()),
            )
        });
        Ok(report)
    }

    /// Imports `id` into `state` under `address`.
    ///
    /// # Errors
    ///
    /// Returns the import failure, or an error if `address` is already
    /// managed.
    pub async fn import_document(
        &self,
        state: &mut StateDocument,
        address: &str,
        resource_type: &str,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Diagnostics> {
        if state.get(address).is_some() {
            return Err(ProviderError::internal(format!("{address} is already managed")));
        }
        let mut diagnostics = Diagnostics::new();
        for imported in self.import(address, resource_type, id, cancel).await? {
            diagnostics.extend(imported.diagnostics);
            state.set(address, self.encode(&imported.resource_type, &imported.state, Vec::new())?);
        }
        state.add_history(HistoryEntry::new(HistoryOperation::Import, vec![address.to_string()]));
        Ok(diagnostics)
    }

    /// Rewrites every instance of `state` at its current schema version.
    /// Returns the number of instances upgraded.
    ///
    /// # Errors
    ///
    /// Returns the first upgrade failure; `state` is left unchanged.
    pub fn upgrade_document(&self, state: &mut StateDocument) -> Result<usize> {
        Ok(state_mod::upgrade_document(&self.registry, state)?.len())
    }
}

/// Re-plans referencing instances against the state written so far.
struct DocumentReplanner<'a> {
    reconciler: &'a Reconciler,
    config: &'a ConfigDocument,
}

impl Replanner for DocumentReplanner<'_> {
    fn replan(
        &self,
        resource: &PlannedResource,
        kind: ChangeKind,
        state: &StateDocument,
    ) -> Result<Option<ResourcePlan>> {
        let Some(rc) = self.config.resources.get(&resource.address) else {
            return Ok(None);
        };
        let address = resource.address.as_str();
        if references(address, &rc.config)?.is_empty() {
            return Ok(None);
        }
        let resolved = resolve_references(address, &rc.config, &mut |r: &Reference| {
            let instance = state
                .get(&r.address)
                .ok_or_else(|| unresolved(address, r, "referenced instance has no state"))?;
            let value = self
                .reconciler
                .decode(instance)
                .map_err(|e| unresolved(address, r, &e.to_string()))?;
            Ok(value.attr(&r.attribute).to_json())
        })?;
        let prior = match (kind, state.get(address)) {
            (ChangeKind::Update, Some(instance)) => Some(self.reconciler.decode(instance)?),
            _ => None,
        };
        let rt = self.reconciler.registry.get(&resource.resource_type)?;
        debug!(address = %address, "Re-planning with resolved references");
        plan_with(rt, prior.as_ref(), Some(&resolved)).map(Some)
    }
}

fn unresolved(address: &str, r: &Reference, message: &str) -> PlanError {
    PlanError::UnresolvedReference {
        address: address.to_string(),
        reference: r.to_string(),
        message: message.to_string(),
    }
}

/// Explicit dependencies plus every referenced instance.
fn dependencies(address: &str, rc: &ResourceConfig) -> Result<Vec<String>> {
    let mut depends_on = rc.depends_on.clone();
    for r in references(address, &rc.config)? {
        if !depends_on.contains(&r.address) {
            depends_on.push(r.address);
        }
    }
    Ok(depends_on)
}

/// Configured addresses ordered so every instance follows the instances it
/// references.
fn planning_order(config: &ConfigDocument) -> Result<Vec<String>> {
    let mut edges: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for (address, rc) in &config.resources {
        let targets = references(address, &rc.config)?
            .into_iter()
            .map(|r| r.address)
            .filter(|target| config.resources.contains_key(target))
            .collect();
        edges.insert(address.as_str(), targets);
    }

    let mut order = Vec::new();
    let mut done: HashSet<String> = HashSet::new();
    for address in edges.keys() {
        visit(address, &edges, &mut done, &mut Vec::new(), &mut order)?;
    }
    Ok(order)
}

fn visit(
    address: &str,
    edges: &BTreeMap<&str, Vec<String>>,
    done: &mut HashSet<String>,
    stack: &mut Vec<String>,
    order: &mut Vec<String>,
) -> Result<()> {
    if done.contains(address) {
        return Ok(());
    }
    if stack.iter().any(|a| a == address) {
        return Err(PlanError::UnresolvedReference {
            address: address.to_string(),
            reference: stack.join(" -> "),
            message: String::from("reference cycle"),
        }
        .into());
    }
    stack.push(address.to_string());
    for target in edges.get(address).into_iter().flatten() {
        visit(target, edges, done, stack, order)?;
    }
    stack.pop();
    done.insert(address.to_string());
    order.push(address.to_string());
    Ok(())
}

/// Parses `config` and plans one instance of `rt`.
fn plan_with(rt: &ResourceType, prior: Option<&Value>, config: Option<&JsonValue>) -> Result<ResourcePlan> {
    let Some(raw) = config else {
        return Ok(plan_resource(&rt.schema, prior, None)?);
    };
    let (config, parse_diagnostics) = parse(raw, &rt.schema.object_type())?;
    if parse_diagnostics.has_errors() {
        return Err(PlanError::ValidationFailure {
            count: parse_diagnostics.error_count(),
            diagnostics: parse_diagnostics,
        }
        .into());
    }
    let mut plan = plan_resource(&rt.schema, prior, Some(&config))?;
    let mut diagnostics = parse_diagnostics;
    diagnostics.extend(std::mem::take(&mut plan.diagnostics));
    plan.diagnostics = diagnostics;
    Ok(plan)
}
