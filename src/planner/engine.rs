//! The plan engine.
//!
//! Given prior state, configuration and schema, computes the proposed next
//! state and the action for one resource instance:
//!
//! 1. null configuration of a computed attribute becomes unknown when the
//!    resource is being created or otherwise changes, and keeps its prior
//!    value when it does not;
//! 2. plan modifiers run in declaration order;
//! 3. declared defaults fill remaining nulls of optional attributes;
//! 4. validators run over the configuration;
//! 5. prior and proposed are diffed to choose the action.
//!
//! Planning is pure: the same inputs always produce the same plan.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::PlanError;
use crate::schema::{Attribute, Nesting, Schema};
use crate::validators::validate_config;
use crate::value::{equal, Path, Value};

use super::diff::compute_changes;
use super::modifier::{ModifierRequest, ModifierResponse};
use super::plan::{Action, ResourcePlan};

/// Plans one resource instance.
///
/// `prior` is `None` when no state exists; `config` is `None` when the
/// resource was removed from configuration.
///
/// # Errors
///
/// Returns [`PlanError::ValidationFailure`] carrying every collected error
/// diagnostic, or [`PlanError::PlanInconsistency`] if a plan modifier broke
/// a planning invariant.
pub fn plan_resource(
    schema: &Schema,
    prior: Option<&Value>,
    config: Option<&Value>,
) -> Result<ResourcePlan, PlanError> {
    let Some(config) = config else {
        let action = if prior.is_some() { Action::Destroy } else { Action::NoOp };
        return Ok(ResourcePlan::without_config(action, prior.cloned()));
    };

    let root_type = schema.object_type();
    let prior_value = prior.cloned().unwrap_or(Value::Null);
    let exists = prior.is_some();

    let mut diagnostics = validate_config(schema, config);

    let mut proposer = Proposer {
        exists,
        has_changes: true,
        requires_replace: Vec::new(),
    };
    let proposal = merge_object(&schema.attributes, config, &prior_value).and_then(|merged| {
        proposer.has_changes = !exists || !equal(&prior_value, &merged, &root_type);
        proposer.object(&schema.attributes, &Path::root(), config, &prior_value)
    });
    let proposed = match proposal {
        Ok(proposed) => proposed,
        Err(e) if diagnostics.has_errors() => {
            diagnostics.error_general("Provider produced an inconsistent plan", e.to_string());
            return Err(PlanError::ValidationFailure {
                count: diagnostics.error_count(),
                diagnostics,
            });
        }
        Err(e) => return Err(e),
    };

    if diagnostics.has_errors() {
        return Err(PlanError::ValidationFailure {
            count: diagnostics.error_count(),
            diagnostics,
        });
    }

    let changes = if exists {
        compute_changes(&schema.attributes, &prior_value, &proposed, &proposer.requires_replace)
    } else {
        Vec::new()
    };
    let requires_replace: Vec<Path> = proposer
        .requires_replace
        .into_iter()
        .filter(|p| changes.iter().any(|c| c.path.is_prefix_of(p) || p.is_prefix_of(&c.path)))
        .collect();

    let action = if !exists {
        Action::Create
    } else if changes.iter().any(|c| c.requires_replace) {
        Action::Replace
    } else if !changes.is_empty() || !equal(&prior_value, &proposed, &root_type) {
        Action::Update
    } else {
        Action::NoOp
    };

    // The create half of a replacement starts from nothing, so prior
    // computed values must not leak into it.
    let proposed = if action == Action::Replace {
        let mut fresh = Proposer {
            exists: false,
            has_changes: true,
            requires_replace: Vec::new(),
        };
        fresh.object(&schema.attributes, &Path::root(), config, &Value::Null)?
    } else {
        proposed
    };

    debug!(
        action = %action,
        changes = changes.len(),
        requires_replace = requires_replace.len(),
        "Planned resource"
    );

    Ok(ResourcePlan {
        action,
        prior: prior.cloned(),
        config: Some(config.clone()),
        proposed: Some(proposed),
        requires_replace,
        changes,
        diagnostics,
    })
}

/// Configuration overlaid on prior state: computed nulls keep their prior
/// value and optional nulls take their default. Used only to decide whether
/// the resource changes at all.
fn merge_object(
    attributes: &BTreeMap<String, Attribute>,
    config: &Value,
    prior: &Value,
) -> Result<Value, PlanError> {
    if !config.is_known() {
        return Ok(config.clone());
    }
    let mut out = BTreeMap::new();
    for (name, attr) in attributes {
        let c = config.attr(name);
        let p = prior.attr(name);
        let value = if c.is_null() {
            if attr.cardinality.is_computed() && attr.default.is_none() {
                p.clone()
            } else {
                attr.default.clone().unwrap_or(Value::Null)
            }
        } else if let (Some(children), Some(nesting)) = (attr.children(), attr.nesting()) {
            map_elements(nesting, c, p, &Path::root(), |_, c, p| merge_object(children, c, p))?
        } else {
            c.clone()
        };
        out.insert(name.clone(), value);
    }
    Ok(Value::Object(out))
}

struct Proposer {
    exists: bool,
    has_changes: bool,
    requires_replace: Vec<Path>,
}

impl Proposer {
    fn object(
        &mut self,
        attributes: &BTreeMap<String, Attribute>,
        base: &Path,
        config: &Value,
        prior: &Value,
    ) -> Result<Value, PlanError> {
        if !config.is_known() {
            return Ok(config.clone());
        }
        let mut out = BTreeMap::new();
        for (name, attr) in attributes {
            let path = base.attr(name.clone());
            let value = self.attribute(attr, &path, config.attr(name), prior.attr(name))?;
            out.insert(name.clone(), value);
        }
        Ok(Value::Object(out))
    }

    fn attribute(&mut self, attr: &Attribute, path: &Path, config: &Value, prior: &Value) -> Result<Value, PlanError> {
        let ty = attr.attr_type();

        let candidate = if config.is_null() && attr.cardinality.is_computed() && attr.default.is_none() {
            if self.has_changes {
                Value::Unknown
            } else {
                prior.clone()
            }
        } else if let (true, Some(children), Some(nesting)) =
            (config.is_known(), attr.children(), attr.nesting())
        {
            map_elements(nesting, config, prior, path, |path, c, p| self.object(children, path, c, p))?
        } else {
            config.clone()
        };

        let req = ModifierRequest {
            path,
            ty: &ty,
            config,
            prior,
            resource_exists: self.exists,
        };
        let mut resp = ModifierResponse {
            plan_value: candidate,
            requires_replace: false,
        };
        for modifier in &attr.plan_modifiers {
            modifier.modify(&req, &mut resp);
        }
        if resp.requires_replace {
            self.requires_replace.push(path.clone());
        }

        let mut value = resp.plan_value;
        if value.is_null()
            && attr.cardinality.is_optional()
            && let Some(default) = &attr.default
        {
            value = default.clone();
        }

        if !attr.cardinality.is_computed()
            && attr.children().is_none()
            && config.is_known()
            && config.is_fully_known()
            && !equal(config, &value, &ty)
        {
            return Err(PlanError::inconsistent(
                path,
                "planned value does not match the configured value",
            ));
        }
        if attr.cardinality.is_computed() && config.is_null() && prior.is_known() && value.is_null() {
            return Err(PlanError::inconsistent(path, "computed attribute became null"));
        }

        Ok(value)
    }
}

/// Applies `f` to each element of a nested block, pairing configuration
/// elements with their prior counterparts.
fn map_elements<F>(nesting: Nesting, config: &Value, prior: &Value, path: &Path, mut f: F) -> Result<Value, PlanError>
where
    F: FnMut(&Path, &Value, &Value) -> Result<Value, PlanError>,
{
    let null = Value::Null;
    match (nesting, config) {
        (Nesting::Single, _) => f(path, config, prior),
        (Nesting::List, Value::List(items)) => {
            let prior_items = match prior {
                Value::List(items) => items.as_slice(),
                _ => &[],
            };
            let out = items
                .iter()
                .enumerate()
                .map(|(i, item)| f(&path.index(i), item, prior_items.get(i).unwrap_or(&null)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::List(out))
        }
        (Nesting::Set, Value::Set(items)) => {
            let out = items
                .iter()
                .map(|item| f(&path.elem(item), item, matching_set_element(prior, item).unwrap_or(&null)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Set(out))
        }
        (Nesting::Map, Value::Map(entries)) => {
            let prior_entries = prior.as_map();
            let out = entries
                .iter()
                .map(|(key, item)| {
                    let p = prior_entries.and_then(|m| m.get(key)).unwrap_or(&null);
                    f(&path.key(key.clone()), item, p).map(|v| (key.clone(), v))
                })
                .collect::<Result<BTreeMap<_, _>, _>>()?;
            Ok(Value::Map(out))
        }
        _ => Ok(config.clone()),
    }
}

/// Finds the prior set element agreeing with `element` on every attribute
/// the configuration sets.
fn matching_set_element<'a>(prior: &'a Value, element: &Value) -> Option<&'a Value> {
    let Value::Set(items) = prior else {
        return None;
    };
    let fields = element.as_object()?;
    items.iter().find(|candidate| {
        fields
            .iter()
            .filter(|(_, v)| v.is_known())
            .all(|(name, v)| candidate.attr(name) == v)
    })
}
