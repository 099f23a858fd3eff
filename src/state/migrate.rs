//! State migration.
//!
//! Each resource type carries a chain of upgraders, one per schema version
//! step. Upgrading is a pure pipeline: the prior value is parsed against the
//! schema it was written with, passed through every step up to the current
//! version, and checked against the current schema.

use std::fmt;

use tracing::{debug, warn};

use crate::error::{ProviderError, StateError};
use crate::schema::{conforms, Registry, Schema};
use crate::value::{parse_strict, Value};

use super::types::{HistoryEntry, HistoryOperation, InstanceState, StateDocument};

use serde_json::Value as JsonValue;

/// Pure upgrade function for one version step.
pub type UpgradeFn = fn(&Value) -> Result<Value, String>;

/// Upgrades state written with `prior_schema` to the next version.
#[derive(Clone)]
pub struct StateUpgrader {
    /// Schema the input value was written with.
    pub prior_schema: Schema,
    /// The step itself.
    pub upgrade: UpgradeFn,
}

impl fmt::Debug for StateUpgrader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateUpgrader")
            .field("from", &self.prior_schema.version)
            .finish_non_exhaustive()
    }
}

impl StateUpgrader {
    /// Creates an upgrader from `prior_schema.version` to the next version.
    #[must_use]
    pub const fn new(prior_schema: Schema, upgrade: UpgradeFn) -> Self {
        Self { prior_schema, upgrade }
    }

    /// Version this step upgrades from.
    #[must_use]
    pub const fn from_version(&self) -> u64 {
        self.prior_schema.version
    }
}

/// Upgrades `raw`, written at `version`, to the current schema.
///
/// # Errors
///
/// - [`StateError::FutureVersion`] if `version` is newer than `current`.
/// - [`StateError::MissingUpgrader`] if a step in the chain is missing.
/// - [`StateError::Corrupted`] if `raw` does not parse against its schema.
/// - [`StateError::UpgradeFailed`] if a step rejects its input or produces
///   a value that does not match the next schema.
pub fn upgrade_state(
    resource_type: &str,
    current: &Schema,
    upgraders: &[StateUpgrader],
    version: u64,
    raw: &JsonValue,
) -> Result<Value, StateError> {
    if version > current.version {
        return Err(StateError::FutureVersion {
            resource_type: resource_type.to_string(),
            found: version,
            current: current.version,
        });
    }

    let schema_at = |v: u64| -> Result<&Schema, StateError> {
        if v == current.version {
            return Ok(current);
        }
        upgraders
            .iter()
            .find(|u| u.from_version() == v)
            .map(|u| &u.prior_schema)
            .ok_or_else(|| StateError::MissingUpgrader {
                resource_type: resource_type.to_string(),
                from: v,
                to: v + 1,
            })
    };

    let mut value = parse_strict(raw, &schema_at(version)?.object_type()).map_err(|e| {
        StateError::corrupted(format!("{resource_type} state at schema version {version}: {e}"))
    })?;

    for from in version..current.version {
        let step = upgraders
            .iter()
            .find(|u| u.from_version() == from)
            .ok_or_else(|| StateError::MissingUpgrader {
                resource_type: resource_type.to_string(),
                from,
                to: from + 1,
            })?;
        value = (step.upgrade)(&value).map_err(|message| StateError::UpgradeFailed {
            resource_type: resource_type.to_string(),
            from,
            message,
        })?;
        let next = schema_at(from + 1)?;
        if !conforms(&value, &next.object_type()) {
            return Err(StateError::UpgradeFailed {
                resource_type: resource_type.to_string(),
                from,
                message: format!("result does not match schema version {}", from + 1),
            });
        }
        debug!(resource_type, from, to = from + 1, "Upgraded state");
    }

    Ok(value)
}

/// Brings every instance of `state` to the current schema version of its
/// resource type and returns the addresses that changed.
///
/// Instances already at the current version are still parsed, so a
/// document that loads cleanly is one every later operation can decode.
/// Nothing is written unless every instance upgrades.
///
/// # Errors
///
/// Returns the error of the first instance whose resource type is unknown
/// or whose value cannot be upgraded.
pub fn upgrade_document(registry: &Registry, state: &mut StateDocument) -> Result<Vec<String>, ProviderError> {
    let mut upgraded = Vec::new();
    for (address, instance) in &state.resources {
        let rt = registry.get(&instance.resource_type)?;
        let value = upgrade_state(
            &instance.resource_type,
            &rt.schema,
            &rt.upgraders,
            instance.schema_version,
            &instance.value,
        )
        .inspect_err(|e| warn!(address = %address, error = %e, "State cannot be upgraded"))?;
        if instance.schema_version != rt.schema.version {
            let mut next = InstanceState::new(&instance.resource_type, rt.schema.version, &value)
                .with_dependencies(instance.depends_on.clone());
            next.updated_at = instance.updated_at;
            upgraded.push((address.clone(), next));
        }
    }

    let addresses: Vec<String> = upgraded.iter().map(|(a, _)| a.clone()).collect();
    for (address, instance) in upgraded {
        state.set(address, instance);
    }
    if !addresses.is_empty() {
        debug!(count = addresses.len(), "Upgraded state document");
        state.add_history(HistoryEntry::new(HistoryOperation::Upgrade, addresses.clone()));
    }
    Ok(addresses)
}

/// Converts a legacy single-element list into its element.
///
/// Null and unknown pass through, an empty list becomes null, and a list
/// with more than one element is rejected.
///
/// # Errors
///
/// Returns a message if the value is not a list of at most one element.
pub fn list_to_object(value: &Value) -> Result<Value, String> {
    match value {
        Value::Null | Value::Unknown => Ok(value.clone()),
        Value::List(items) => match items.as_slice() {
            [] => Ok(Value::Null),
            [single] => Ok(single.clone()),
            _ => Err(format!("expected at most one element, found {}", items.len())),
        },
        other => Err(format!("expected a list, found {}", other.kind_name())),
    }
}

/// Applies [`list_to_object`] to the attribute `name` of an object value.
///
/// # Errors
///
/// Propagates the error of [`list_to_object`].
pub fn upgrade_attribute_list_to_object(value: &Value, name: &str) -> Result<Value, String> {
    let mut out = value.clone();
    let converted = list_to_object(value.attr(name)).map_err(|e| format!("{name}: {e}"))?;
    out.set_attr(name, converted);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, Cardinality, Nesting};
    use crate::value::AttrType;
    use serde_json::json;

    fn v0() -> Schema {
        Schema::new(
            0,
            "",
            [
                ("name", Attribute::required(AttrType::String)),
                ("image", Attribute::optional(AttrType::String)),
            ],
        )
    }

    fn image_block(nesting: Nesting) -> Attribute {
        Attribute::nested(nesting, Cardinality::Optional, [("href", Attribute::optional(AttrType::String))])
    }

    fn v1() -> Schema {
        Schema::new(1, "", [("name", Attribute::required(AttrType::String)), ("image", image_block(Nesting::List))])
    }

    fn v2() -> Schema {
        Schema::new(2, "", [("name", Attribute::required(AttrType::String)), ("image", image_block(Nesting::Single))])
    }

    fn v0_to_v1(value: &Value) -> Result<Value, String> {
        let mut out = value.clone();
        let image = match value.attr("image") {
            Value::Null => Value::List(Vec::new()),
            Value::String(href) => Value::List(vec![Value::object([("href", Value::string(href.clone()))])]),
            other => return Err(format!("unexpected image {}", other.kind_name())),
        };
        out.set_attr("image", image);
        Ok(out)
    }

    fn v1_to_v2(value: &Value) -> Result<Value, String> {
        upgrade_attribute_list_to_object(value, "image")
    }

    fn chain() -> Vec<StateUpgrader> {
        vec![StateUpgrader::new(v0(), v0_to_v1), StateUpgrader::new(v1(), v1_to_v2)]
    }

    #[test]
    fn test_list_to_object() {
        assert_eq!(list_to_object(&Value::Null), Ok(Value::Null));
        assert_eq!(list_to_object(&Value::Unknown), Ok(Value::Unknown));
        assert_eq!(list_to_object(&Value::List(Vec::new())), Ok(Value::Null));
        assert_eq!(
            list_to_object(&Value::List(vec![Value::string("a")])),
            Ok(Value::string("a"))
        );
        assert!(list_to_object(&Value::List(vec![Value::string("a"), Value::string("b")])).is_err());
    }

    #[test]
    fn test_direct_and_stepwise_migration_agree() {
        let raw = json!({"name": "x", "image": "https://img/1.png"});
        let direct = upgrade_state("sample", &v2(), &chain(), 0, &raw).unwrap();

        let step_one = upgrade_state("sample", &v1(), &chain()[..1], 0, &raw).unwrap();
        let stepwise = upgrade_state("sample", &v2(), &chain(), 1, &step_one.to_json()).unwrap();

        assert_eq!(direct, stepwise);
        assert_eq!(
            direct.attr("image"),
            &Value::object([("href", Value::string("https://img/1.png"))])
        );
    }

    #[test]
    fn test_current_version_passes_through() {
        let raw = json!({"name": "x", "image": null});
        let value = upgrade_state("sample", &v2(), &chain(), 2, &raw).unwrap();
        assert!(value.attr("image").is_null());
    }

    #[test]
    fn test_missing_step() {
        let raw = json!({"name": "x", "image": null});
        let err = upgrade_state("sample", &v2(), &chain()[1..], 0, &raw).unwrap_err();
        assert!(matches!(err, StateError::MissingUpgrader { from: 0, to: 1, .. }));
    }

    #[test]
    fn test_future_version() {
        let err = upgrade_state("sample", &v2(), &chain(), 3, &json!({})).unwrap_err();
        assert!(matches!(err, StateError::FutureVersion { found: 3, current: 2, .. }));
    }

    #[test]
    fn test_failing_step() {
        let raw = json!({"name": "x", "image": [{"href": "a"}, {"href": "b"}]});
        let err = upgrade_state("sample", &v2(), &chain(), 1, &raw).unwrap_err();
        assert!(matches!(err, StateError::UpgradeFailed { from: 1, .. }));
    }
}
