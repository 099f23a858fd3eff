//! Schema registry.
//!
//! A [`Schema`] is a versioned tree of [`Attribute`]s describing one
//! resource type. The [`Registry`] holds every registered resource type with
//! its current schema, the prior schema versions needed for state
//! migration, and the lifecycle handler that talks to the remote system.

mod attribute;
mod registry;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::PlanError;
use crate::value::{AttrType, Path, PathStep, Value};

pub use attribute::{object_type, Attribute, AttributeKind, Cardinality, Nesting};
pub use registry::{ParentRef, Registry, ResourceType, ResourceTypeDump};

/// A versioned resource schema.
#[derive(Debug, Clone)]
pub struct Schema {
    /// Monotonically increasing schema version.
    pub version: u64,
    /// User-facing description of the resource.
    pub description: String,
    /// Top-level attributes.
    pub attributes: BTreeMap<String, Attribute>,
}

impl Schema {
    /// Creates a schema from `(name, attribute)` pairs.
    #[must_use]
    pub fn new<'a, I>(version: u64, description: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Attribute)>,
    {
        Self {
            version,
            description: description.into(),
            attributes: attributes
                .into_iter()
                .map(|(name, attr)| (name.to_string(), attr))
                .collect(),
        }
    }

    /// Returns the object type of the resource value.
    #[must_use]
    pub fn object_type(&self) -> AttrType {
        object_type(&self.attributes)
    }

    /// Returns the attribute declared at `path`, walking through nested
    /// blocks and their collection elements.
    #[must_use]
    pub fn attribute_at(&self, path: &Path) -> Option<&Attribute> {
        let mut attrs = &self.attributes;
        let mut current: Option<&Attribute> = None;
        for step in path.steps() {
            match step {
                PathStep::Attr(name) => {
                    let attr = attrs.get(name)?;
                    if let Some(children) = attr.children() {
                        attrs = children;
                    }
                    current = Some(attr);
                }
                // Element steps stay on the nested block itself.
                PathStep::Index(_) | PathStep::Key(_) | PathStep::Elem(_) => {
                    current?;
                }
            }
        }
        current
    }

    /// Returns true if the attribute at `path` or any ancestor is sensitive.
    #[must_use]
    pub fn is_sensitive(&self, path: &Path) -> bool {
        let mut attrs = &self.attributes;
        for step in path.steps() {
            if let PathStep::Attr(name) = step {
                let Some(attr) = attrs.get(name) else {
                    return false;
                };
                if attr.sensitive {
                    return true;
                }
                match attr.children() {
                    Some(children) => attrs = children,
                    None => return false,
                }
            }
        }
        false
    }

    /// Checks the schema for declaration mistakes.
    ///
    /// Required attributes may not carry defaults, computed-only attributes
    /// may not carry validators, defaults must conform to their type, nested
    /// blocks must declare children consistent with their own cardinality,
    /// and trigger attributes must be optional string maps.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::InvalidSchema`] describing the first problem.
    pub fn validate_internal(&self, resource_type: &str) -> Result<(), PlanError> {
        check_attributes(resource_type, &Path::root(), &self.attributes, None)
    }

    /// Builds the serialisable dump used by `get_schema`.
    #[must_use]
    pub fn dump(&self) -> SchemaDump {
        SchemaDump {
            version: self.version,
            description: self.description.clone(),
            attributes: dump_attributes(&self.attributes),
        }
    }
}

fn check_attributes(
    resource_type: &str,
    base: &Path,
    attributes: &BTreeMap<String, Attribute>,
    parent: Option<Cardinality>,
) -> Result<(), PlanError> {
    let invalid = |path: &Path, message: &str| PlanError::InvalidSchema {
        resource_type: resource_type.to_string(),
        message: format!("{path}: {message}"),
    };

    for (name, attr) in attributes {
        let path = base.attr(name.clone());

        if attr.cardinality.is_required() && attr.default.is_some() {
            return Err(invalid(&path, "required attributes may not declare a default"));
        }
        if attr.cardinality == Cardinality::Computed && !attr.validators.is_empty() {
            return Err(invalid(&path, "computed-only attributes may not carry validators"));
        }
        if let Some(default) = &attr.default
            && !conforms(default, &attr.attr_type())
        {
            return Err(invalid(&path, "default value does not match the attribute type"));
        }
        if parent == Some(Cardinality::Computed) && attr.cardinality != Cardinality::Computed {
            return Err(invalid(&path, "children of a computed block must be computed"));
        }
        if attr.trigger
            && (attr.attr_type() != AttrType::map(AttrType::String) || !attr.cardinality.is_optional())
        {
            return Err(invalid(&path, "trigger attributes must be optional map<string,string>"));
        }

        if let Some(children) = attr.children() {
            if children.is_empty() {
                return Err(invalid(&path, "nested blocks must declare at least one attribute"));
            }
            if attr.cardinality.is_required()
                && children.values().all(|c| c.cardinality == Cardinality::Computed)
            {
                return Err(invalid(&path, "a required block needs a configurable attribute"));
            }
            check_attributes(resource_type, &path, children, Some(attr.cardinality))?;
        }
    }
    Ok(())
}

/// Returns true if `value` is a legal value of type `ty`.
#[must_use]
pub fn conforms(value: &Value, ty: &AttrType) -> bool {
    match (value, ty) {
        (Value::Null | Value::Unknown, _)
        | (Value::String(_), AttrType::String | AttrType::ResourceId | AttrType::Json)
        | (Value::Bool(_), AttrType::Bool)
        | (Value::Int32(_), AttrType::Int32)
        | (Value::Int64(_), AttrType::Int64)
        | (Value::Float64(_), AttrType::Float64)
        | (Value::Number(_), AttrType::Number) => true,
        (Value::List(items), AttrType::List(elem)) | (Value::Set(items), AttrType::Set(elem)) => {
            items.iter().all(|item| conforms(item, elem))
        }
        (Value::Map(entries), AttrType::Map(elem)) => entries.values().all(|v| conforms(v, elem)),
        (Value::Object(fields), AttrType::Object(types)) => fields
            .iter()
            .all(|(name, v)| types.get(name).is_some_and(|t| conforms(v, t))),
        _ => false,
    }
}

/// Serialisable description of a schema.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaDump {
    /// Schema version.
    pub version: u64,
    /// Resource description.
    pub description: String,
    /// Attribute descriptions keyed by name.
    pub attributes: BTreeMap<String, AttributeDump>,
}

/// Serialisable description of one attribute.
#[derive(Debug, Clone, Serialize)]
pub struct AttributeDump {
    /// Value type.
    #[serde(rename = "type")]
    pub ty: String,
    /// Cardinality.
    pub cardinality: Cardinality,
    /// Nesting mode for nested blocks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nesting: Option<Nesting>,
    /// Sensitivity.
    pub sensitive: bool,
    /// Description.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Default value in JSON wire form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Validator descriptions.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validators: Vec<String>,
    /// Plan modifier descriptions.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plan_modifiers: Vec<String>,
    /// Nested attributes.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttributeDump>,
}

fn dump_attributes(attributes: &BTreeMap<String, Attribute>) -> BTreeMap<String, AttributeDump> {
    attributes
        .iter()
        .map(|(name, attr)| {
            (
                name.clone(),
                AttributeDump {
                    ty: attr.attr_type().to_string(),
                    cardinality: attr.cardinality,
                    nesting: attr.nesting(),
                    sensitive: attr.sensitive,
                    description: attr.description.clone(),
                    default: attr.default.as_ref().map(Value::to_json),
                    validators: attr.validators.iter().map(|v| v.description()).collect(),
                    plan_modifiers: attr.plan_modifiers.iter().map(|m| m.description()).collect(),
                    attributes: attr.children().map(dump_attributes).unwrap_or_default(),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::not_contain;

    fn sample() -> Schema {
        Schema::new(
            1,
            "sample",
            [
                ("name", Attribute::required(AttrType::String)),
                (
                    "credentials",
                    Attribute::nested(
                        Nesting::Single,
                        Cardinality::Optional,
                        [
                            ("client_id", Attribute::optional(AttrType::String)),
                            ("client_secret", Attribute::optional(AttrType::String).sensitive()),
                        ],
                    ),
                ),
                ("secret", Attribute::computed(AttrType::String).sensitive()),
            ],
        )
    }

    #[test]
    fn test_valid_schema_passes() {
        assert!(sample().validate_internal("sample").is_ok());
    }

    #[test]
    fn test_required_with_default_rejected() {
        let schema = Schema::new(
            0,
            "",
            [("name", Attribute::required(AttrType::String).default_value(Value::string("x")))],
        );
        assert!(matches!(
            schema.validate_internal("bad"),
            Err(PlanError::InvalidSchema { .. })
        ));
    }

    #[test]
    fn test_computed_with_validator_rejected() {
        let schema = Schema::new(
            0,
            "",
            [("id", Attribute::computed(AttrType::String).validator(not_contain(&["x"])))],
        );
        assert!(schema.validate_internal("bad").is_err());
    }

    #[test]
    fn test_mistyped_default_rejected() {
        let schema = Schema::new(
            0,
            "",
            [("enabled", Attribute::optional(AttrType::Bool).default_value(Value::string("yes")))],
        );
        assert!(schema.validate_internal("bad").is_err());
    }

    #[test]
    fn test_computed_block_children_must_be_computed() {
        let schema = Schema::new(
            0,
            "",
            [(
                "status",
                Attribute::nested(
                    Nesting::Single,
                    Cardinality::Computed,
                    [("phase", Attribute::optional(AttrType::String))],
                ),
            )],
        );
        assert!(schema.validate_internal("bad").is_err());
    }

    #[test]
    fn test_sensitivity_propagates_from_ancestors() {
        let schema = sample();
        assert!(schema.is_sensitive(&Path::from_attrs(&["credentials", "client_secret"])));
        assert!(!schema.is_sensitive(&Path::from_attrs(&["credentials", "client_id"])));
        assert!(schema.is_sensitive(&Path::from_attrs(&["secret"])));
    }

    #[test]
    fn test_attribute_at() {
        let schema = sample();
        let attr = schema
            .attribute_at(&Path::from_attrs(&["credentials", "client_id"]))
            .expect("attribute");
        assert_eq!(attr.cardinality, Cardinality::Optional);
        assert!(schema.attribute_at(&Path::from_attrs(&["nope"])).is_none());
    }

    #[test]
    fn test_dump_lists_nested_attributes() {
        let dump = sample().dump();
        let credentials = &dump.attributes["credentials"];
        assert_eq!(credentials.nesting, Some(Nesting::Single));
        assert!(credentials.attributes["client_secret"].sensitive);
    }
}
