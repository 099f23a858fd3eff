//! Attribute declarations.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::planner::PlanModifier;
use crate::validators::AttributeValidator;
use crate::value::{AttrType, Value};

/// Whether configuration, the remote system, or both supply a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// Must be configured.
    Required,
    /// May be configured; null otherwise.
    Optional,
    /// Chosen by the remote system; never configured.
    Computed,
    /// May be configured; chosen by the remote system otherwise.
    OptionalComputed,
}

impl Cardinality {
    /// Returns true if configuration must set the attribute.
    #[must_use]
    pub const fn is_required(self) -> bool {
        matches!(self, Self::Required)
    }

    /// Returns true if configuration may leave the attribute null.
    #[must_use]
    pub const fn is_optional(self) -> bool {
        matches!(self, Self::Optional | Self::OptionalComputed)
    }

    /// Returns true if the remote system may choose the value.
    #[must_use]
    pub const fn is_computed(self) -> bool {
        matches!(self, Self::Computed | Self::OptionalComputed)
    }

    /// Returns true if configuration may set the attribute at all.
    #[must_use]
    pub const fn is_configurable(self) -> bool {
        !matches!(self, Self::Computed)
    }
}

/// Aggregation mode of a nested block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Nesting {
    /// Exactly one nested object.
    Single,
    /// Ordered list of nested objects.
    List,
    /// Set of nested objects.
    Set,
    /// String-keyed map of nested objects.
    Map,
}

/// Primitive or nested attribute kind.
#[derive(Debug, Clone)]
pub enum AttributeKind {
    /// A leaf of the given type.
    Primitive(AttrType),
    /// A nested block with its own attributes.
    Nested {
        /// Aggregation mode.
        nesting: Nesting,
        /// Child attributes.
        attributes: BTreeMap<String, Attribute>,
    },
}

/// A node of a resource schema.
#[derive(Debug, Clone)]
pub struct Attribute {
    /// Kind of the attribute.
    pub kind: AttributeKind,
    /// Required / optional / computed.
    pub cardinality: Cardinality,
    /// Values must never appear in diagnostics or logs.
    pub sensitive: bool,
    /// User-facing description.
    pub description: String,
    /// Substituted when configuration leaves the attribute null.
    pub default: Option<Value>,
    /// Validators run at plan time.
    pub validators: Vec<Arc<dyn AttributeValidator>>,
    /// Plan modifiers run in declaration order.
    pub plan_modifiers: Vec<Arc<dyn PlanModifier>>,
    /// Opaque rotation trigger: never read back from the remote system.
    pub trigger: bool,
}

impl Attribute {
    fn new(kind: AttributeKind, cardinality: Cardinality) -> Self {
        Self {
            kind,
            cardinality,
            sensitive: false,
            description: String::new(),
            default: None,
            validators: Vec::new(),
            plan_modifiers: Vec::new(),
            trigger: false,
        }
    }

    /// A required primitive attribute.
    #[must_use]
    pub fn required(ty: AttrType) -> Self {
        Self::new(AttributeKind::Primitive(ty), Cardinality::Required)
    }

    /// An optional primitive attribute.
    #[must_use]
    pub fn optional(ty: AttrType) -> Self {
        Self::new(AttributeKind::Primitive(ty), Cardinality::Optional)
    }

    /// A computed primitive attribute.
    #[must_use]
    pub fn computed(ty: AttrType) -> Self {
        Self::new(AttributeKind::Primitive(ty), Cardinality::Computed)
    }

    /// An optional and computed primitive attribute.
    #[must_use]
    pub fn optional_computed(ty: AttrType) -> Self {
        Self::new(AttributeKind::Primitive(ty), Cardinality::OptionalComputed)
    }

    /// A nested block.
    #[must_use]
    pub fn nested<'a, I>(nesting: Nesting, cardinality: Cardinality, attributes: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Self)>,
    {
        Self::new(
            AttributeKind::Nested {
                nesting,
                attributes: attributes
                    .into_iter()
                    .map(|(name, attr)| (name.to_string(), attr))
                    .collect(),
            },
            cardinality,
        )
    }

    /// Marks the attribute sensitive.
    #[must_use]
    pub const fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declares a default value.
    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Attaches a validator.
    #[must_use]
    pub fn validator(mut self, validator: impl AttributeValidator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Attaches a plan modifier.
    #[must_use]
    pub fn modifier(mut self, modifier: impl PlanModifier + 'static) -> Self {
        self.plan_modifiers.push(Arc::new(modifier));
        self
    }

    /// Marks the attribute as a rotation trigger map.
    #[must_use]
    pub const fn trigger(mut self) -> Self {
        self.trigger = true;
        self
    }

    /// Returns the value type of this attribute.
    #[must_use]
    pub fn attr_type(&self) -> AttrType {
        match &self.kind {
            AttributeKind::Primitive(ty) => ty.clone(),
            AttributeKind::Nested { nesting, attributes } => {
                let object = object_type(attributes);
                match nesting {
                    Nesting::Single => object,
                    Nesting::List => AttrType::list(object),
                    Nesting::Set => AttrType::set(object),
                    Nesting::Map => AttrType::map(object),
                }
            }
        }
    }

    /// Returns the child attributes of a nested block.
    #[must_use]
    pub const fn children(&self) -> Option<&BTreeMap<String, Self>> {
        match &self.kind {
            AttributeKind::Nested { attributes, .. } => Some(attributes),
            AttributeKind::Primitive(_) => None,
        }
    }

    /// Returns the nesting mode of a nested block.
    #[must_use]
    pub const fn nesting(&self) -> Option<Nesting> {
        match &self.kind {
            AttributeKind::Nested { nesting, .. } => Some(*nesting),
            AttributeKind::Primitive(_) => None,
        }
    }
}

/// Builds the object type of a set of attributes.
#[must_use]
pub fn object_type(attributes: &BTreeMap<String, Attribute>) -> AttrType {
    AttrType::Object(
        attributes
            .iter()
            .map(|(name, attr)| (name.clone(), attr.attr_type()))
            .collect(),
    )
}
