//! Resource type registry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::error::PlanError;
use crate::lifecycle::{ImportFormat, ResourceHandler};
use crate::state::StateUpgrader;

use super::{Schema, SchemaDump};

/// Link from a child resource to the resource it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentRef {
    /// Child attribute holding the parent's identifier.
    pub attribute: String,
    /// Resource type of the parent.
    pub resource_type: String,
}

impl ParentRef {
    /// Creates a parent reference.
    #[must_use]
    pub fn new(attribute: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            resource_type: resource_type.into(),
        }
    }
}

/// A registered resource type.
#[derive(Clone)]
pub struct ResourceType {
    /// Type name, e.g. `pingone_population`.
    pub name: String,
    /// Current schema.
    pub schema: Schema,
    /// Upgraders from every prior schema version.
    pub upgraders: Vec<StateUpgrader>,
    /// Lifecycle handler.
    pub handler: Arc<dyn ResourceHandler>,
    /// Parent whose existence is checked on read.
    pub parent: Option<ParentRef>,
    /// Import identifier format.
    pub import_format: ImportFormat,
}

impl fmt::Debug for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceType")
            .field("name", &self.name)
            .field("version", &self.schema.version)
            .field("upgraders", &self.upgraders.len())
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

impl ResourceType {
    /// Creates a resource type imported by its own identifier.
    #[must_use]
    pub fn new(name: impl Into<String>, schema: Schema, handler: Arc<dyn ResourceHandler>) -> Self {
        Self {
            name: name.into(),
            schema,
            upgraders: Vec::new(),
            handler,
            parent: None,
            import_format: ImportFormat::new(&["id"]),
        }
    }

    /// Declares the parent of this type.
    #[must_use]
    pub fn parent(mut self, parent: ParentRef) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Adds an upgrader step.
    #[must_use]
    pub fn upgrader(mut self, upgrader: StateUpgrader) -> Self {
        self.upgraders.push(upgrader);
        self
    }

    /// Sets the import identifier format.
    #[must_use]
    pub fn import_format(mut self, format: ImportFormat) -> Self {
        self.import_format = format;
        self
    }
}

/// Every registered resource type, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    types: BTreeMap<String, ResourceType>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `resource`, validating its schemas.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::InvalidSchema`] if a schema is malformed, the
    /// upgrader chain does not cover every prior version, or the name is
    /// already registered.
    pub fn register(&mut self, resource: ResourceType) -> Result<(), PlanError> {
        let invalid = |message: String| PlanError::InvalidSchema {
            resource_type: resource.name.clone(),
            message,
        };

        if self.types.contains_key(&resource.name) {
            return Err(invalid(String::from("resource type is already registered")));
        }
        resource.schema.validate_internal(&resource.name)?;
        for version in 0..resource.schema.version {
            let step = resource
                .upgraders
                .iter()
                .find(|u| u.from_version() == version)
                .ok_or_else(|| invalid(format!("no upgrader from schema version {version}")))?;
            step.prior_schema.validate_internal(&resource.name)?;
        }
        if let Some(parent) = &resource.parent
            && !resource.schema.attributes.contains_key(&parent.attribute)
        {
            return Err(invalid(format!("parent attribute '{}' is not declared", parent.attribute)));
        }
        for segment in resource.import_format.segments() {
            if !resource.schema.attributes.contains_key(segment) {
                return Err(invalid(format!("import segment '{segment}' is not an attribute")));
            }
        }

        debug!(
            resource_type = %resource.name,
            version = resource.schema.version,
            "Registered resource type"
        );
        self.types.insert(resource.name.clone(), resource);
        Ok(())
    }

    /// Looks up a resource type.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::UnknownResourceType`] if `name` is not registered.
    pub fn get(&self, name: &str) -> Result<&ResourceType, PlanError> {
        self.types.get(name).ok_or_else(|| PlanError::UnknownResourceType {
            resource_type: name.to_string(),
        })
    }

    /// Iterates over registered types in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceType> {
        self.types.values()
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Serialisable dump of every registered type.
    #[must_use]
    pub fn dump(&self) -> BTreeMap<String, ResourceTypeDump> {
        self.types
            .iter()
            .map(|(name, rt)| {
                (
                    name.clone(),
                    ResourceTypeDump {
                        schema: rt.schema.dump(),
                        prior_versions: rt.upgraders.iter().map(StateUpgrader::from_version).collect(),
                        parent: rt.parent.clone(),
                        import_format: rt.import_format.to_string(),
                    },
                )
            })
            .collect()
    }
}

/// Serialisable description of one resource type.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceTypeDump {
    /// Current schema.
    pub schema: SchemaDump,
    /// Prior schema versions that can be upgraded.
    pub prior_versions: Vec<u64>,
    /// Parent, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentRef>,
    /// Import identifier format.
    pub import_format: String,
}
