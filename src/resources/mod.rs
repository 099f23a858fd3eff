//! Built-in PingOne resource types.
//!
//! - `pingone_environment`: type-change endpoint, region forces replacement
//! - `pingone_population`: child of an environment, two schema migrations
//! - `pingone_agreement`: created by name, then configured
//! - `pingone_resource_secret`: rotated by trigger values

mod agreement;
mod common;
mod environment;
mod population;
mod resource_secret;

use std::sync::Arc;

use crate::error::PlanError;
use crate::lifecycle::ImportFormat;
use crate::schema::{Registry, ResourceType};

pub use agreement::AgreementHandler;
pub use environment::EnvironmentHandler;
pub use population::PopulationHandler;
pub use resource_secret::ResourceSecretHandler;

/// Registers every built-in resource type.
///
/// # Errors
///
/// Returns [`PlanError::InvalidSchema`] if a built-in declaration is
/// malformed.
pub fn default_registry() -> Result<Registry, PlanError> {
    let mut registry = Registry::new();

    registry.register(
        ResourceType::new(environment::NAME, environment::schema(), Arc::new(EnvironmentHandler))
            .import_format(ImportFormat::new(&["id"])),
    )?;

    let mut population = ResourceType::new(population::NAME, population::schema(), Arc::new(PopulationHandler))
        .parent(population::parent())
        .import_format(population::import_format());
    for upgrader in population::upgraders() {
        population = population.upgrader(upgrader);
    }
    registry.register(population)?;

    registry.register(
        ResourceType::new(agreement::NAME, agreement::schema(), Arc::new(AgreementHandler))
            .parent(agreement::parent())
            .import_format(agreement::import_format()),
    )?;

    registry.register(
        ResourceType::new(
            resource_secret::NAME,
            resource_secret::schema(),
            Arc::new(ResourceSecretHandler),
        )
        .parent(resource_secret::parent())
        .import_format(resource_secret::import_format()),
    )?;

    Ok(registry)
}
