// ============================================================================
// Linting - unsafe is forbidden; everything else surfaces as warnings
// ============================================================================

#![warn(missing_docs)]                // All public items must be documented
#![warn(non_camel_case_types)]        // Types must follow CamelCase convention
#![warn(unused_must_use)]             // Must handle Result and Option explicitly
#![warn(nonstandard_style)]           // Non-standard code style
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// ============================================================================
// Crate Documentation
// ============================================================================

//! # PingOne Reconcile
//!
//! A declarative reconciliation engine for PingOne resources.
//!
//! ## Overview
//!
//! Given the desired configuration of a resource instance and its prior
//! observed state, the engine:
//!
//! - Validates the configuration against a typed schema with cross-field rules
//! - Proposes the next state and decides between no-op, create, update,
//!   replace and destroy
//! - Drives the create, read, update, delete and import calls against the
//!   PingOne management API, keeping state consistent across partial failures
//! - Upgrades state persisted under older schema versions
//!
//! ## Architecture
//!
//! 1. **Configuration**: a JSON tree per resource instance
//! 2. **Prior state**: the last observed value, with its schema version
//! 3. **Reconciler**: plans the difference and executes it through
//!    per-resource handlers
//!
//! ## Modules
//!
//! - [`value`]: Null / unknown / known value model and paths
//! - [`schema`]: Attribute declarations and the resource type registry
//! - [`validators`]: Attribute and cross-attribute validators
//! - [`client`]: Authenticated, retrying PingOne HTTP client
//! - [`planner`]: Proposal, diff and change-set execution
//! - [`lifecycle`]: Handler contract and the driver that enforces it
//! - [`state`]: State document, storage and schema-version upgrades
//! - [`resources`]: Built-in PingOne resource types
//! - [`reconciler`]: Orchestrator-facing entry points
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```json
//! {
//!   "resources": {
//!     "pingone_environment.dev": {
//!       "config": { "name": "dev", "region": "NA", "license_id": "..." }
//!     },
//!     "pingone_population.staff": {
//!       "depends_on": ["pingone_environment.dev"],
//!       "config": { "environment_id": "...", "name": "Staff" }
//!     }
//!   }
//! }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod client;
pub mod config;
pub mod diag;
pub mod error;
pub mod lifecycle;
pub mod planner;
pub mod reconciler;
pub mod resources;
pub mod schema;
pub mod state;
pub mod validators;
pub mod value;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use client::{ApiClient, ClientOptions};
pub use config::ProviderSettings;
pub use diag::{Diagnostic, Diagnostics, Severity};
pub use error::{ProviderError, Result};
pub use planner::{Action, ChangeSet, PlanExecutor, ResourcePlan};
pub use reconciler::{ConfigDocument, Reconciler};
pub use resources::default_registry;
pub use schema::{Registry, Schema};
pub use state::{LocalStateStore, StateDocument, StateStore};
pub use value::Value;
