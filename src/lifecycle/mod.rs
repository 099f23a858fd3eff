//! Reconciliation lifecycle.
//!
//! Resource types implement [`ResourceHandler`]; the [`Lifecycle`] driver
//! calls handlers and enforces the rules every resource type shares.

mod driver;
mod handler;
mod import;
#[cfg(test)]
pub(crate) mod testing;

pub use driver::{ApplyResult, ImportedResource, Lifecycle, Operation};
pub use handler::{OpContext, ReadOutcome, ResourceHandler, StateWriter, UpdateOutcome};
pub use import::ImportFormat;
