//! State persistence and migration.
//!
//! This module provides the JSON state file that records every managed
//! instance, and the migration pipeline that upgrades values written with
//! older schema versions.

mod local;
mod migrate;
mod store;
mod types;

pub use local::LocalStateStore;
pub use migrate::{
    list_to_object, upgrade_attribute_list_to_object, upgrade_document, upgrade_state, StateUpgrader, UpgradeFn,
};
pub use store::{LoadedState, StateStore};
pub use types::{HistoryEntry, HistoryOperation, InstanceState, StateDocument, STATE_FORMAT_VERSION};
