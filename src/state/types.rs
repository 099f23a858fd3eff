//! Persisted state types.
//!
//! A state document maps instance addresses to the last observed state of
//! each resource instance. Values are stored in JSON wire form together with
//! the schema version they were written with, so loading can migrate them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::value::Value;

/// Current version of the state document format.
pub const STATE_FORMAT_VERSION: &str = "1.0";

/// Number of history entries kept.
const MAX_HISTORY: usize = 100;

/// The whole persisted state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDocument {
    /// Document format version.
    pub version: String,
    /// Incremented on every save.
    #[serde(default)]
    pub serial: u64,
    /// When the document was last changed.
    pub last_updated: DateTime<Utc>,
    /// Instances keyed by address.
    #[serde(default)]
    pub resources: BTreeMap<String, InstanceState>,
    /// Recent operations.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// Persisted state of one resource instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceState {
    /// Resource type name.
    pub resource_type: String,
    /// Schema version `value` conforms to.
    pub schema_version: u64,
    /// Remote identifier, kept alongside the attribute values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    /// Addresses this instance depends on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Attribute values in JSON wire form.
    pub value: JsonValue,
    /// When the instance was last written.
    pub updated_at: DateTime<Utc>,
}

impl InstanceState {
    /// Wraps a typed value written with `schema_version`.
    #[must_use]
    pub fn new(resource_type: impl Into<String>, schema_version: u64, value: &Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            schema_version,
            resource_id: value.attr("id").as_str().map(ToString::to_string),
            depends_on: Vec::new(),
            value: value.to_json(),
            updated_at: Utc::now(),
        }
    }

    /// Sets the dependency edges.
    #[must_use]
    pub fn with_dependencies(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }
}

/// Kind of a recorded operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOperation {
    /// Change set applied.
    Apply,
    /// Instances refreshed from the remote system.
    Refresh,
    /// Instance imported.
    Import,
    /// State upgraded to current schema versions.
    Upgrade,
}

/// One entry of the operation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the operation finished.
    pub timestamp: DateTime<Utc>,
    /// Operation kind.
    pub operation: HistoryOperation,
    /// Affected addresses.
    pub resources: Vec<String>,
    /// Whether every action succeeded.
    pub success: bool,
    /// Failure summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HistoryEntry {
    /// A successful entry.
    #[must_use]
    pub fn new(operation: HistoryOperation, resources: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            resources,
            success: true,
            error: None,
        }
    }

    /// A failed entry.
    #[must_use]
    pub fn failed(operation: HistoryOperation, resources: Vec<String>, error: &str) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Self::new(operation, resources)
        }
    }
}

impl Default for StateDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl StateDocument {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_FORMAT_VERSION.to_string(),
            serial: 0,
            last_updated: Utc::now(),
            resources: BTreeMap::new(),
            history: Vec::new(),
        }
    }

    /// Gets an instance by address.
    #[must_use]
    pub fn get(&self, address: &str) -> Option<&InstanceState> {
        self.resources.get(address)
    }

    /// Adds or replaces an instance.
    pub fn set(&mut self, address: impl Into<String>, instance: InstanceState) {
        self.resources.insert(address.into(), instance);
        self.last_updated = Utc::now();
    }

    /// Removes an instance.
    pub fn remove(&mut self, address: &str) -> Option<InstanceState> {
        let removed = self.resources.remove(address);
        if removed.is_some() {
            self.last_updated = Utc::now();
        }
        removed
    }

    /// Appends a history entry, dropping the oldest beyond the cap.
    pub fn add_history(&mut self, entry: HistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }

    /// Addresses of every instance.
    #[must_use]
    pub fn addresses(&self) -> Vec<&str> {
        self.resources.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Display for HistoryOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Apply => "apply",
            Self::Refresh => "refresh",
            Self::Import => "import",
            Self::Upgrade => "upgrade",
        };
        write!(f, "{op}")
    }
}
