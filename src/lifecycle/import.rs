//! Import identifiers.
//!
//! An import identifier is one or more resource ids separated by `/`, e.g.
//! `<environment_id>/<population_id>`. Each resource type declares which
//! attribute every segment fills.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::LifecycleError;
use crate::value::{Value, RESOURCE_ID_PATTERN};

/// Unanchored form of the resource id pattern.
static SEGMENT: LazyLock<String> = LazyLock::new(|| {
    RESOURCE_ID_PATTERN
        .trim_start_matches('^')
        .trim_end_matches('$')
        .to_string()
});

/// Declared shape of a resource type's import identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFormat {
    segments: Vec<String>,
}

impl ImportFormat {
    /// Format whose segments fill the given attributes, in order.
    #[must_use]
    pub fn new(segments: &[&str]) -> Self {
        Self {
            segments: segments.iter().map(ToString::to_string).collect(),
        }
    }

    /// Attribute names filled by each segment.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Full anchored regex an identifier must match.
    #[must_use]
    pub fn regex(&self) -> String {
        let parts: Vec<String> = self.segments.iter().map(|_| format!("({})", *SEGMENT)).collect();
        format!("^{}$", parts.join("/"))
    }

    /// Parses `id` into `(attribute, value)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidImportId`] if the segment count is
    /// wrong or a segment is not a resource id.
    pub fn parse(&self, id: &str) -> Result<Vec<(String, String)>, LifecycleError> {
        let pattern = self.regex();
        let invalid = || LifecycleError::InvalidImportId {
            id: id.to_string(),
            format: self.to_string(),
            regex: pattern.clone(),
        };

        let re = Regex::new(&pattern).map_err(|_| invalid())?;
        let captures = re.captures(id.trim()).ok_or_else(invalid)?;
        self.segments
            .iter()
            .enumerate()
            .map(|(i, attr)| {
                captures
                    .get(i + 1)
                    .map(|m| (attr.clone(), m.as_str().to_string()))
                    .ok_or_else(invalid)
            })
            .collect()
    }

    /// Parses `id` into the minimal state that drives a read.
    ///
    /// # Errors
    ///
    /// See [`ImportFormat::parse`].
    pub fn initial_state(&self, id: &str) -> Result<Value, LifecycleError> {
        let mut state = Value::Object(std::collections::BTreeMap::new());
        for (attr, value) in self.parse(id)? {
            state.set_attr(attr, Value::String(value));
        }
        Ok(state)
    }
}

impl fmt::Display for ImportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}
