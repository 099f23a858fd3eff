//! Cross-instance references in configuration documents.
//!
//! A configuration value of the form `{"$ref": "pingone_environment.dev.id"}`
//! stands for the `id` attribute of the instance at `pingone_environment.dev`.
//! While that instance is still to be created the reference plans as
//! unknown; once it exists the reference resolves to the stored value.

use serde_json::Value as JsonValue;

use crate::error::PlanError;

/// Key marking a reference object.
pub const REF_MARKER: &str = "$ref";

/// A parsed `$ref` target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Address of the referenced instance.
    pub address: String,
    /// Top-level attribute of that instance.
    pub attribute: String,
}

impl Reference {
    /// Parses `<type>.<name>.<attribute>`.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let (address, attribute) = text.rsplit_once('.')?;
        if attribute.is_empty() || !address.contains('.') || address.starts_with('.') || address.ends_with('.') {
            return None;
        }
        Some(Self {
            address: address.to_string(),
            attribute: attribute.to_string(),
        })
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.address, self.attribute)
    }
}

fn as_reference(value: &JsonValue) -> Option<&str> {
    match value {
        JsonValue::Object(fields) if fields.len() == 1 => fields.get(REF_MARKER).and_then(JsonValue::as_str),
        _ => None,
    }
}

/// Every reference in `config`, in document order.
///
/// # Errors
///
/// Returns [`PlanError::UnresolvedReference`] for a malformed target.
pub fn references(address: &str, config: &JsonValue) -> Result<Vec<Reference>, PlanError> {
    let mut out = Vec::new();
    collect(address, config, &mut out)?;
    Ok(out)
}

fn collect(address: &str, value: &JsonValue, out: &mut Vec<Reference>) -> Result<(), PlanError> {
    if let Some(text) = as_reference(value) {
        out.push(parse_or_err(address, text)?);
        return Ok(());
    }
    match value {
        JsonValue::Array(items) => items.iter().try_for_each(|item| collect(address, item, out)),
        JsonValue::Object(fields) => fields.values().try_for_each(|item| collect(address, item, out)),
        _ => Ok(()),
    }
}

fn parse_or_err(address: &str, text: &str) -> Result<Reference, PlanError> {
    Reference::parse(text).ok_or_else(|| PlanError::UnresolvedReference {
        address: address.to_string(),
        reference: text.to_string(),
        message: String::from("expected <type>.<name>.<attribute>"),
    })
}

/// Replaces every reference in `config` with the wire value `lookup`
/// returns for it.
///
/// # Errors
///
/// Returns a malformed-reference error or whatever `lookup` fails with.
pub fn resolve_references<F>(address: &str, config: &JsonValue, lookup: &mut F) -> Result<JsonValue, PlanError>
where
    F: FnMut(&Reference) -> Result<JsonValue, PlanError>,
{
    if let Some(text) = as_reference(config) {
        return lookup(&parse_or_err(address, text)?);
    }
    Ok(match config {
        JsonValue::Array(items) => JsonValue::Array(
            items
                .iter()
                .map(|item| resolve_references(address, item, lookup))
                .collect::<Result<_, _>>()?,
        ),
        JsonValue::Object(fields) => JsonValue::Object(
            fields
                .iter()
                .map(|(k, v)| Ok((k.clone(), resolve_references(address, v, lookup)?)))
                .collect::<Result<_, PlanError>>()?,
        ),
        other => other.clone(),
    })
}
