//! Attribute-level diff between prior state and the proposed state.
//!
//! Values of sensitive attributes are never rendered; only their paths are
//! reported.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::schema::{Attribute, Nesting};
use crate::value::{equal, Path, Value};

/// A single changed attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeChange {
    /// Attribute path.
    pub path: Path,
    /// Rendered prior value.
    pub before: String,
    /// Rendered proposed value.
    pub after: String,
    /// Whether this change forces replacement.
    pub requires_replace: bool,
}

/// Computes the changed attributes of a resource.
///
/// Single nested blocks are descended into; every other attribute is
/// compared as a whole with [`equal`], so unknown proposed values always
/// show up as changes.
#[must_use]
pub fn compute_changes(
    attributes: &BTreeMap<String, Attribute>,
    prior: &Value,
    proposed: &Value,
    requires_replace: &[Path],
) -> Vec<AttributeChange> {
    let mut changes = Vec::new();
    walk(attributes, &Path::root(), prior, proposed, false, requires_replace, &mut changes);
    changes
}

fn walk(
    attributes: &BTreeMap<String, Attribute>,
    base: &Path,
    prior: &Value,
    proposed: &Value,
    sensitive: bool,
    requires_replace: &[Path],
    out: &mut Vec<AttributeChange>,
) {
    for (name, attr) in attributes {
        let path = base.attr(name.clone());
        let before = prior.attr(name);
        let after = proposed.attr(name);
        let sensitive = sensitive || attr.sensitive;

        if let (Some(children), Some(Nesting::Single)) = (attr.children(), attr.nesting())
            && before.is_known()
            && after.is_known()
        {
            walk(children, &path, before, after, sensitive, requires_replace, out);
            continue;
        }

        if !equal(before, after, &attr.attr_type()) {
            out.push(AttributeChange {
                requires_replace: requires_replace
                    .iter()
                    .any(|p| p.is_prefix_of(&path) || path.is_prefix_of(p)),
                path,
                before: before.display_redacted(sensitive),
                after: after.display_redacted(sensitive),
            });
        }
    }
}

impl fmt::Display for AttributeChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.path, self.before, self.after)?;
        if self.requires_replace {
            write!(f, " (forces replacement)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Cardinality, Schema};
    use crate::value::{AttrType, REDACTED};

    fn schema() -> Schema {
        Schema::new(
            0,
            "",
            [
                ("name", Attribute::required(AttrType::String)),
                ("secret", Attribute::computed(AttrType::String).sensitive()),
                (
                    "settings",
                    Attribute::nested(
                        Nesting::Single,
                        Cardinality::Optional,
                        [("mode", Attribute::optional(AttrType::String))],
                    ),
                ),
            ],
        )
    }

    #[test]
    fn test_reports_changed_leaves() {
        let prior = Value::object([
            ("name", Value::string("x")),
            ("settings", Value::object([("mode", Value::string("a"))])),
        ]);
        let proposed = Value::object([
            ("name", Value::string("x")),
            ("settings", Value::object([("mode", Value::string("b"))])),
        ]);
        let changes = compute_changes(&schema().attributes, &prior, &proposed, &[]);

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, Path::from_attrs(&["settings", "mode"]));
        assert_eq!(changes[0].to_string(), "settings.mode: \"a\" -> \"b\"");
    }

    #[test]
    fn test_sensitive_values_are_redacted() {
        let prior = Value::object([("name", Value::string("x")), ("secret", Value::string("s1"))]);
        let proposed = Value::object([("name", Value::string("x")), ("secret", Value::Unknown)]);
        let changes = compute_changes(&schema().attributes, &prior, &proposed, &[]);

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].before, REDACTED);
        assert!(!changes[0].to_string().contains("s1"));
    }

    #[test]
    fn test_requires_replace_flag() {
        let prior = Value::object([("name", Value::string("x"))]);
        let proposed = Value::object([("name", Value::string("y"))]);
        let changes = compute_changes(
            &schema().attributes,
            &prior,
            &proposed,
            &[Path::root().attr("name")],
        );
        assert!(changes[0].requires_replace);
    }
}
