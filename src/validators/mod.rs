//! Validator library.
//!
//! Validators inspect one attribute value, may resolve path expressions
//! against the rest of the configuration, and append diagnostics. They never
//! mutate values. Every cross-attribute validator resolves its expressions
//! through [`traverse::resolve`], which owns the self-skip and
//! unknown-deferral rules.

mod boolean;
mod conditional;
mod numeric;
mod object;
mod string;
pub mod traverse;

use std::collections::BTreeMap;
use std::fmt;

use crate::diag::Diagnostics;
use crate::schema::{Attribute, Cardinality, Nesting, Schema};
use crate::value::{AttrType, Path, Value};

pub use boolean::{at_least_one_of_must_be_true, AtLeastOneOfMustBeTrue};
pub use conditional::{
    conflicts_if_matches, regex_matches_path_value, required_if_matches, required_if_regex_matches,
    should_be_value_if_path_matches, ConflictsIfMatches, RegexMatchesPathValue, RequiredIfMatches,
    RequiredIfRegexMatches, ShouldBeValueIfPathMatches,
};
pub use numeric::{int_between, is_divisible_by, is_greater_than_path_value, IntBetween, IsDivisibleBy, IsGreaterThanPathValue};
pub use object::{at_least_one_attribute_configured, not_null, AtLeastOneAttributeConfigured, NotNull};
pub use string::{
    is_base64, is_base64_of_content_type, is_parseable_json, length_between, matches_regex,
    not_contain, one_of, sniff_content_type, IsBase64, IsParseableJson, LengthBetween, MatchesRegex,
    NotContain, OneOf,
};

/// Everything a validator may look at.
#[derive(Debug, Clone, Copy)]
pub struct ValidationRequest<'a> {
    /// Path of the attribute under validation.
    pub path: &'a Path,
    /// Configuration value of the attribute.
    pub value: &'a Value,
    /// Whole resource configuration.
    pub config: &'a Value,
    /// Object type of the resource configuration.
    pub root_type: &'a AttrType,
}

impl<'a> ValidationRequest<'a> {
    /// Builds a request.
    #[must_use]
    pub const fn new(path: &'a Path, value: &'a Value, config: &'a Value, root_type: &'a AttrType) -> Self {
        Self {
            path,
            value,
            config,
            root_type,
        }
    }
}

/// A plan-time check attached to an attribute.
pub trait AttributeValidator: fmt::Debug + Send + Sync {
    /// Human-readable description of the constraint.
    fn description(&self) -> String;

    /// Checks the request and appends diagnostics.
    fn validate(&self, req: &ValidationRequest<'_>, diags: &mut Diagnostics);
}

/// Validates a resource configuration against its schema.
///
/// Reports missing required arguments, configured computed-only attributes,
/// and every attached validator. All problems are collected.
#[must_use]
pub fn validate_config(schema: &Schema, config: &Value) -> Diagnostics {
    let mut diags = Diagnostics::new();
    let root_type = schema.object_type();
    let walker = Walker {
        config,
        root_type: &root_type,
    };
    walker.walk_object(&schema.attributes, &Path::root(), config, &mut diags);
    diags
}

struct Walker<'a> {
    config: &'a Value,
    root_type: &'a AttrType,
}

impl Walker<'_> {
    fn walk_object(
        &self,
        attributes: &BTreeMap<String, Attribute>,
        base: &Path,
        object: &Value,
        diags: &mut Diagnostics,
    ) {
        if !object.is_known() {
            return;
        }
        for (name, attr) in attributes {
            let path = base.attr(name.clone());
            let value = object.attr(name);
            self.walk_attribute(name, attr, &path, value, diags);
        }
    }

    fn walk_attribute(&self, name: &str, attr: &Attribute, path: &Path, value: &Value, diags: &mut Diagnostics) {
        if attr.cardinality == Cardinality::Required && value.is_null() {
            diags.error(
                path.clone(),
                "Missing required argument",
                format!("The argument \"{name}\" is required, but no definition was found."),
            );
        }
        if !attr.cardinality.is_configurable() {
            if !value.is_null() {
                diags.error(
                    path.clone(),
                    "Invalid Configuration for Read-Only Attribute",
                    "Cannot set value for this attribute as the provider has marked it as read-only. \
                     Remove the configuration line setting the value.",
                );
            }
            return;
        }

        let req = ValidationRequest::new(path, value, self.config, self.root_type);
        for validator in &attr.validators {
            validator.validate(&req, diags);
        }

        let (Some(children), Some(nesting)) = (attr.children(), attr.nesting()) else {
            return;
        };
        match (nesting, value) {
            (Nesting::Single, _) => self.walk_object(children, path, value, diags),
            (Nesting::List, Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    self.walk_object(children, &path.index(i), item, diags);
                }
            }
            (Nesting::Set, Value::Set(items)) => {
                for item in items {
                    self.walk_object(children, &path.elem(item), item, diags);
                }
            }
            (Nesting::Map, Value::Map(entries)) => {
                for (key, item) in entries {
                    self.walk_object(children, &path.key(key.clone()), item, diags);
                }
            }
            _ => {}
        }
    }
}

/// Compares two configuration values, treating numeric kinds by value.
pub(crate) fn same_value(a: &Value, b: &Value) -> bool {
    match (a.as_decimal(), b.as_decimal()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Text used when matching a value against a regular expression.
pub(crate) fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new(
            0,
            "test",
            [
                ("name", Attribute::required(AttrType::String)),
                ("id", Attribute::computed(AttrType::ResourceId)),
                (
                    "rules",
                    Attribute::nested(
                        Nesting::List,
                        Cardinality::Optional,
                        [
                            ("kind", Attribute::required(AttrType::String)),
                            ("note", Attribute::optional(AttrType::String).validator(not_contain(&["$"]))),
                        ],
                    ),
                ),
            ],
        )
    }

    #[test]
    fn test_collects_every_problem() {
        let config = Value::object([
            ("name", Value::Null),
            ("id", Value::string("abc")),
            (
                "rules",
                Value::List(vec![
                    Value::object([("kind", Value::Null), ("note", Value::string("ok"))]),
                    Value::object([("kind", Value::string("k")), ("note", Value::string("a$b"))]),
                ]),
            ),
        ]);
        let diags = validate_config(&schema(), &config);

        assert_eq!(diags.error_count(), 4);
        assert!(diags.has_error_at(&Path::root().attr("name")));
        assert!(diags.has_error_at(&Path::root().attr("id")));
        assert!(diags.has_error_at(&Path::root().attr("rules").index(0).attr("kind")));
        assert!(diags.has_error_at(&Path::root().attr("rules").index(1).attr("note")));
    }

    #[test]
    fn test_unknown_block_is_not_walked() {
        let config = Value::object([("name", Value::string("x")), ("rules", Value::Unknown)]);
        assert!(validate_config(&schema(), &config).is_empty());
    }

    #[test]
    fn test_same_value_compares_numbers_by_value() {
        assert!(same_value(&Value::Int32(3), &Value::Int64(3)));
        assert!(!same_value(&Value::string("3"), &Value::Int64(3)));
    }
}
