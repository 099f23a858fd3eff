//! Value and type system.
//!
//! Every attribute value is null, unknown, or a known value of one of the
//! kinds in [`AttrType`]. Composite values may themselves be null or
//! unknown, which subsumes the state of all their children.

mod parse;
mod path;
mod resource_id;
mod types;

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use crate::error::PlanError;

pub use parse::{parse, parse_strict, UNKNOWN_MARKER};
pub use path::{Anchor, ExprStep, Match, Path, PathExpression, PathStep};
pub use resource_id::{is_resource_id, validate_resource_id, RESOURCE_ID_PATTERN};
pub use types::AttrType;

/// Placeholder rendered instead of sensitive values.
pub const REDACTED: &str = "(sensitive value)";

/// A tagged attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicitly absent.
    Null,
    /// Not yet known; decided by the remote system or another resource.
    Unknown,
    /// String, resource identifier or JSON text.
    String(String),
    /// Boolean.
    Bool(bool),
    /// 32-bit integer.
    Int32(i32),
    /// 64-bit integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Arbitrary-precision decimal.
    Number(Decimal),
    /// Ordered list.
    List(Vec<Value>),
    /// Set; element order carries no meaning.
    Set(Vec<Value>),
    /// String-keyed map.
    Map(BTreeMap<String, Value>),
    /// Object keyed by attribute name.
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Builds a string value.
    #[must_use]
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    /// Builds an object from `(name, value)` pairs.
    #[must_use]
    pub fn object<'a, I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Self)>,
    {
        Self::Object(
            fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        )
    }

    /// Builds a string map from `(key, value)` pairs.
    #[must_use]
    pub fn string_map<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), Self::string(v)))
                .collect(),
        )
    }

    /// Returns true if the value is null.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns true if the value is unknown.
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Returns true if the value is neither null nor unknown.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        !self.is_null() && !self.is_unknown()
    }

    /// Returns true if no unknown appears anywhere in the tree.
    #[must_use]
    pub fn is_fully_known(&self) -> bool {
        match self {
            Self::Unknown => false,
            Self::List(items) | Self::Set(items) => items.iter().all(Self::is_fully_known),
            Self::Map(entries) | Self::Object(entries) => entries.values().all(Self::is_fully_known),
            _ => true,
        }
    }

    /// Returns the string payload, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean payload, if any.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns an integer payload widened to `i64`.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int32(v) => Some(*v as i64),
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns any numeric payload as an exact decimal.
    #[must_use]
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Int32(v) => Some(Decimal::from(*v)),
            Self::Int64(v) => Some(Decimal::from(*v)),
            Self::Number(d) => Some(*d),
            Self::Float64(f) => Decimal::try_from(*f).ok(),
            _ => None,
        }
    }

    /// Returns the fields of an object value.
    #[must_use]
    pub const fn as_object(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Returns the entries of a map value.
    #[must_use]
    pub const fn as_map(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Returns the named attribute of an object, treating absence as null.
    ///
    /// A null or unknown object yields null or unknown respectively.
    #[must_use]
    pub fn attr(&self, name: &str) -> &Self {
        static NULL: Value = Value::Null;
        static UNKNOWN: Value = Value::Unknown;
        match self {
            Self::Object(fields) => fields.get(name).unwrap_or(&NULL),
            Self::Unknown => &UNKNOWN,
            _ => &NULL,
        }
    }

    /// Sets an attribute on an object value, turning a null into an object.
    pub fn set_attr(&mut self, name: impl Into<String>, value: Self) {
        if !matches!(self, Self::Object(_)) {
            *self = Self::Object(BTreeMap::new());
        }
        if let Self::Object(fields) = self {
            fields.insert(name.into(), value);
        }
    }

    /// Returns a short name for the kind of this value.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Unknown => "unknown",
            Self::String(_) => "string",
            Self::Bool(_) => "bool",
            Self::Int32(_) => "int32",
            Self::Int64(_) => "int64",
            Self::Float64(_) => "float64",
            Self::Number(_) => "number",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::Map(_) => "map",
            Self::Object(_) => "object",
        }
    }

    /// Converts the value to its JSON wire form.
    ///
    /// Unknown values are encoded as `{"$unknown": true}` and `number`
    /// values as decimal strings so no precision is lost.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Unknown => {
                let mut marker = serde_json::Map::new();
                marker.insert(UNKNOWN_MARKER.to_string(), JsonValue::Bool(true));
                JsonValue::Object(marker)
            }
            Self::String(s) => JsonValue::String(s.clone()),
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int32(v) => JsonValue::from(*v),
            Self::Int64(v) => JsonValue::from(*v),
            Self::Float64(v) => serde_json::Number::from_f64(*v).map_or(JsonValue::Null, JsonValue::Number),
            Self::Number(d) => JsonValue::String(d.to_string()),
            Self::List(items) | Self::Set(items) => {
                JsonValue::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Map(entries) | Self::Object(entries) => JsonValue::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Returns the canonical text used to key set elements in paths.
    #[must_use]
    pub fn canonical_key(&self) -> String {
        serde_json::to_string(&self.to_json()).unwrap_or_default()
    }

    /// Renders the value for diagnostics, hiding it when `sensitive`.
    #[must_use]
    pub fn display_redacted(&self, sensitive: bool) -> String {
        if sensitive && self.is_known() {
            String::from(REDACTED)
        } else {
            self.to_string()
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Unknown => write!(f, "(known after apply)"),
            Self::String(s) => write!(f, "\"{s}\""),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Number(d) => write!(f, "{d}"),
            _ => write!(f, "{}", self.canonical_key()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Semantic equality of two values of type `ty`.
///
/// Unknown is never equal to anything, including another unknown. Sets
/// compare as multisets using element-type semantics; `json` strings compare
/// as parsed documents.
#[must_use]
pub fn equal(a: &Value, b: &Value, ty: &AttrType) -> bool {
    match (a, b) {
        (Value::Unknown, _) | (_, Value::Unknown) => false,
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(x), Value::String(y)) => string_equal(x, y, ty),
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int32(x), Value::Int32(y)) => x == y,
        (Value::Int64(x), Value::Int64(y)) => x == y,
        #[allow(clippy::float_cmp)]
        (Value::Float64(x), Value::Float64(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::List(xs), Value::List(ys)) => {
            let elem = ty.element_type().unwrap_or(ty);
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| equal(x, y, elem))
        }
        (Value::Set(xs), Value::Set(ys)) => {
            let elem = ty.element_type().unwrap_or(ty);
            multiset_equal(xs, ys, elem)
        }
        (Value::Map(xs), Value::Map(ys)) => {
            let elem = ty.element_type().unwrap_or(ty);
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| equal(x, y, elem)))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            let AttrType::Object(fields) = ty else {
                return xs == ys;
            };
            fields
                .iter()
                .all(|(name, field_ty)| equal(a.attr(name), b.attr(name), field_ty))
        }
        _ => false,
    }
}

fn string_equal(x: &str, y: &str, ty: &AttrType) -> bool {
    match ty {
        AttrType::Json => match (
            serde_json::from_str::<JsonValue>(x),
            serde_json::from_str::<JsonValue>(y),
        ) {
            (Ok(px), Ok(py)) => px == py,
            _ => x == y,
        },
        // Resource identifiers are validated lowercase at parse time.
        _ => x == y,
    }
}

fn multiset_equal(xs: &[Value], ys: &[Value], elem: &AttrType) -> bool {
    if xs.len() != ys.len() {
        return false;
    }
    let mut used = vec![false; ys.len()];
    xs.iter().all(|x| {
        let found = ys
            .iter()
            .enumerate()
            .find(|(i, y)| !used[*i] && equal(x, y, elem))
            .map(|(i, _)| i);
        match found {
            Some(i) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}

/// Returns the value at `path` inside `value` (of type `ty`).
///
/// A null ancestor yields null and an unknown ancestor yields unknown.
///
/// # Errors
///
/// Returns [`PlanError::PathNotFound`] if the path is not valid for `ty`.
pub fn get(value: &Value, path: &Path, ty: &AttrType) -> Result<Value, PlanError> {
    let mut current = value.clone();
    let mut current_ty = ty;
    let not_found = || PlanError::PathNotFound {
        path: path.to_string(),
    };

    for step in path.steps() {
        let (next, next_ty) = match (step, current_ty) {
            (PathStep::Attr(name), AttrType::Object(fields)) => {
                let field_ty = fields.get(name).ok_or_else(not_found)?;
                (current.attr(name).clone(), field_ty)
            }
            (PathStep::Index(i), AttrType::List(elem)) => {
                let next = match &current {
                    Value::List(items) => items.get(*i).cloned().unwrap_or(Value::Null),
                    Value::Unknown => Value::Unknown,
                    _ => Value::Null,
                };
                (next, elem.as_ref())
            }
            (PathStep::Key(key), AttrType::Map(elem)) => {
                let next = match &current {
                    Value::Map(entries) => entries.get(key).cloned().unwrap_or(Value::Null),
                    Value::Unknown => Value::Unknown,
                    _ => Value::Null,
                };
                (next, elem.as_ref())
            }
            (PathStep::Elem(key), AttrType::Set(elem)) => {
                let next = match &current {
                    Value::Set(items) => items
                        .iter()
                        .find(|item| item.canonical_key() == *key)
                        .cloned()
                        .unwrap_or(Value::Null),
                    Value::Unknown => Value::Unknown,
                    _ => Value::Null,
                };
                (next, elem.as_ref())
            }
            _ => return Err(not_found()),
        };
        current = next;
        current_ty = next_ty;
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn object_type() -> AttrType {
        let mut fields = BTreeMap::new();
        fields.insert(String::from("name"), AttrType::String);
        fields.insert(String::from("tags"), AttrType::set(AttrType::String));
        fields.insert(String::from("policy"), AttrType::Json);
        AttrType::Object(fields)
    }

    #[test]
    fn test_unknown_never_equal() {
        assert!(!equal(&Value::Unknown, &Value::Unknown, &AttrType::String));
        assert!(!equal(&Value::Unknown, &Value::string("x"), &AttrType::String));
    }

    #[test]
    fn test_set_equality_is_order_insensitive() {
        let a = Value::Set(vec![Value::string("a"), Value::string("b"), Value::string("c")]);
        let b = Value::Set(vec![Value::string("c"), Value::string("a"), Value::string("b")]);
        assert!(equal(&a, &b, &AttrType::set(AttrType::String)));

        let c = Value::Set(vec![Value::string("a"), Value::string("a"), Value::string("b")]);
        assert!(!equal(&a, &c, &AttrType::set(AttrType::String)));
    }

    #[test]
    fn test_list_equality_is_ordered() {
        let a = Value::List(vec![Value::string("a"), Value::string("b")]);
        let b = Value::List(vec![Value::string("b"), Value::string("a")]);
        assert!(!equal(&a, &b, &AttrType::list(AttrType::String)));
    }

    #[test]
    fn test_json_semantic_equality() {
        let a = Value::string(r#"{"a": 1, "b": [1,2]}"#);
        let b = Value::string(r#"{"b":[1,2],"a":1}"#);
        assert!(equal(&a, &b, &AttrType::Json));
        assert!(!equal(&a, &b, &AttrType::String));
    }

    #[test]
    fn test_number_equality_is_exact() {
        let a = Value::Number(Decimal::from_str("1.10").expect("decimal"));
        let b = Value::Number(Decimal::from_str("1.1").expect("decimal"));
        assert!(equal(&a, &b, &AttrType::Number));
    }

    #[test]
    fn test_object_missing_field_equals_null() {
        let a = Value::object([("name", Value::string("x"))]);
        let b = Value::object([("name", Value::string("x")), ("policy", Value::Null)]);
        assert!(equal(&a, &b, &object_type()));
    }

    #[test]
    fn test_get_propagates_null_and_unknown() {
        let mut inner = BTreeMap::new();
        inner.insert(String::from("id"), AttrType::String);
        let mut fields = BTreeMap::new();
        fields.insert(String::from("parent"), AttrType::Object(inner));
        let ty = AttrType::Object(fields);

        let path = Path::from_attrs(&["parent", "id"]);
        let null_parent = Value::object([("parent", Value::Null)]);
        assert_eq!(get(&null_parent, &path, &ty).expect("get"), Value::Null);

        let unknown_parent = Value::object([("parent", Value::Unknown)]);
        assert_eq!(get(&unknown_parent, &path, &ty).expect("get"), Value::Unknown);

        let bad = Path::from_attrs(&["parent", "nope"]);
        assert!(matches!(
            get(&null_parent, &bad, &ty),
            Err(PlanError::PathNotFound { .. })
        ));
    }

    #[test]
    fn test_display_redacted() {
        let secret = Value::string("hunter2");
        assert_eq!(secret.display_redacted(true), REDACTED);
        assert_eq!(secret.display_redacted(false), "\"hunter2\"");
        assert_eq!(Value::Null.display_redacted(true), "null");
    }
}
