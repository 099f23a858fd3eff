//! Attribute kinds.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// The kind of an attribute value.
///
/// `ResourceId` is a refinement of `String` whose values must match the
/// PingOne identifier format. `Json` is a string holding a JSON document whose
/// equality is decided on the parsed document rather than the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrType {
    /// UTF-8 string.
    String,
    /// Boolean.
    Bool,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit float.
    Float64,
    /// Arbitrary-precision decimal.
    Number,
    /// PingOne resource identifier.
    ResourceId,
    /// Normalized JSON document stored as a string.
    Json,
    /// Ordered list.
    List(Box<AttrType>),
    /// Unordered set of unique elements.
    Set(Box<AttrType>),
    /// String-keyed map.
    Map(Box<AttrType>),
    /// Object with a fixed set of attributes.
    Object(BTreeMap<String, AttrType>),
}

impl AttrType {
    /// Shorthand for `list<elem>`.
    #[must_use]
    pub fn list(elem: Self) -> Self {
        Self::List(Box::new(elem))
    }

    /// Shorthand for `set<elem>`.
    #[must_use]
    pub fn set(elem: Self) -> Self {
        Self::Set(Box::new(elem))
    }

    /// Shorthand for `map<string, elem>`.
    #[must_use]
    pub fn map(elem: Self) -> Self {
        Self::Map(Box::new(elem))
    }

    /// Returns the element type of a list, set or map.
    #[must_use]
    pub fn element_type(&self) -> Option<&Self> {
        match self {
            Self::List(elem) | Self::Set(elem) | Self::Map(elem) => Some(elem),
            _ => None,
        }
    }

    /// Returns true for string-backed kinds.
    #[must_use]
    pub const fn is_string_like(&self) -> bool {
        matches!(self, Self::String | Self::ResourceId | Self::Json)
    }

    /// Returns true for integer kinds.
    #[must_use]
    pub const fn is_integer(&self) -> bool {
        matches!(self, Self::Int32 | Self::Int64)
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Bool => write!(f, "bool"),
            Self::Int32 => write!(f, "int32"),
            Self::Int64 => write!(f, "int64"),
            Self::Float64 => write!(f, "float64"),
            Self::Number => write!(f, "number"),
            Self::ResourceId => write!(f, "resource_id"),
            Self::Json => write!(f, "json"),
            Self::List(elem) => write!(f, "list<{elem}>"),
            Self::Set(elem) => write!(f, "set<{elem}>"),
            Self::Map(elem) => write!(f, "map<string,{elem}>"),
            Self::Object(fields) => {
                write!(f, "object{{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{name}:{ty}")?;
                }
                write!(f, "}}")
            }
        }
    }
}
