//! Attribute paths and path expressions.
//!
//! A [`Path`] addresses exactly one node in a value tree. A
//! [`PathExpression`] may additionally walk to parents and fan out over
//! collection elements; it is resolved lazily against a concrete
//! configuration by [`PathExpression::matches`].

use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::PlanError;

use super::{AttrType, Value};

/// A single step in a concrete path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathStep {
    /// Object attribute name.
    Attr(String),
    /// List element index.
    Index(usize),
    /// Map key.
    Key(String),
    /// Set element, keyed by the canonical JSON text of the element.
    Elem(String),
}

/// A concrete path from the root of a resource value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    steps: Vec<PathStep>,
}

impl Path {
    /// The empty path, addressing the resource root.
    #[must_use]
    pub const fn root() -> Self {
        Self { steps: Vec::new() }
    }

    /// Builds a path of nested attribute names.
    #[must_use]
    pub fn from_attrs(names: &[&str]) -> Self {
        Self {
            steps: names.iter().map(|n| PathStep::Attr((*n).to_string())).collect(),
        }
    }

    /// Returns a copy of this path extended by an attribute step.
    #[must_use]
    pub fn attr(&self, name: impl Into<String>) -> Self {
        self.push(PathStep::Attr(name.into()))
    }

    /// Returns a copy of this path extended by a list index.
    #[must_use]
    pub fn index(&self, index: usize) -> Self {
        self.push(PathStep::Index(index))
    }

    /// Returns a copy of this path extended by a map key.
    #[must_use]
    pub fn key(&self, key: impl Into<String>) -> Self {
        self.push(PathStep::Key(key.into()))
    }

    /// Returns a copy of this path extended by a set element.
    #[must_use]
    pub fn elem(&self, element: &Value) -> Self {
        self.push(PathStep::Elem(element.canonical_key()))
    }

    fn push(&self, step: PathStep) -> Self {
        let mut steps = self.steps.clone();
        steps.push(step);
        Self { steps }
    }

    /// Returns the parent path, or `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.steps.is_empty() {
            return None;
        }
        Some(Self {
            steps: self.steps[..self.steps.len() - 1].to_vec(),
        })
    }

    /// Returns the steps of this path.
    #[must_use]
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Returns the last step, if any.
    #[must_use]
    pub fn last(&self) -> Option<&PathStep> {
        self.steps.last()
    }

    /// Returns true for the root path.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns true if `self` is `other` or one of its ancestors.
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        other.steps.len() >= self.steps.len() && other.steps[..self.steps.len()] == self.steps[..]
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            match step {
                PathStep::Attr(name) if i == 0 => write!(f, "{name}")?,
                PathStep::Attr(name) => write!(f, ".{name}")?,
                PathStep::Index(index) => write!(f, "[{index}]")?,
                PathStep::Key(key) => write!(f, "[\"{key}\"]")?,
                PathStep::Elem(elem) => write!(f, "[{elem}]")?,
            }
        }
        Ok(())
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Leading step of a path expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Starts at the resource root.
    Root,
    /// Starts at the path of the attribute being validated.
    Relative,
}

/// A step in a path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprStep {
    /// Object attribute name.
    Attr(String),
    /// Step up to the parent node.
    Parent,
    /// Every present element of a list, set or map.
    AnyElement,
    /// A specific list index.
    Index(usize),
    /// A specific map key.
    Key(String),
}

/// A path expression used by validators to address sibling attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpression {
    anchor: Anchor,
    steps: Vec<ExprStep>,
}

/// A concrete path matched by an expression, with the value found there.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    /// The concrete path.
    pub path: Path,
    /// The configuration value at the path.
    pub value: Value,
}

impl PathExpression {
    /// Starts an absolute expression at a root attribute.
    #[must_use]
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            anchor: Anchor::Root,
            steps: vec![ExprStep::Attr(name.into())],
        }
    }

    /// Starts an expression relative to the attribute being validated.
    #[must_use]
    pub const fn relative() -> Self {
        Self {
            anchor: Anchor::Relative,
            steps: Vec::new(),
        }
    }

    /// Convenience for the common "sibling attribute" expression.
    #[must_use]
    pub fn sibling(name: impl Into<String>) -> Self {
        Self::relative().at_parent().at_name(name)
    }

    /// Appends an attribute step.
    #[must_use]
    pub fn at_name(mut self, name: impl Into<String>) -> Self {
        self.steps.push(ExprStep::Attr(name.into()));
        self
    }

    /// Appends a parent step.
    #[must_use]
    pub fn at_parent(mut self) -> Self {
        self.steps.push(ExprStep::Parent);
        self
    }

    /// Appends a wildcard over collection elements.
    #[must_use]
    pub fn at_any_element(mut self) -> Self {
        self.steps.push(ExprStep::AnyElement);
        self
    }

    /// Appends a list index step.
    #[must_use]
    pub fn at_index(mut self, index: usize) -> Self {
        self.steps.push(ExprStep::Index(index));
        self
    }

    /// Appends a map key step.
    #[must_use]
    pub fn at_key(mut self, key: impl Into<String>) -> Self {
        self.steps.push(ExprStep::Key(key.into()));
        self
    }

    /// Returns the anchor of this expression.
    #[must_use]
    pub const fn anchor(&self) -> Anchor {
        self.anchor
    }

    /// Resolves the expression against the path of the attribute under
    /// validation, producing an absolute expression with parent steps folded.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::PathNotFound`] if a parent step walks above the root.
    pub fn resolve(&self, base: &Path) -> Result<Self, PlanError> {
        let mut steps: Vec<ExprStep> = match self.anchor {
            Anchor::Root => Vec::new(),
            Anchor::Relative => base
                .steps()
                .iter()
                .map(|step| match step {
                    PathStep::Attr(name) => ExprStep::Attr(name.clone()),
                    PathStep::Index(index) => ExprStep::Index(*index),
                    PathStep::Key(key) => ExprStep::Key(key.clone()),
                    // Set elements are re-addressed through the wildcard.
                    PathStep::Elem(_) => ExprStep::AnyElement,
                })
                .collect(),
        };

        for step in &self.steps {
            if *step == ExprStep::Parent {
                if steps.pop().is_none() {
                    return Err(PlanError::PathNotFound {
                        path: format!("{self} (from {base})"),
                    });
                }
            } else {
                steps.push(step.clone());
            }
        }

        Ok(Self {
            anchor: Anchor::Root,
            steps,
        })
    }

    /// Walks `config` (an object of type `root_type`) and returns every
    /// concrete path the expression matches, with its value.
    ///
    /// A wildcard over a null collection matches nothing. A wildcard or
    /// index over an unknown collection matches the collection itself, so
    /// callers observe the unknown and can defer.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::PathNotFound`] when the expression is not valid
    /// for the schema, or when it is still relative.
    pub fn matches(&self, config: &Value, root_type: &AttrType) -> Result<Vec<Match>, PlanError> {
        if self.anchor == Anchor::Relative {
            return Err(PlanError::PathNotFound {
                path: self.to_string(),
            });
        }
        let mut out = Vec::new();
        self.walk(0, Path::root(), config, root_type, &mut out)?;
        Ok(out)
    }

    fn walk(
        &self,
        index: usize,
        path: Path,
        value: &Value,
        ty: &AttrType,
        out: &mut Vec<Match>,
    ) -> Result<(), PlanError> {
        let Some(step) = self.steps.get(index) else {
            out.push(Match {
                path,
                value: value.clone(),
            });
            return Ok(());
        };

        let not_found = || PlanError::PathNotFound {
            path: self.to_string(),
        };

        match step {
            ExprStep::Attr(name) => {
                let AttrType::Object(fields) = ty else {
                    return Err(not_found());
                };
                let child_ty = fields.get(name).ok_or_else(not_found)?;
                let child = match value {
                    Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Null),
                    Value::Unknown => Value::Unknown,
                    _ => Value::Null,
                };
                self.walk(index + 1, path.attr(name.clone()), &child, child_ty, out)
            }
            ExprStep::Index(i) => {
                let AttrType::List(elem_ty) = ty else {
                    return Err(not_found());
                };
                match value {
                    Value::Unknown => {
                        out.push(Match {
                            path,
                            value: Value::Unknown,
                        });
                        Ok(())
                    }
                    Value::List(items) => match items.get(*i) {
                        Some(item) => self.walk(index + 1, path.index(*i), item, elem_ty, out),
                        None => Ok(()),
                    },
                    _ => Ok(()),
                }
            }
            ExprStep::Key(key) => {
                let AttrType::Map(elem_ty) = ty else {
                    return Err(not_found());
                };
                match value {
                    Value::Unknown => {
                        out.push(Match {
                            path,
                            value: Value::Unknown,
                        });
                        Ok(())
                    }
                    Value::Map(entries) => match entries.get(key) {
                        Some(item) => self.walk(index + 1, path.key(key.clone()), item, elem_ty, out),
                        None => Ok(()),
                    },
                    _ => Ok(()),
                }
            }
            ExprStep::AnyElement => {
                let elem_ty = ty.element_type().ok_or_else(not_found)?;
                match value {
                    Value::Unknown => {
                        out.push(Match {
                            path,
                            value: Value::Unknown,
                        });
                        Ok(())
                    }
                    Value::List(items) => {
                        for (i, item) in items.iter().enumerate() {
                            self.walk(index + 1, path.index(i), item, elem_ty, out)?;
                        }
                        Ok(())
                    }
                    Value::Set(items) => {
                        for item in items {
                            self.walk(index + 1, path.elem(item), item, elem_ty, out)?;
                        }
                        Ok(())
                    }
                    Value::Map(entries) => {
                        for (key, item) in entries {
                            self.walk(index + 1, path.key(key.clone()), item, elem_ty, out)?;
                        }
                        Ok(())
                    }
                    _ => Ok(()),
                }
            }
            ExprStep::Parent => Err(not_found()),
        }
    }
}

impl fmt::Display for PathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::with_capacity(self.steps.len() + 1);
        if self.anchor == Anchor::Relative {
            parts.push(String::from("."));
        }
        for step in &self.steps {
            parts.push(match step {
                ExprStep::Attr(name) => name.clone(),
                ExprStep::Parent => String::from("<"),
                ExprStep::AnyElement => String::from("[*]"),
                ExprStep::Index(i) => format!("[{i}]"),
                ExprStep::Key(key) => format!("[\"{key}\"]"),
            });
        }
        write!(f, "{}", parts.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn schema() -> AttrType {
        let mut inner = BTreeMap::new();
        inner.insert(String::from("kind"), AttrType::String);
        inner.insert(String::from("enabled"), AttrType::Bool);

        let mut root = BTreeMap::new();
        root.insert(String::from("name"), AttrType::String);
        root.insert(String::from("auth"), AttrType::String);
        root.insert(
            String::from("rules"),
            AttrType::List(Box::new(AttrType::Object(inner.clone()))),
        );
        root.insert(String::from("settings"), AttrType::Object(inner));
        AttrType::Object(root)
    }

    fn config() -> Value {
        Value::object([
            ("name", Value::string("x")),
            ("auth", Value::string("client_credentials")),
            (
                "rules",
                Value::List(vec![
                    Value::object([("kind", Value::string("a")), ("enabled", Value::Bool(true))]),
                    Value::object([("kind", Value::string("b")), ("enabled", Value::Unknown)]),
                ]),
            ),
            ("settings", Value::Null),
        ])
    }

    #[test]
    fn test_path_display() {
        let path = Path::root().attr("rules").index(1).attr("kind");
        assert_eq!(path.to_string(), "rules[1].kind");
        assert_eq!(Path::root().attr("tags").key("env").to_string(), "tags[\"env\"]");
    }

    #[test]
    fn test_parent_and_prefix() {
        let path = Path::from_attrs(&["settings", "kind"]);
        let parent = path.parent().expect("parent");
        assert_eq!(parent, Path::from_attrs(&["settings"]));
        assert!(parent.is_prefix_of(&path));
        assert!(Path::root().parent().is_none());
    }

    #[test]
    fn test_absolute_expression_matches() {
        let matches = PathExpression::root("auth")
            .matches(&config(), &schema())
            .expect("match");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].value, Value::string("client_credentials"));
    }

    #[test]
    fn test_relative_sibling_resolution() {
        let base = Path::root().attr("rules").index(0).attr("enabled");
        let resolved = PathExpression::sibling("kind").resolve(&base).expect("resolve");
        let matches = resolved.matches(&config(), &schema()).expect("match");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].path.to_string(), "rules[0].kind");
        assert_eq!(matches[0].value, Value::string("a"));
    }

    #[test]
    fn test_wildcard_expands_elements() {
        let matches = PathExpression::root("rules")
            .at_any_element()
            .at_name("enabled")
            .matches(&config(), &schema())
            .expect("match");
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[1].value, Value::Unknown);
    }

    #[test]
    fn test_attribute_under_null_object_is_null() {
        let matches = PathExpression::root("settings")
            .at_name("kind")
            .matches(&config(), &schema())
            .expect("match");
        assert_eq!(matches.len(), 1);
        assert!(matches[0].value.is_null());
    }

    #[test]
    fn test_invalid_expression_is_path_not_found() {
        let err = PathExpression::root("missing").matches(&config(), &schema());
        assert!(matches!(err, Err(PlanError::PathNotFound { .. })));

        let err = PathExpression::relative().at_parent().resolve(&Path::root());
        assert!(err.is_err());
    }
}
