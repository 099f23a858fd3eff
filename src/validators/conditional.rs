//! Validators conditioned on values elsewhere in the configuration.

use regex::Regex;

use crate::diag::Diagnostics;
use crate::value::{PathExpression, Value};

use super::traverse::{describe_expressions, resolve, Resolution};
use super::{plain_text, same_value, AttributeValidator, ValidationRequest};

/// Attribute is required when any matched path holds a target value.
#[derive(Debug, Clone)]
pub struct RequiredIfMatches {
    target: Value,
    expressions: Vec<PathExpression>,
}

/// Builds a [`RequiredIfMatches`] validator.
#[must_use]
pub fn required_if_matches(
    target: impl Into<Value>,
    expressions: impl IntoIterator<Item = PathExpression>,
) -> RequiredIfMatches {
    RequiredIfMatches {
        target: target.into(),
        expressions: expressions.into_iter().collect(),
    }
}

impl AttributeValidator for RequiredIfMatches {
    fn description(&self) -> String {
        format!(
            "The argument is required if the value {} is present at the defined path: {}",
            self.target,
            describe_expressions(&self.expressions)
        )
    }

    fn validate(&self, req: &ValidationRequest<'_>, diags: &mut Diagnostics) {
        if !req.value.is_null() {
            return;
        }
        let Resolution::Resolved(matches) = resolve(req, &self.expressions, diags) else {
            return;
        };
        if let Some(m) = matches.iter().find(|m| same_value(&m.value, &self.target)) {
            diags.error(
                req.path.clone(),
                "Missing required argument",
                format!(
                    "The argument {} is required because {} is configured as: {}.",
                    req.path, m.path, self.target
                ),
            );
        }
    }
}

/// Attribute is required when any matched path's text matches a regex.
#[derive(Debug, Clone)]
pub struct RequiredIfRegexMatches {
    regex: Regex,
    expressions: Vec<PathExpression>,
}

/// Builds a [`RequiredIfRegexMatches`] validator.
#[must_use]
pub fn required_if_regex_matches(
    regex: Regex,
    expressions: impl IntoIterator<Item = PathExpression>,
) -> RequiredIfRegexMatches {
    RequiredIfRegexMatches {
        regex,
        expressions: expressions.into_iter().collect(),
    }
}

impl AttributeValidator for RequiredIfRegexMatches {
    fn description(&self) -> String {
        format!(
            "The argument is required if a value matching '{}' is present at the defined path: {}",
            self.regex,
            describe_expressions(&self.expressions)
        )
    }

    fn validate(&self, req: &ValidationRequest<'_>, diags: &mut Diagnostics) {
        if !req.value.is_null() {
            return;
        }
        let Resolution::Resolved(matches) = resolve(req, &self.expressions, diags) else {
            return;
        };
        let hit = matches
            .iter()
            .find(|m| !m.value.is_null() && self.regex.is_match(&plain_text(&m.value)));
        if let Some(m) = hit {
            diags.error(
                req.path.clone(),
                "Missing required argument",
                format!(
                    "The argument {} is required because {} matches the pattern '{}'.",
                    req.path, m.path, self.regex
                ),
            );
        }
    }
}

/// Attribute must be left unset when any matched path holds a target value.
#[derive(Debug, Clone)]
pub struct ConflictsIfMatches {
    target: Value,
    expressions: Vec<PathExpression>,
}

/// Builds a [`ConflictsIfMatches`] validator.
#[must_use]
pub fn conflicts_if_matches(
    target: impl Into<Value>,
    expressions: impl IntoIterator<Item = PathExpression>,
) -> ConflictsIfMatches {
    ConflictsIfMatches {
        target: target.into(),
        expressions: expressions.into_iter().collect(),
    }
}

impl AttributeValidator for ConflictsIfMatches {
    fn description(&self) -> String {
        format!(
            "The argument cannot be defined if the value {} is present at the defined path: {}",
            self.target,
            describe_expressions(&self.expressions)
        )
    }

    fn validate(&self, req: &ValidationRequest<'_>, diags: &mut Diagnostics) {
        if req.value.is_null() {
            return;
        }
        let Resolution::Resolved(matches) = resolve(req, &self.expressions, diags) else {
            return;
        };
        if matches.iter().any(|m| same_value(&m.value, &self.target)) {
            diags.error(req.path.clone(), "Invalid argument combination", self.description());
        }
    }
}

/// When any matched path is set, the attribute itself must match a regex.
#[derive(Debug, Clone)]
pub struct RegexMatchesPathValue {
    regex: Regex,
    message: Option<String>,
    expressions: Vec<PathExpression>,
}

/// Builds a [`RegexMatchesPathValue`] validator. `message` replaces the
/// generated description when given.
#[must_use]
pub fn regex_matches_path_value(
    regex: Regex,
    message: Option<&str>,
    expressions: impl IntoIterator<Item = PathExpression>,
) -> RegexMatchesPathValue {
    RegexMatchesPathValue {
        regex,
        message: message.map(ToString::to_string),
        expressions: expressions.into_iter().collect(),
    }
}

impl AttributeValidator for RegexMatchesPathValue {
    fn description(&self) -> String {
        self.message.clone().unwrap_or_else(|| {
            format!(
                "must match regular expression '{}' when {} is set",
                self.regex,
                describe_expressions(&self.expressions)
            )
        })
    }

    fn validate(&self, req: &ValidationRequest<'_>, diags: &mut Diagnostics) {
        if req.value.is_null() {
            return;
        }
        let Resolution::Resolved(matches) = resolve(req, &self.expressions, diags) else {
            return;
        };
        let applies = matches.iter().any(|m| !m.value.is_null());
        if applies && !self.regex.is_match(&plain_text(req.value)) {
            diags.error(
                req.path.clone(),
                "Invalid Attribute Value Match",
                format!("Attribute {} {}", req.path, self.description()),
            );
        }
    }
}

/// When any matched path holds a target value, the attribute must equal a
/// fixed value.
#[derive(Debug, Clone)]
pub struct ShouldBeValueIfPathMatches {
    attribute_value: Value,
    target_path_value: Value,
    expressions: Vec<PathExpression>,
}

/// Builds a [`ShouldBeValueIfPathMatches`] validator.
#[must_use]
pub fn should_be_value_if_path_matches(
    attribute_value: impl Into<Value>,
    target_path_value: impl Into<Value>,
    expressions: impl IntoIterator<Item = PathExpression>,
) -> ShouldBeValueIfPathMatches {
    ShouldBeValueIfPathMatches {
        attribute_value: attribute_value.into(),
        target_path_value: target_path_value.into(),
        expressions: expressions.into_iter().collect(),
    }
}

impl AttributeValidator for ShouldBeValueIfPathMatches {
    fn description(&self) -> String {
        format!(
            "The argument must be set to {} if the value {} is present at the defined path: {}",
            self.attribute_value,
            self.target_path_value,
            describe_expressions(&self.expressions)
        )
    }

    fn validate(&self, req: &ValidationRequest<'_>, diags: &mut Diagnostics) {
        let Resolution::Resolved(matches) = resolve(req, &self.expressions, diags) else {
            return;
        };
        let triggered = matches
            .iter()
            .any(|m| same_value(&m.value, &self.target_path_value));
        if triggered && !same_value(req.value, &self.attribute_value) {
            diags.error(req.path.clone(), "Invalid argument combination", self.description());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{AttrType, Path};
    use std::collections::BTreeMap;

    fn root_type() -> AttrType {
        AttrType::Object(BTreeMap::from([
            (String::from("auth"), AttrType::String),
            (String::from("client_id"), AttrType::String),
            (String::from("client_secret"), AttrType::String),
        ]))
    }

    fn check(validator: &dyn AttributeValidator, config: &Value, attr: &str) -> Diagnostics {
        let ty = root_type();
        let path = Path::root().attr(attr);
        let req = ValidationRequest::new(&path, config.attr(attr), config, &ty);
        let mut diags = Diagnostics::new();
        validator.validate(&req, &mut diags);
        diags
    }

    #[test]
    fn test_required_if_matches_fires() {
        let config = Value::object([
            ("auth", Value::string("client_credentials")),
            ("client_id", Value::string("c")),
            ("client_secret", Value::Null),
        ]);
        let v = required_if_matches("client_credentials", [PathExpression::sibling("auth")]);
        let diags = check(&v, &config, "client_secret");

        assert_eq!(diags.error_count(), 1);
        assert!(diags.has_error_at(&Path::root().attr("client_secret")));
    }

    #[test]
    fn test_required_if_matches_defers_on_unknown() {
        let config = Value::object([("auth", Value::Unknown), ("client_secret", Value::Null)]);
        let v = required_if_matches("client_credentials", [PathExpression::sibling("auth")]);
        assert!(check(&v, &config, "client_secret").is_empty());
    }

    #[test]
    fn test_required_if_regex_matches() {
        let config = Value::object([("auth", Value::string("worker")), ("client_id", Value::Null)]);
        let v = required_if_regex_matches(
            Regex::new("^(worker|client_credentials)$").expect("regex"),
            [PathExpression::root("auth")],
        );
        assert_eq!(check(&v, &config, "client_id").error_count(), 1);
    }

    #[test]
    fn test_conflicts_if_matches() {
        let config = Value::object([
            ("auth", Value::string("device_code")),
            ("client_secret", Value::string("shh")),
        ]);
        let v = conflicts_if_matches("device_code", [PathExpression::sibling("auth")]);
        let diags = check(&v, &config, "client_secret");
        assert_eq!(diags.error_count(), 1);
        assert!(!diags.to_string().contains("shh"));
    }

    #[test]
    fn test_regex_matches_path_value_checks_attribute() {
        let regex = Regex::new("^[a-z]+$").expect("regex");
        let v = regex_matches_path_value(regex, None, [PathExpression::sibling("auth")]);

        let bad = Value::object([("auth", Value::string("x")), ("client_id", Value::string("ABC"))]);
        assert_eq!(check(&v, &bad, "client_id").error_count(), 1);

        let good = Value::object([("auth", Value::string("x")), ("client_id", Value::string("abc"))]);
        assert!(check(&v, &good, "client_id").is_empty());

        let unset = Value::object([("auth", Value::Null), ("client_id", Value::string("ABC"))]);
        assert!(check(&v, &unset, "client_id").is_empty());
    }

    #[test]
    fn test_should_be_value_if_path_matches() {
        let v = should_be_value_if_path_matches("fixed", "worker", [PathExpression::sibling("auth")]);
        let config = Value::object([("auth", Value::string("worker")), ("client_id", Value::string("other"))]);
        assert_eq!(check(&v, &config, "client_id").error_count(), 1);

        let config = Value::object([("auth", Value::string("worker")), ("client_id", Value::string("fixed"))]);
        assert!(check(&v, &config, "client_id").is_empty());
    }
}
