//! Nested-object validators.

use crate::diag::Diagnostics;

use super::{AttributeValidator, ValidationRequest};

/// At least one named child of a nested object must be non-null.
#[derive(Debug, Clone)]
pub struct AtLeastOneAttributeConfigured {
    names: Vec<String>,
}

/// Builds an [`AtLeastOneAttributeConfigured`] validator.
#[must_use]
pub fn at_least_one_attribute_configured(names: &[&str]) -> AtLeastOneAttributeConfigured {
    AtLeastOneAttributeConfigured {
        names: names.iter().map(ToString::to_string).collect(),
    }
}

impl AttributeValidator for AtLeastOneAttributeConfigured {
    fn description(&self) -> String {
        format!("at least one of {:?} must be configured", self.names)
    }

    fn validate(&self, req: &ValidationRequest<'_>, diags: &mut Diagnostics) {
        if !req.value.is_known() {
            return;
        }
        let children: Vec<_> = self.names.iter().map(|n| req.value.attr(n)).collect();
        if children.iter().any(|c| c.is_unknown()) {
            return;
        }
        if children.iter().all(|c| c.is_null()) {
            diags.error(
                req.path.clone(),
                "Missing Attribute Configuration",
                format!(
                    "At least one of the following attributes must be configured in {}: {:?}",
                    req.path, self.names
                ),
            );
        }
    }
}

/// Attribute must not be null.
#[derive(Debug, Clone, Copy)]
pub struct NotNull;

/// Builds a [`NotNull`] validator.
#[must_use]
pub const fn not_null() -> NotNull {
    NotNull
}

impl AttributeValidator for NotNull {
    fn description(&self) -> String {
        String::from("value must be configured")
    }

    fn validate(&self, req: &ValidationRequest<'_>, diags: &mut Diagnostics) {
        if req.value.is_null() {
            diags.error(
                req.path.clone(),
                "Missing required argument",
                format!("The argument {} is required, but no definition was found.", req.path),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{AttrType, Path, Value};

    fn check(validator: &dyn AttributeValidator, value: &Value) -> Diagnostics {
        let path = Path::root().attr("block");
        let config = Value::object([("block", value.clone())]);
        let ty = AttrType::String;
        let req = ValidationRequest::new(&path, value, &config, &ty);
        let mut diags = Diagnostics::new();
        validator.validate(&req, &mut diags);
        diags
    }

    #[test]
    fn test_at_least_one_attribute_configured() {
        let v = at_least_one_attribute_configured(&["a", "b"]);
        assert!(check(&v, &Value::object([("a", Value::string("x")), ("b", Value::Null)])).is_empty());
        assert_eq!(
            check(&v, &Value::object([("a", Value::Null), ("b", Value::Null)])).error_count(),
            1
        );
        assert!(check(&v, &Value::object([("a", Value::Null), ("b", Value::Unknown)])).is_empty());
        assert!(check(&v, &Value::Null).is_empty());
    }

    #[test]
    fn test_not_null() {
        assert_eq!(check(&not_null(), &Value::Null).error_count(), 1);
        assert!(check(&not_null(), &Value::Unknown).is_empty());
    }
}
