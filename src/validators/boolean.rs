//! Boolean validators.

use crate::diag::Diagnostics;
use crate::value::PathExpression;

use super::traverse::{describe_expressions, resolve, Resolution};
use super::{AttributeValidator, ValidationRequest};

/// Among this attribute and the matched paths, at least one must be true.
///
/// Null values count as their declared default: `attribute_default` for the
/// attribute itself and `expression_default` for every matched path. Exactly
/// one diagnostic is emitted when nothing is true.
#[derive(Debug, Clone)]
pub struct AtLeastOneOfMustBeTrue {
    attribute_default: bool,
    expression_default: bool,
    expressions: Vec<PathExpression>,
}

/// Builds an [`AtLeastOneOfMustBeTrue`] validator.
#[must_use]
pub fn at_least_one_of_must_be_true(
    attribute_default: bool,
    expression_default: bool,
    expressions: impl IntoIterator<Item = PathExpression>,
) -> AtLeastOneOfMustBeTrue {
    AtLeastOneOfMustBeTrue {
        attribute_default,
        expression_default,
        expressions: expressions.into_iter().collect(),
    }
}

impl AttributeValidator for AtLeastOneOfMustBeTrue {
    fn description(&self) -> String {
        format!(
            "Ensure that at least one attribute is true from the following: {}",
            describe_expressions(&self.expressions)
        )
    }

    fn validate(&self, req: &ValidationRequest<'_>, diags: &mut Diagnostics) {
        let truthy = |value: &crate::value::Value, default: bool| match value.as_bool() {
            Some(b) => b,
            None => value.is_null() && default,
        };

        if truthy(req.value, self.attribute_default) {
            return;
        }
        let Resolution::Resolved(matches) = resolve(req, &self.expressions, diags) else {
            return;
        };
        if matches.iter().any(|m| truthy(&m.value, self.expression_default)) {
            return;
        }
        diags.error(
            req.path.clone(),
            "Invalid Attribute Combination",
            self.description(),
        );
    }
}
