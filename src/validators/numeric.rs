//! Numeric validators. All comparisons use exact decimal arithmetic.

use rust_decimal::Decimal;

use crate::diag::Diagnostics;
use crate::value::PathExpression;

use super::traverse::{resolve, Resolution};
use super::{AttributeValidator, ValidationRequest};

/// Integer must be exactly divisible by a fixed divisor.
#[derive(Debug, Clone, Copy)]
pub struct IsDivisibleBy {
    divisor: i64,
}

/// Builds an [`IsDivisibleBy`] validator.
#[must_use]
pub const fn is_divisible_by(divisor: i64) -> IsDivisibleBy {
    IsDivisibleBy { divisor }
}

impl AttributeValidator for IsDivisibleBy {
    fn description(&self) -> String {
        format!("value must be divisible by {}", self.divisor)
    }

    fn validate(&self, req: &ValidationRequest<'_>, diags: &mut Diagnostics) {
        let Some(value) = req.value.as_decimal() else {
            return;
        };
        let divisible = value
            .checked_rem(Decimal::from(self.divisor))
            .is_some_and(|rem| rem.is_zero());
        if !divisible {
            diags.error(
                req.path.clone(),
                "Invalid Attribute Value",
                format!("Attribute {} must be divisible by {}", req.path, self.divisor),
            );
        }
    }
}

/// Integer must be strictly greater than the value at another path.
#[derive(Debug, Clone)]
pub struct IsGreaterThanPathValue {
    expression: PathExpression,
}

/// Builds an [`IsGreaterThanPathValue`] validator.
#[must_use]
pub const fn is_greater_than_path_value(expression: PathExpression) -> IsGreaterThanPathValue {
    IsGreaterThanPathValue { expression }
}

impl AttributeValidator for IsGreaterThanPathValue {
    fn description(&self) -> String {
        format!("value must be greater than the value at {}", self.expression)
    }

    fn validate(&self, req: &ValidationRequest<'_>, diags: &mut Diagnostics) {
        let Some(value) = req.value.as_decimal() else {
            return;
        };
        let Resolution::Resolved(matches) = resolve(req, std::slice::from_ref(&self.expression), diags)
        else {
            return;
        };
        for m in matches {
            let Some(other) = m.value.as_decimal() else {
                continue;
            };
            if value <= other {
                diags.error(
                    req.path.clone(),
                    "Invalid Attribute Value",
                    format!("Attribute {} must be greater than the value at {}", req.path, m.path),
                );
            }
        }
    }
}

/// Integer must lie within an inclusive range.
#[derive(Debug, Clone, Copy)]
pub struct IntBetween {
    min: i64,
    max: i64,
}

/// Builds an [`IntBetween`] validator.
#[must_use]
pub const fn int_between(min: i64, max: i64) -> IntBetween {
    IntBetween { min, max }
}

impl AttributeValidator for IntBetween {
    fn description(&self) -> String {
        format!("value must be between {} and {}", self.min, self.max)
    }

    fn validate(&self, req: &ValidationRequest<'_>, diags: &mut Diagnostics) {
        let Some(value) = req.value.as_i64() else {
            return;
        };
        if value < self.min || value > self.max {
            diags.error(
                req.path.clone(),
                "Invalid Attribute Value",
                format!("Attribute {} {}", req.path, self.description()),
            );
        }
    }
}
