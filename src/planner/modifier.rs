//! Plan modifiers.
//!
//! A modifier may rewrite the proposed value of its attribute and may flag
//! the attribute as requiring replacement. Modifiers attached to an
//! attribute run in declaration order, each seeing the previous one's output.

use std::fmt;

use crate::value::{equal, AttrType, Path, Value};

/// Inputs visible to a plan modifier.
#[derive(Debug, Clone, Copy)]
pub struct ModifierRequest<'a> {
    /// Attribute path.
    pub path: &'a Path,
    /// Attribute type.
    pub ty: &'a AttrType,
    /// Configuration value.
    pub config: &'a Value,
    /// Prior state value; null when the resource is being created.
    pub prior: &'a Value,
    /// Whether the resource already exists.
    pub resource_exists: bool,
}

/// The proposed value and replacement flag, updated in place by modifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct ModifierResponse {
    /// Proposed value of the attribute.
    pub plan_value: Value,
    /// Whether a change of this attribute forces destroy-then-create.
    pub requires_replace: bool,
}

/// A hook that may rewrite a proposed attribute value during planning.
pub trait PlanModifier: fmt::Debug + Send + Sync {
    /// Human-readable description.
    fn description(&self) -> String;

    /// Updates `resp` for the attribute described by `req`.
    fn modify(&self, req: &ModifierRequest<'_>, resp: &mut ModifierResponse);
}

/// Substitutes a value when configuration is null and the plan is not yet decided.
#[derive(Debug, Clone)]
pub struct DefaultValue {
    value: Value,
}

/// Builds a [`DefaultValue`] modifier.
#[must_use]
pub fn default_value(value: impl Into<Value>) -> DefaultValue {
    DefaultValue {
        value: value.into(),
    }
}

impl PlanModifier for DefaultValue {
    fn description(&self) -> String {
        format!("defaults to {}", self.value)
    }

    fn modify(&self, req: &ModifierRequest<'_>, resp: &mut ModifierResponse) {
        if req.config.is_null() && (resp.plan_value.is_null() || resp.plan_value.is_unknown()) {
            resp.plan_value = self.value.clone();
        }
    }
}

/// Carries the prior state value through an unknown plan value.
#[derive(Debug, Clone, Copy)]
pub struct UseStateForUnknown;

/// Builds a [`UseStateForUnknown`] modifier.
#[must_use]
pub const fn use_state_for_unknown() -> UseStateForUnknown {
    UseStateForUnknown
}

impl PlanModifier for UseStateForUnknown {
    fn description(&self) -> String {
        String::from("value does not change once known")
    }

    fn modify(&self, req: &ModifierRequest<'_>, resp: &mut ModifierResponse) {
        if !req.resource_exists || req.prior.is_null() || !req.config.is_null() {
            return;
        }
        if resp.plan_value.is_unknown() {
            resp.plan_value = req.prior.clone();
        }
    }
}

/// Predicate deciding whether a change requires replacement.
pub type ReplacePredicate = fn(&ModifierRequest<'_>, &Value) -> bool;

/// Flags the attribute as requiring replacement when it changes and the
/// predicate holds.
#[derive(Clone)]
pub struct RequiresReplaceIf {
    predicate: ReplacePredicate,
    description: String,
}

impl fmt::Debug for RequiresReplaceIf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequiresReplaceIf")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Builds a modifier that always requires replacement on change.
#[must_use]
pub fn requires_replace() -> RequiresReplaceIf {
    requires_replace_if(|_, _| true, "changing this value forces a new resource")
}

/// Builds a [`RequiresReplaceIf`] modifier.
#[must_use]
pub fn requires_replace_if(predicate: ReplacePredicate, description: &str) -> RequiresReplaceIf {
    RequiresReplaceIf {
        predicate,
        description: description.to_string(),
    }
}

impl PlanModifier for RequiresReplaceIf {
    fn description(&self) -> String {
        self.description.clone()
    }

    fn modify(&self, req: &ModifierRequest<'_>, resp: &mut ModifierResponse) {
        if !req.resource_exists {
            return;
        }
        if equal(&resp.plan_value, req.prior, req.ty) {
            return;
        }
        if (self.predicate)(req, &resp.plan_value) {
            resp.requires_replace = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(modifier: &dyn PlanModifier, config: Value, prior: Value, plan: Value, exists: bool) -> ModifierResponse {
        let path = Path::root().attr("field");
        let req = ModifierRequest {
            path: &path,
            ty: &AttrType::String,
            config: &config,
            prior: &prior,
            resource_exists: exists,
        };
        let mut resp = ModifierResponse {
            plan_value: plan,
            requires_replace: false,
        };
        modifier.modify(&req, &mut resp);
        resp
    }

    #[test]
    fn test_default_value() {
        let m = default_value("NA");
        assert_eq!(run(&m, Value::Null, Value::Null, Value::Null, false).plan_value, Value::string("NA"));
        assert_eq!(
            run(&m, Value::string("EU"), Value::Null, Value::string("EU"), false).plan_value,
            Value::string("EU")
        );
    }

    #[test]
    fn test_use_state_for_unknown() {
        let m = use_state_for_unknown();
        let resp = run(&m, Value::Null, Value::string("id-1"), Value::Unknown, true);
        assert_eq!(resp.plan_value, Value::string("id-1"));

        let resp = run(&m, Value::Null, Value::Null, Value::Unknown, false);
        assert_eq!(resp.plan_value, Value::Unknown);
    }

    #[test]
    fn test_requires_replace_only_on_change_of_existing() {
        let m = requires_replace();
        assert!(run(&m, Value::string("EU"), Value::string("NA"), Value::string("EU"), true).requires_replace);
        assert!(!run(&m, Value::string("NA"), Value::string("NA"), Value::string("NA"), true).requires_replace);
        assert!(!run(&m, Value::string("EU"), Value::Null, Value::string("EU"), false).requires_replace);
    }

    #[test]
    fn test_requires_replace_if_predicate() {
        let m = requires_replace_if(|_, plan| plan.is_null(), "removing forces a new resource");
        assert!(run(&m, Value::Null, Value::string("x"), Value::Null, true).requires_replace);
        assert!(!run(&m, Value::string("y"), Value::string("x"), Value::string("y"), true).requires_replace);
    }
}
