//! Shared path-expression traversal for cross-attribute validators.

use crate::diag::Diagnostics;
use crate::value::{Match, Path, PathExpression};

use super::ValidationRequest;

/// Outcome of resolving a validator's path expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// A referenced value is not known yet; the validator must stay silent.
    Deferred,
    /// Every matched path with a fully known value, excluding the attribute itself.
    Resolved(Vec<Match>),
}

impl Resolution {
    /// Returns the matches, or an empty slice when deferred.
    #[must_use]
    pub fn matches(&self) -> &[Match] {
        match self {
            Self::Deferred => &[],
            Self::Resolved(matches) => matches,
        }
    }
}

/// Resolves `expressions` relative to the attribute under validation.
///
/// Matched paths equal to the attribute's own path are skipped. If the
/// attribute value or any matched value is not fully known the whole
/// resolution is [`Resolution::Deferred`]. Expressions that do not fit the
/// schema are reported as errors at the attribute path and also defer.
pub fn resolve(
    req: &ValidationRequest<'_>,
    expressions: &[PathExpression],
    diags: &mut Diagnostics,
) -> Resolution {
    if req.value.is_unknown() {
        return Resolution::Deferred;
    }

    let mut out = Vec::new();
    for expression in expressions {
        let matched = expression
            .resolve(req.path)
            .and_then(|absolute| absolute.matches(req.config, req.root_type));
        let matched = match matched {
            Ok(matched) => matched,
            Err(e) => {
                diags.error(
                    req.path.clone(),
                    "Invalid Attribute Path Expression",
                    e.to_string(),
                );
                return Resolution::Deferred;
            }
        };

        for m in matched {
            if is_self(&m.path, req.path) {
                continue;
            }
            if !m.value.is_fully_known() {
                return Resolution::Deferred;
            }
            out.push(m);
        }
    }
    Resolution::Resolved(out)
}

fn is_self(candidate: &Path, own: &Path) -> bool {
    candidate == own
}

/// Renders a list of expressions for validator descriptions.
#[must_use]
pub fn describe_expressions(expressions: &[PathExpression]) -> String {
    let rendered: Vec<String> = expressions.iter().map(ToString::to_string).collect();
    format!("[{}]", rendered.join(", "))
}
