//! Classification of PingOne error responses.
//!
//! PingOne reports failures as `{id, code, message, details[]}` bodies. This
//! module decodes them, renders them for diagnostics, and maps status codes
//! onto [`ApiError`] classes.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::diag::Diagnostics;
use crate::error::ApiError;

use super::api::ApiResponse;

/// Summary of the warning emitted when a read finds nothing.
pub const NOT_FOUND_SUMMARY: &str = "Requested resource not found";

const NOT_FOUND_DETAIL: &str = "The requested resource configuration cannot be found in the PingOne service.  If the requested resource is tracked in state, it may have been removed outside of this tool.";

#[allow(clippy::expect_used)]
static PROPAGATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^The actor attempting to perform the request is not authorized").expect("propagation pattern is valid")
});

/// A PingOne error body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct P1Error {
    /// Correlation id of the failed request.
    #[serde(default)]
    pub id: String,
    /// Top-level error code, e.g. `INVALID_DATA`.
    #[serde(default)]
    pub code: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Per-field details.
    #[serde(default)]
    pub details: Vec<P1ErrorDetail>,
}

/// One entry of [`P1Error::details`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct P1ErrorDetail {
    /// Detail code, e.g. `INVALID_VALUE`.
    pub code: Option<String>,
    /// Detail message.
    pub message: Option<String>,
    /// Offending attribute.
    pub target: Option<String>,
    /// Constraint hints.
    pub inner_error: Option<P1InnerError>,
}

/// Constraint hints attached to an error detail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct P1InnerError {
    /// Smallest allowed value.
    pub range_minimum_value: Option<i64>,
    /// Largest allowed value.
    pub range_maximum_value: Option<i64>,
    /// Pattern the value must match.
    pub allowed_pattern: Option<String>,
    /// Enumerated allowed values.
    pub allowed_values: Option<Vec<String>>,
    /// Maximum value.
    pub maximum_value: Option<i64>,
    /// Values that reference the resource.
    pub referenced_values: Option<Vec<String>>,
}

impl P1Error {
    /// Decodes an error body; returns `None` unless it carries an id or code.
    #[must_use]
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str::<Self>(body)
            .ok()
            .filter(|e| !e.id.is_empty() || !e.code.is_empty())
    }

    fn mentions(&self, needle: &str) -> bool {
        self.code.contains(needle)
            || self
                .details
                .iter()
                .filter_map(|d| d.code.as_deref())
                .any(|c| c.contains(needle))
    }
}

/// Renders a PingOne error as a diagnostic `(summary, detail)` pair.
#[must_use]
pub fn format_pingone_error(operation: &str, error: &P1Error) -> (String, String) {
    let summary = format!("Error when calling `{operation}`: {}", error.message);
    let mut detail = format!(
        "PingOne Error Details:\nID:\t\t{}\nCode:\t\t{}\nMessage:\t{}",
        error.id, error.code, error.message
    );

    if !error.details.is_empty() {
        let rendered: Vec<String> = error.details.iter().map(format_detail).collect();
        let _ = write!(detail, "\nDetails:\n{}", rendered.join("\n"));
    }

    (summary, detail)
}

fn format_detail(detail: &P1ErrorDetail) -> String {
    let mut out = String::new();
    let mut marker = "-";

    for (label, value) in [
        ("Code", &detail.code),
        ("Message", &detail.message),
        ("Target", &detail.target),
    ] {
        if let Some(value) = value {
            let _ = writeln!(out, "  {marker} {label}:\t{value}");
            marker = " ";
        }
    }

    if let Some(inner) = &detail.inner_error {
        let _ = writeln!(out, "  {marker} Data:");
        if let Some(v) = inner.range_minimum_value {
            let _ = writeln!(out, "      Range Min Value:\t{v}");
        }
        if let Some(v) = inner.range_maximum_value {
            let _ = writeln!(out, "      Range Max Value:\t{v}");
        }
        if let Some(v) = &inner.allowed_pattern {
            let _ = writeln!(out, "      Allowed Pattern:\t{v}");
        }
        if let Some(v) = &inner.allowed_values {
            let _ = writeln!(out, "      Allowed Values:\t[{}]", v.join(", "));
        }
        if let Some(v) = inner.maximum_value {
            let _ = writeln!(out, "      Max Value:\t{v}");
        }
        if let Some(v) = &inner.referenced_values {
            let _ = writeln!(out, "      Referenced Values:\t[{}]", v.join(", "));
        }
    }

    out
}

/// Maps a non-success, non-404 response onto an [`ApiError`].
///
/// `attempts` is the number of requests made, reported for 5xx responses
/// that exhausted the retry policy.
#[must_use]
pub fn classify(operation: &str, status: u16, body: &str, attempts: u32) -> ApiError {
    let parsed = P1Error::parse(body);
    let operation = operation.to_string();

    if let Some(err) = &parsed
        && let Some(first) = err.details.first()
        && first.code.as_deref() == Some("INVALID_VALUE")
        && first.target.as_deref() == Some("name")
    {
        let message = first.message.clone().unwrap_or_default();
        return ApiError::Conflict {
            operation,
            status,
            detail: format!(
                "{message}\nThe name may already be in use by another resource of the same type in this environment."
            ),
            message: format!("Invalid value for name: {message}"),
        };
    }

    let (message, detail) = parsed.as_ref().map_or_else(
        || (fallback_message(status, body), String::new()),
        |err| {
            let (_, detail) = format_pingone_error(&operation, err);
            (err.message.clone(), detail)
        },
    );

    match status {
        409 => ApiError::Conflict {
            operation,
            status,
            message,
            detail,
        },
        422 if parsed
            .as_ref()
            .is_some_and(|e| e.mentions("UNIQUENESS") || e.mentions("CONFLICT")) =>
        {
            ApiError::Conflict {
                operation,
                status,
                message,
                detail,
            }
        }
        401 | 403 => ApiError::PermissionOrScope {
            operation,
            status,
            message,
            detail,
        },
        400..=499 => ApiError::InvalidRequest {
            operation,
            status,
            message,
            detail,
        },
        500..=599 => ApiError::Upstream {
            operation,
            status,
            attempts,
            message,
            detail,
        },
        _ => ApiError::InvalidResponse {
            operation,
            message: format!("unexpected status {status}: {message}"),
        },
    }
}

fn fallback_message(status: u16, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("unexpected response")
            .to_string()
    } else {
        trimmed.chars().take(512).collect()
    }
}

/// Returns true if `body` reports a role assignment that has not yet
/// propagated, which PingOne resolves on its own within seconds.
#[must_use]
pub fn is_permission_propagation(status: u16, body: &str) -> bool {
    status == 403 && P1Error::parse(body).is_some_and(|e| PROPAGATION_REGEX.is_match(&e.message))
}

/// Renders an API error as a diagnostic `(summary, detail)` pair.
#[must_use]
pub fn error_diagnostic(error: &ApiError) -> (String, String) {
    match error {
        ApiError::Conflict {
            operation, message, ..
        }
        | ApiError::InvalidRequest {
            operation, message, ..
        }
        | ApiError::PermissionOrScope {
            operation, message, ..
        }
        | ApiError::Upstream {
            operation, message, ..
        } => (
            format!("Error when calling `{operation}`: {message}"),
            error.detail().to_string(),
        ),
        ApiError::Transport {
            operation,
            attempts,
            message,
        } => (
            format!("Error when calling `{operation}`: {message}"),
            format!("The request failed after {attempts} attempt(s)."),
        ),
        ApiError::InvalidResponse { operation, message } => (
            format!("Error when calling `{operation}`: {message}"),
            String::from("The response from the PingOne service could not be decoded."),
        ),
        ApiError::AuthExpired { message } | ApiError::Authentication { message } => {
            (String::from("Authentication failure"), message.clone())
        }
    }
}

/// Appends the warning reported when a read finds nothing.
pub fn not_found_warning(diags: &mut Diagnostics, error: Option<&P1Error>) {
    let detail = match error {
        Some(err) if err.code == "NOT_FOUND" => format!("{NOT_FOUND_DETAIL}\nAPI error: {}", err.message),
        _ => String::from(NOT_FOUND_DETAIL),
    };
    diags.warning(None, NOT_FOUND_SUMMARY, detail);
}

/// Returns true if a body carries a deletion tombstone.
#[must_use]
pub fn has_tombstone(body: &JsonValue) -> bool {
    ["deletedAt", "deleted_at"]
        .iter()
        .any(|key| body.get(key).is_some_and(|v| !v.is_null()))
}

/// Decides whether an API outcome means the remote resource is gone.
///
/// True for a 404, for a scoped error whose environment no longer exists,
/// and for a body carrying a deletion tombstone. Errors never count.
#[must_use]
pub fn should_treat_as_destroyed(outcome: &Result<ApiResponse, ApiError>) -> bool {
    match outcome {
        Ok(ApiResponse::NotFound { .. }) => true,
        Ok(ApiResponse::Ok { body, .. }) => has_tombstone(body),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::api::NotFoundReason;
    use serde_json::json;

    fn body(value: &JsonValue) -> String {
        value.to_string()
    }

    #[test]
    fn test_format_pingone_error() {
        let err = P1Error::parse(&body(&json!({
            "id": "abc",
            "code": "INVALID_DATA",
            "message": "The request could not be completed.",
            "details": [{
                "code": "INVALID_VALUE",
                "target": "sessionTimeout",
                "message": "Must be between 1 and 10",
                "innerError": {"rangeMinimumValue": 1, "rangeMaximumValue": 10}
            }]
        })))
        .unwrap_or_default();

        let (summary, detail) = format_pingone_error("UpdatePopulation", &err);
        assert_eq!(
            summary,
            "Error when calling `UpdatePopulation`: The request could not be completed."
        );
        assert!(detail.starts_with("PingOne Error Details:\nID:\t\tabc\nCode:\t\tINVALID_DATA"));
        assert!(detail.contains("\nDetails:\n  - Code:\tINVALID_VALUE\n"));
        assert!(detail.contains("    Message:\tMust be between 1 and 10\n"));
        assert!(detail.contains("    Target:\tsessionTimeout\n"));
        assert!(detail.contains("    Data:\n      Range Min Value:\t1\n      Range Max Value:\t10\n"));
    }

    #[test]
    fn test_classify_statuses() {
        let p1 = body(&json!({"id": "1", "code": "X", "message": "nope"}));
        assert!(matches!(classify("Op", 409, &p1, 1), ApiError::Conflict { .. }));
        assert!(matches!(classify("Op", 403, &p1, 1), ApiError::PermissionOrScope { .. }));
        assert!(matches!(classify("Op", 401, &p1, 1), ApiError::PermissionOrScope { .. }));
        assert!(matches!(classify("Op", 400, &p1, 1), ApiError::InvalidRequest { .. }));
        assert!(matches!(classify("Op", 422, &p1, 1), ApiError::InvalidRequest { .. }));
        assert!(matches!(
            classify("Op", 503, &p1, 5),
            ApiError::Upstream { attempts: 5, status: 503, .. }
        ));
    }

    #[test]
    fn test_classify_uniqueness_422_is_conflict() {
        let p1 = body(&json!({
            "id": "1", "code": "INVALID_DATA", "message": "dup",
            "details": [{"code": "UNIQUENESS_VIOLATION", "target": "key"}]
        }));
        assert!(matches!(classify("Op", 422, &p1, 1), ApiError::Conflict { .. }));
    }

    #[test]
    fn test_invalid_value_on_name() {
        let p1 = body(&json!({
            "id": "1", "code": "INVALID_DATA", "message": "bad",
            "details": [{"code": "INVALID_VALUE", "target": "name", "message": "name must be unique"}]
        }));
        let err = classify("CreatePopulation", 400, &p1, 1);
        assert!(matches!(err, ApiError::Conflict { .. }));
        assert!(err.to_string().contains("Invalid value for name: name must be unique"));
    }

    #[test]
    fn test_non_json_body_falls_back_to_text() {
        let err = classify("Op", 502, "", 3);
        assert!(err.to_string().contains("Bad Gateway"));
        assert_eq!(err.detail(), "");
    }

    #[test]
    fn test_permission_propagation() {
        let p1 = body(&json!({
            "id": "1", "code": "ACCESS_FAILED",
            "message": "The actor attempting to perform the request is not authorized."
        }));
        assert!(is_permission_propagation(403, &p1));
        assert!(!is_permission_propagation(400, &p1));
        assert!(!is_permission_propagation(403, "{}"));
    }

    #[test]
    fn test_not_found_warning() {
        let mut diags = Diagnostics::new();
        let err = P1Error {
            code: String::from("NOT_FOUND"),
            message: String::from("Unable to find population"),
            ..P1Error::default()
        };
        not_found_warning(&mut diags, Some(&err));
        let warning = diags.warnings().next();
        assert_eq!(warning.map(|w| w.summary.as_str()), Some(NOT_FOUND_SUMMARY));
        assert!(warning.is_some_and(|w| w.detail.ends_with("API error: Unable to find population")));
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_should_treat_as_destroyed() {
        assert!(should_treat_as_destroyed(&Ok(ApiResponse::NotFound {
            reason: NotFoundReason::Resource,
            error: None,
        })));
        assert!(should_treat_as_destroyed(&Ok(ApiResponse::NotFound {
            reason: NotFoundReason::EnvironmentGone,
            error: None,
        })));
        assert!(should_treat_as_destroyed(&Ok(ApiResponse::Ok {
            status: 200,
            body: json!({"id": "x", "deletedAt": "2024-01-01T00:00:00Z"}),
        })));
        assert!(!should_treat_as_destroyed(&Ok(ApiResponse::Ok {
            status: 200,
            body: json!({"id": "x", "deletedAt": null}),
        })));
        assert!(!should_treat_as_destroyed(&Err(ApiError::authentication("x"))));
    }
}
