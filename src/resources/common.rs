//! Request helpers shared by the resource handlers.

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::client::{classify, should_treat_as_destroyed, ApiRequest, ApiResponse};
use crate::diag::Diagnostics;
use crate::error::{LifecycleError, ProviderError, Result};
use crate::lifecycle::OpContext;
use crate::value::Value;

/// Reads one object, returning `None` (and a warning) when it is gone.
///
/// The request is scoped to `environment_id` so a deleted environment reads
/// as gone, and retries role-propagation 403s.
pub async fn read_one(
    ctx: &OpContext<'_>,
    operation: &str,
    path: &str,
    environment_id: Option<&str>,
    diags: &mut Diagnostics,
) -> Result<Option<JsonValue>> {
    let mut request = ApiRequest::get(operation, path).retry_on_propagation();
    if let Some(env) = environment_id {
        request = request.in_environment(env);
    }
    let outcome = ctx.client.send(&request).await;
    if should_treat_as_destroyed(&outcome) {
        let error = match &outcome {
            Ok(ApiResponse::NotFound { error, .. }) => error.as_ref(),
            _ => None,
        };
        classify::not_found_warning(diags, error);
        return Ok(None);
    }
    Ok(Some(outcome?.into_body(operation)?))
}

/// Sends a request whose response body is required.
pub async fn send_body(ctx: &OpContext<'_>, request: &ApiRequest) -> Result<JsonValue> {
    let response = ctx.client.send(request).await?;
    Ok(response.into_body(&request.operation)?)
}

/// Deletes one object; an object that is already gone counts as deleted.
pub async fn delete_one(ctx: &OpContext<'_>, operation: &str, path: &str, environment_id: Option<&str>) -> Result<()> {
    let mut request = ApiRequest::delete(operation, path);
    if let Some(env) = environment_id {
        request = request.in_environment(env);
    }
    if ctx.client.send(&request).await?.is_not_found() {
        debug!(address = ctx.address, "Resource already deleted");
    }
    Ok(())
}

/// Returns a known string attribute or a `MissingValue` error.
pub fn require_str<'v>(value: &'v Value, attr: &str, resource_type: &str) -> Result<&'v str> {
    value.attr(attr).as_str().ok_or_else(|| {
        ProviderError::Lifecycle(LifecycleError::MissingValue {
            resource_type: resource_type.to_string(),
            message: format!("`{attr}` is not known"),
        })
    })
}

/// Inserts `value` into `body` under `key` when it is a known string.
pub fn put_str(body: &mut serde_json::Map<String, JsonValue>, key: &str, value: &Value) {
    if let Some(s) = value.as_str() {
        body.insert(key.to_string(), JsonValue::String(s.to_string()));
    }
}

/// Writes an explicit JSON null under `key` when `planned` clears a value
/// that `prior` held. A PATCH leaves keys it does not receive untouched.
pub fn clear_removed(body: &mut serde_json::Map<String, JsonValue>, key: &str, prior: &Value, planned: &Value) {
    if planned.is_null() && !prior.is_null() && !body.contains_key(key) {
        body.insert(key.to_string(), JsonValue::Null);
    }
}

/// String at a JSON pointer of a response body, or null.
#[must_use]
pub fn string_at(body: &JsonValue, pointer: &str) -> Value {
    body.pointer(pointer)
        .and_then(JsonValue::as_str)
        .map_or(Value::Null, Value::string)
}

/// Boolean at a JSON pointer of a response body, or null.
#[must_use]
pub fn bool_at(body: &JsonValue, pointer: &str) -> Value {
    body.pointer(pointer).and_then(JsonValue::as_bool).map_or(Value::Null, Value::Bool)
}

/// Integer at a JSON pointer of a response body, or null.
#[must_use]
pub fn int_at(body: &JsonValue, pointer: &str) -> Value {
    body.pointer(pointer).and_then(JsonValue::as_i64).map_or(Value::Null, Value::Int64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pointer_helpers() {
        let body = json!({ "name": "staff", "enabled": true, "days": 30, "license": { "id": "l-1" } });
        assert_eq!(string_at(&body, "/name"), Value::string("staff"));
        assert_eq!(string_at(&body, "/license/id"), Value::string("l-1"));
        assert_eq!(string_at(&body, "/missing"), Value::Null);
        assert_eq!(bool_at(&body, "/enabled"), Value::Bool(true));
        assert_eq!(int_at(&body, "/days"), Value::Int64(30));
        assert_eq!(int_at(&body, "/name"), Value::Null);
    }

    #[test]
    fn test_require_str() {
        let value = Value::object([("id", Value::string("x")), ("other", Value::Unknown)]);
        assert_eq!(require_str(&value, "id", "t").expect("id"), "x");
        assert!(matches!(
            require_str(&value, "other", "t"),
            Err(ProviderError::Lifecycle(LifecycleError::MissingValue { .. }))
        ));
    }

    #[test]
    fn test_put_str_skips_null() {
        let mut body = serde_json::Map::new();
        put_str(&mut body, "a", &Value::string("x"));
        put_str(&mut body, "b", &Value::Null);
        assert_eq!(JsonValue::Object(body), json!({ "a": "x" }));
    }

    #[test]
    fn test_clear_removed_only_for_cleared_values() {
        let mut body = serde_json::Map::new();
        clear_removed(&mut body, "a", &Value::string("old"), &Value::Null);
        clear_removed(&mut body, "b", &Value::Null, &Value::Null);
        clear_removed(&mut body, "c", &Value::string("old"), &Value::string("new"));
        assert_eq!(JsonValue::Object(body), json!({ "a": null }));
    }
}
