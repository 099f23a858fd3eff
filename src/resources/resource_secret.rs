//! `pingone_resource_secret`.
//!
//! Manages the client secret of a custom resource. The secret is rotated
//! whenever `regenerate_trigger_values` changes. The secret always exists
//! while its resource does, so deleting only stops tracking it.

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tracing::debug;

use crate::client::ApiRequest;
use crate::diag::Diagnostics;
use crate::error::Result;
use crate::lifecycle::{ImportFormat, OpContext, ReadOutcome, ResourceHandler, UpdateOutcome};
use crate::planner::{requires_replace, use_state_for_unknown};
use crate::schema::{Attribute, ParentRef, Schema};
use crate::value::{AttrType, Value};

use super::common::{read_one, require_str, send_body, string_at};

/// Resource type name.
pub const NAME: &str = "pingone_resource_secret";

/// Current schema.
#[must_use]
pub fn schema() -> Schema {
    Schema::new(
        0,
        "The client secret of a custom resource.",
        [
            (
                "id",
                Attribute::computed(AttrType::ResourceId)
                    .describe("Same as `resource_id`.")
                    .modifier(use_state_for_unknown()),
            ),
            (
                "environment_id",
                Attribute::required(AttrType::ResourceId).modifier(requires_replace()),
            ),
            (
                "resource_id",
                Attribute::required(AttrType::ResourceId).modifier(requires_replace()),
            ),
            (
                "secret",
                Attribute::computed(AttrType::String)
                    .sensitive()
                    .describe("The current secret."),
            ),
            (
                "regenerate_trigger_values",
                Attribute::optional(AttrType::map(AttrType::String))
                    .trigger()
                    .describe("Arbitrary values; any change rotates the secret."),
            ),
        ],
    )
}

/// Parent edge to the owning environment.
#[must_use]
pub fn parent() -> ParentRef {
    ParentRef::new("environment_id", super::environment::NAME)
}

/// `environment_id/resource_id`.
#[must_use]
pub fn import_format() -> ImportFormat {
    ImportFormat::new(&["environment_id", "resource_id"])
}

/// Handler for `pingone_resource_secret`.
#[derive(Debug, Default)]
pub struct ResourceSecretHandler;

impl ResourceSecretHandler {
    fn path(environment_id: &str, resource_id: &str) -> String {
        format!("/environments/{environment_id}/resources/{resource_id}/secret")
    }

    fn state(environment_id: &str, resource_id: &str, body: &JsonValue) -> Value {
        Value::object([
            ("id", Value::string(resource_id)),
            ("environment_id", Value::string(environment_id)),
            ("resource_id", Value::string(resource_id)),
            ("secret", string_at(body, "/secret")),
            ("regenerate_trigger_values", Value::Null),
        ])
    }

    async fn rotate(ctx: &OpContext<'_>, environment_id: &str, resource_id: &str) -> Result<Value> {
        debug!(address = ctx.address, "Rotating resource secret");
        let request = ApiRequest::post("CreateResourceSecret", Self::path(environment_id, resource_id), json!({}))
            .in_environment(environment_id)
            .retry_on_propagation();
        let body = send_body(ctx, &request).await?;
        Ok(Self::state(environment_id, resource_id, &body))
    }
}

#[async_trait]
impl ResourceHandler for ResourceSecretHandler {
    async fn create(&self, ctx: &OpContext<'_>, planned: &Value, _diags: &mut Diagnostics) -> Result<Value> {
        let env = require_str(planned, "environment_id", NAME)?;
        let resource = require_str(planned, "resource_id", NAME)?;
        let state = Self::rotate(ctx, env, resource).await?;
        ctx.partial.record(state.clone());
        Ok(state)
    }

    async fn read(&self, ctx: &OpContext<'_>, current: &Value, diags: &mut Diagnostics) -> Result<ReadOutcome> {
        let env = require_str(current, "environment_id", NAME)?;
        let resource = require_str(current, "resource_id", NAME)?;
        let found = read_one(ctx, "ReadResourceSecret", &Self::path(env, resource), Some(env), diags).await?;
        Ok(found.map_or(ReadOutcome::NotFound, |body| {
            ReadOutcome::Found(Self::state(env, resource, &body))
        }))
    }

    async fn update(
        &self,
        ctx: &OpContext<'_>,
        prior: &Value,
        _planned: &Value,
        _diags: &mut Diagnostics,
    ) -> Result<UpdateOutcome> {
        let env = require_str(prior, "environment_id", NAME)?;
        let resource = require_str(prior, "resource_id", NAME)?;
        Ok(UpdateOutcome::Updated(Self::rotate(ctx, env, resource).await?))
    }

    async fn delete(&self, ctx: &OpContext<'_>, _current: &Value, _diags: &mut Diagnostics) -> Result<()> {
        debug!(address = ctx.address, "Resource secrets cannot be deleted; removing from state only");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_valid() {
        schema().validate_internal(NAME).expect("valid schema");
        assert!(schema().is_sensitive(&crate::value::Path::root().attr("secret")));
    }

    #[test]
    fn test_import_fills_resource_id() {
        let env = "6f3e1b7a-2c4d-4e5f-8a9b-0c1d2e3f4a5b";
        let rid = "0b1c2d3e-4f5a-4b6c-8d7e-9f0a1b2c3d4e";
        let state = import_format().initial_state(&format!("{env}/{rid}")).expect("import id");
        assert_eq!(state.attr("resource_id"), &Value::string(rid));
    }
}
