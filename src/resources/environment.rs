//! `pingone_environment`.
//!
//! The environment type has its own endpoint: a type change is applied with
//! `PUT /environments/{id}/type` before the general update, and production
//! environments are demoted to sandbox before they can be deleted.

use async_trait::async_trait;
use serde_json::{json, Map, Value as JsonValue};
use tracing::{debug, info};

use crate::client::{ApiRequest, ApiResponse, Region};
use crate::diag::Diagnostics;
use crate::error::Result;
use crate::lifecycle::{OpContext, ReadOutcome, ResourceHandler, UpdateOutcome};
use crate::planner::{requires_replace, use_state_for_unknown};
use crate::schema::{Attribute, Schema};
use crate::validators::{length_between, one_of};
use crate::value::{AttrType, Value};

use super::common::{delete_one, put_str, read_one, require_str, send_body, string_at};

/// Resource type name.
pub const NAME: &str = "pingone_environment";

const TYPE_SANDBOX: &str = "SANDBOX";
const TYPE_PRODUCTION: &str = "PRODUCTION";

/// Current schema.
#[must_use]
pub fn schema() -> Schema {
    let regions: Vec<&str> = Region::ALL.iter().map(|r| r.code()).collect();
    Schema::new(
        0,
        "A PingOne environment.",
        [
            (
                "id",
                Attribute::computed(AttrType::ResourceId)
                    .describe("The ID of the environment.")
                    .modifier(use_state_for_unknown()),
            ),
            (
                "name",
                Attribute::required(AttrType::String)
                    .describe("The name of the environment.")
                    .validator(length_between(1, 256)),
            ),
            ("description", Attribute::optional(AttrType::String)),
            (
                "type",
                Attribute::optional_computed(AttrType::String)
                    .describe("The type of the environment.")
                    .default_value(Value::string(TYPE_SANDBOX))
                    .validator(one_of(&[TYPE_SANDBOX, TYPE_PRODUCTION])),
            ),
            (
                "region",
                Attribute::required(AttrType::String)
                    .describe("The region the environment is hosted in. Changing it forces a new environment.")
                    .validator(one_of(&regions))
                    .modifier(requires_replace()),
            ),
            (
                "license_id",
                Attribute::required(AttrType::ResourceId).describe("The license the environment consumes."),
            ),
            (
                "organization_id",
                Attribute::computed(AttrType::ResourceId).modifier(use_state_for_unknown()),
            ),
        ],
    )
}

/// Handler for `pingone_environment`.
#[derive(Debug, Default)]
pub struct EnvironmentHandler;

impl EnvironmentHandler {
    fn body(planned: &Value) -> JsonValue {
        let mut body = Map::new();
        put_str(&mut body, "name", planned.attr("name"));
        put_str(&mut body, "description", planned.attr("description"));
        put_str(&mut body, "type", planned.attr("type"));
        put_str(&mut body, "region", planned.attr("region"));
        if let Some(license) = planned.attr("license_id").as_str() {
            body.insert(String::from("license"), json!({ "id": license }));
        }
        JsonValue::Object(body)
    }

    fn state(body: &JsonValue) -> Value {
        Value::object([
            ("id", string_at(body, "/id")),
            ("name", string_at(body, "/name")),
            ("description", string_at(body, "/description")),
            ("type", string_at(body, "/type")),
            ("region", string_at(body, "/region")),
            ("license_id", string_at(body, "/license/id")),
            ("organization_id", string_at(body, "/organization/id")),
        ])
    }

    /// Switches the environment type; `false` when the environment is gone.
    async fn change_type(ctx: &OpContext<'_>, id: &str, to: &str) -> Result<bool> {
        info!(environment_id = id, to, "Changing environment type");
        let request = ApiRequest::put(
            "UpdateEnvironmentType",
            format!("/environments/{id}/type"),
            json!({ "type": to }),
        );
        Ok(!ctx.client.send(&request).await?.is_not_found())
    }
}

#[async_trait]
impl ResourceHandler for EnvironmentHandler {
    async fn create(&self, ctx: &OpContext<'_>, planned: &Value, _diags: &mut Diagnostics) -> Result<Value> {
        let request = ApiRequest::post("CreateEnvironmentActiveLicense", "/environments", Self::body(planned));
        let body = send_body(ctx, &request).await?;
        let state = Self::state(&body);
        ctx.partial.record(state.clone());
        Ok(state)
    }

    async fn read(&self, ctx: &OpContext<'_>, current: &Value, diags: &mut Diagnostics) -> Result<ReadOutcome> {
        let id = require_str(current, "id", NAME)?;
        let found = read_one(ctx, "ReadOneEnvironment", &format!("/environments/{id}"), None, diags).await?;
        Ok(found.map_or(ReadOutcome::NotFound, |body| ReadOutcome::Found(Self::state(&body))))
    }

    async fn update(
        &self,
        ctx: &OpContext<'_>,
        prior: &Value,
        planned: &Value,
        _diags: &mut Diagnostics,
    ) -> Result<UpdateOutcome> {
        let id = require_str(prior, "id", NAME)?;

        if let Some(to) = planned.attr("type").as_str()
            && prior.attr("type").as_str() != Some(to)
            && !Self::change_type(ctx, id, to).await?
        {
            return Ok(UpdateOutcome::NotFound);
        }

        let request = ApiRequest::put("UpdateEnvironment", format!("/environments/{id}"), Self::body(planned));
        match ctx.client.send(&request).await? {
            ApiResponse::Ok { body, .. } => Ok(UpdateOutcome::Updated(Self::state(&body))),
            ApiResponse::NotFound { .. } => Ok(UpdateOutcome::NotFound),
        }
    }

    async fn delete(&self, ctx: &OpContext<'_>, current: &Value, _diags: &mut Diagnostics) -> Result<()> {
        let id = require_str(current, "id", NAME)?;
        if current.attr("type").as_str() == Some(TYPE_PRODUCTION) && !Self::change_type(ctx, id, TYPE_SANDBOX).await? {
            debug!(environment_id = id, "Environment already deleted");
            return Ok(());
        }
        delete_one(ctx, "DeleteEnvironment", &format!("/environments/{id}"), None).await
    }

    async fn exists(&self, ctx: &OpContext<'_>, id: &str) -> Result<bool> {
        Ok(ctx.client.environment_exists(id).await?)
    }
}
