//! `pingone_agreement`.
//!
//! PingOne only accepts a name when an agreement is created; every other
//! setting is applied by a follow-up update. The identifier is recorded as
//! soon as the first call returns, so a failed configure step leaves the
//! agreement tracked rather than orphaned.

use async_trait::async_trait;
use serde_json::{json, Map, Value as JsonValue};

use crate::client::{ApiRequest, ApiResponse, Pages};
use crate::diag::Diagnostics;
use crate::error::Result;
use crate::lifecycle::{ImportFormat, OpContext, ReadOutcome, ResourceHandler, UpdateOutcome};
use crate::planner::{requires_replace, use_state_for_unknown};
use crate::schema::{Attribute, ParentRef, Schema};
use crate::validators::{int_between, length_between};
use crate::value::{AttrType, Value};

use super::common::{bool_at, delete_one, int_at, put_str, read_one, require_str, send_body, string_at};

/// Resource type name.
pub const NAME: &str = "pingone_agreement";

/// Current schema.
#[must_use]
pub fn schema() -> Schema {
    Schema::new(
        0,
        "An agreement users must consent to.",
        [
            (
                "id",
                Attribute::computed(AttrType::ResourceId).modifier(use_state_for_unknown()),
            ),
            (
                "environment_id",
                Attribute::required(AttrType::ResourceId).modifier(requires_replace()),
            ),
            (
                "name",
                Attribute::required(AttrType::String).validator(length_between(1, 256)),
            ),
            ("description", Attribute::optional(AttrType::String)),
            (
                "enabled",
                Attribute::optional_computed(AttrType::Bool)
                    .describe("Whether users are asked to consent.")
                    .default_value(Value::Bool(false)),
            ),
            (
                "reconsent_period_days",
                Attribute::optional(AttrType::Int64)
                    .describe("Days after which users must consent again.")
                    .validator(int_between(1, 1825)),
            ),
            (
                "languages",
                Attribute::computed(AttrType::set(AttrType::String))
                    .describe("Locales the agreement has been translated into."),
            ),
        ],
    )
}

/// Parent edge to the owning environment.
#[must_use]
pub fn parent() -> ParentRef {
    ParentRef::new("environment_id", super::environment::NAME)
}

/// `environment_id/agreement_id`.
#[must_use]
pub fn import_format() -> ImportFormat {
    ImportFormat::new(&["environment_id", "id"])
}

/// Handler for `pingone_agreement`.
#[derive(Debug, Default)]
pub struct AgreementHandler;

impl AgreementHandler {
    fn body(planned: &Value) -> JsonValue {
        let mut body = Map::new();
        put_str(&mut body, "name", planned.attr("name"));
        put_str(&mut body, "description", planned.attr("description"));
        if let Some(enabled) = planned.attr("enabled").as_bool() {
            body.insert(String::from("enabled"), JsonValue::Bool(enabled));
        }
        if let Some(days) = planned.attr("reconsent_period_days").as_i64() {
            body.insert(String::from("reconsentPeriodDays"), JsonValue::from(days));
        }
        JsonValue::Object(body)
    }

    fn state(environment_id: &str, body: &JsonValue, languages: Value) -> Value {
        Value::object([
            ("id", string_at(body, "/id")),
            ("environment_id", Value::string(environment_id)),
            ("name", string_at(body, "/name")),
            ("description", string_at(body, "/description")),
            ("enabled", bool_at(body, "/enabled")),
            ("reconsent_period_days", int_at(body, "/reconsentPeriodDays")),
            ("languages", languages),
        ])
    }

    fn path(environment_id: &str, id: &str) -> String {
        format!("/environments/{environment_id}/agreements/{id}")
    }

    async fn languages(ctx: &OpContext<'_>, environment_id: &str, id: &str) -> Result<Value> {
        let items = Pages::new(
            ctx.client,
            "ReadAllAgreementLanguages",
            format!("{}/languages", Self::path(environment_id, id)),
            "languages",
            ctx.cancel.clone(),
        )
        .in_environment(environment_id)
        .collect_all()
        .await?;
        Ok(Value::Set(
            items
                .iter()
                .filter_map(|item| item.get("locale").and_then(JsonValue::as_str))
                .map(Value::string)
                .collect(),
        ))
    }
}

#[async_trait]
impl ResourceHandler for AgreementHandler {
    async fn create(&self, ctx: &OpContext<'_>, planned: &Value, _diags: &mut Diagnostics) -> Result<Value> {
        let env = require_str(planned, "environment_id", NAME)?;
        let mut first = Map::new();
        put_str(&mut first, "name", planned.attr("name"));
        let request = ApiRequest::post(
            "CreateAgreement",
            format!("/environments/{env}/agreements"),
            JsonValue::Object(first),
        )
        .in_environment(env)
        .retry_on_propagation();
        let created = send_body(ctx, &request).await?;
        let allocated = Self::state(env, &created, Value::Null);
        ctx.partial.record(allocated.clone());

        let id = require_str(&allocated, "id", NAME)?;
        let request = ApiRequest::put("UpdateAgreement", Self::path(env, id), Self::body(planned)).in_environment(env);
        let configured = send_body(ctx, &request).await?;
        Ok(Self::state(env, &configured, Value::Null))
    }

    async fn read(&self, ctx: &OpContext<'_>, current: &Value, diags: &mut Diagnostics) -> Result<ReadOutcome> {
        let env = require_str(current, "environment_id", NAME)?;
        let id = require_str(current, "id", NAME)?;
        let Some(body) = read_one(ctx, "ReadOneAgreement", &Self::path(env, id), Some(env), diags).await? else {
            return Ok(ReadOutcome::NotFound);
        };
        let languages = Self::languages(ctx, env, id).await?;
        Ok(ReadOutcome::Found(Self::state(env, &body, languages)))
    }

    async fn update(
        &self,
        ctx: &OpContext<'_>,
        prior: &Value,
        planned: &Value,
        _diags: &mut Diagnostics,
    ) -> Result<UpdateOutcome> {
        let env = require_str(prior, "environment_id", NAME)?;
        let id = require_str(prior, "id", NAME)?;
        let request = ApiRequest::put("UpdateAgreement", Self::path(env, id), Self::body(planned)).in_environment(env);
        match ctx.client.send(&request).await? {
            ApiResponse::Ok { body, .. } => Ok(UpdateOutcome::Updated(Self::state(
                env,
                &body,
                prior.attr("languages").clone(),
            ))),
            ApiResponse::NotFound { .. } => Ok(UpdateOutcome::NotFound),
        }
    }

    async fn delete(&self, ctx: &OpContext<'_>, current: &Value, _diags: &mut Diagnostics) -> Result<()> {
        let env = require_str(current, "environment_id", NAME)?;
        let id = require_str(current, "id", NAME)?;
        delete_one(ctx, "DeleteAgreement", &Self::path(env, id), Some(env)).await
    }
}
