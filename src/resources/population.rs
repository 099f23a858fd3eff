//! `pingone_population`.
//!
//! A population lives inside an environment. The password policy reference
//! has moved twice: a flat `password_policy_id` (v0), a single-element
//! block list (v1), and a single nested object (v2).

use async_trait::async_trait;
use serde_json::{json, Map, Value as JsonValue};

use crate::client::{ApiRequest, ApiResponse};
use crate::diag::Diagnostics;
use crate::error::Result;
use crate::lifecycle::{ImportFormat, OpContext, ReadOutcome, ResourceHandler, UpdateOutcome};
use crate::planner::{requires_replace, use_state_for_unknown};
use crate::schema::{Attribute, Cardinality, Nesting, ParentRef, Schema};
use crate::state::{upgrade_attribute_list_to_object, StateUpgrader};
use crate::validators::length_between;
use crate::value::{AttrType, Value};

use super::common::{clear_removed, delete_one, put_str, read_one, require_str, send_body, string_at};

/// Resource type name.
pub const NAME: &str = "pingone_population";

fn base_attributes() -> Vec<(&'static str, Attribute)> {
    vec![
        (
            "id",
            Attribute::computed(AttrType::ResourceId)
                .describe("The ID of the population.")
                .modifier(use_state_for_unknown()),
        ),
        (
            "environment_id",
            Attribute::required(AttrType::ResourceId)
                .describe("The environment to create the population in.")
                .modifier(requires_replace()),
        ),
        (
            "name",
            Attribute::required(AttrType::String)
                .describe("The name of the population.")
                .validator(length_between(1, 256)),
        ),
        ("description", Attribute::optional(AttrType::String)),
    ]
}

fn policy_block(nesting: Nesting) -> Attribute {
    Attribute::nested(
        nesting,
        Cardinality::Optional,
        [(
            "id",
            Attribute::required(AttrType::ResourceId).describe("The ID of the password policy."),
        )],
    )
}

/// Current schema.
#[must_use]
pub fn schema() -> Schema {
    let mut attributes = base_attributes();
    attributes.push((
        "password_policy",
        policy_block(Nesting::Single).describe("The password policy applied to users in the population."),
    ));
    Schema::new(2, "A population of users in a PingOne environment.", attributes)
}

fn schema_v0() -> Schema {
    let mut attributes = base_attributes();
    attributes.push(("password_policy_id", Attribute::optional(AttrType::ResourceId)));
    Schema::new(0, "A population of users in a PingOne environment.", attributes)
}

fn schema_v1() -> Schema {
    let mut attributes = base_attributes();
    attributes.push(("password_policy", policy_block(Nesting::List)));
    Schema::new(1, "A population of users in a PingOne environment.", attributes)
}

/// `password_policy_id = "x"` becomes `password_policy = [{ id = "x" }]`.
fn upgrade_v0(value: &Value) -> std::result::Result<Value, String> {
    let Value::Object(fields) = value else {
        return Err(format!("expected an object, found {}", value.kind_name()));
    };
    let mut out = fields.clone();
    let policy = match out.remove("password_policy_id") {
        None | Some(Value::Null) => Value::Null,
        Some(Value::Unknown) => Value::Unknown,
        Some(id @ Value::String(_)) => Value::List(vec![Value::object([("id", id)])]),
        Some(other) => return Err(format!("password_policy_id: unexpected {}", other.kind_name())),
    };
    out.insert(String::from("password_policy"), policy);
    Ok(Value::Object(out))
}

fn upgrade_v1(value: &Value) -> std::result::Result<Value, String> {
    upgrade_attribute_list_to_object(value, "password_policy")
}

/// Migration steps from every prior version.
#[must_use]
pub fn upgraders() -> Vec<StateUpgrader> {
    vec![
        StateUpgrader::new(schema_v0(), upgrade_v0),
        StateUpgrader::new(schema_v1(), upgrade_v1),
    ]
}

/// Parent edge to the owning environment.
#[must_use]
pub fn parent() -> ParentRef {
    ParentRef::new("environment_id", super::environment::NAME)
}

/// `environment_id/population_id`.
#[must_use]
pub fn import_format() -> ImportFormat {
    ImportFormat::new(&["environment_id", "id"])
}

/// Handler for `pingone_population`.
#[derive(Debug, Default)]
pub struct PopulationHandler;

impl PopulationHandler {
    fn fields(planned: &Value) -> Map<String, JsonValue> {
        let mut body = Map::new();
        put_str(&mut body, "name", planned.attr("name"));
        put_str(&mut body, "description", planned.attr("description"));
        if let Some(policy) = planned.attr("password_policy").attr("id").as_str() {
            body.insert(String::from("passwordPolicy"), json!({ "id": policy }));
        }
        body
    }

    fn body(planned: &Value) -> JsonValue {
        JsonValue::Object(Self::fields(planned))
    }

    /// Update body: cleared optional attributes are sent as null.
    fn patch_body(prior: &Value, planned: &Value) -> JsonValue {
        let mut body = Self::fields(planned);
        clear_removed(&mut body, "description", prior.attr("description"), planned.attr("description"));
        clear_removed(
            &mut body,
            "passwordPolicy",
            prior.attr("password_policy"),
            planned.attr("password_policy"),
        );
        JsonValue::Object(body)
    }

    fn state(environment_id: &str, body: &JsonValue) -> Value {
        let policy = match string_at(body, "/passwordPolicy/id") {
            Value::Null => Value::Null,
            id => Value::object([("id", id)]),
        };
        Value::object([
            ("id", string_at(body, "/id")),
            ("environment_id", Value::string(environment_id)),
            ("name", string_at(body, "/name")),
            ("description", string_at(body, "/description")),
            ("password_policy", policy),
        ])
    }
}

#[async_trait]
impl ResourceHandler for PopulationHandler {
    async fn create(&self, ctx: &OpContext<'_>, planned: &Value, _diags: &mut Diagnostics) -> Result<Value> {
        let env = require_str(planned, "environment_id", NAME)?;
        let request = ApiRequest::post(
            "CreatePopulation",
            format!("/environments/{env}/populations"),
            Self::body(planned),
        )
        .in_environment(env)
        .retry_on_propagation();
        let body = send_body(ctx, &request).await?;
        let state = Self::state(env, &body);
        ctx.partial.record(state.clone());
        Ok(state)
    }

    async fn read(&self, ctx: &OpContext<'_>, current: &Value, diags: &mut Diagnostics) -> Result<ReadOutcome> {
        let env = require_str(current, "environment_id", NAME)?;
        let id = require_str(current, "id", NAME)?;
        let path = format!("/environments/{env}/populations/{id}");
        let found = read_one(ctx, "ReadOnePopulation", &path, Some(env), diags).await?;
        Ok(found.map_or(ReadOutcome::NotFound, |body| ReadOutcome::Found(Self::state(env, &body))))
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
        let request = ApiRequest::patch(
            "UpdatePopulation",
            format!("/environments/{env}/populations/{id}"),
            Self::patch_body(prior, planned),
        )
        .in_environment(env);
        match ctx.client.send(&request).await? {
            ApiResponse::Ok { body, .. } => Ok(UpdateOutcome::Updated(Self::state(env, &body))),
            ApiResponse::NotFound { .. } => Ok(UpdateOutcome::NotFound),
        }
    }

    async fn delete(&self, ctx: &OpContext<'_>, current: &Value, _diags: &mut Diagnostics) -> Result<()> {
        let env = require_str(current, "environment_id", NAME)?;
        let id = require_str(current, "id", NAME)?;
        delete_one(
            ctx,
            "DeletePopulation",
            &format!("/environments/{env}/populations/{id}"),
            Some(env),
        )
        .await
    }
}
