//! End-to-end reconciliation scenarios against a mocked PingOne API.

use std::sync::Arc;
use std::time::Duration;

use pingone_reconcile::client::{ApiClient, ClientOptions, RetryPolicy, StaticToken, Token, TokenCache};
use pingone_reconcile::config::OperationTimeouts;
use pingone_reconcile::planner::{Action, ChangeKind, ChangeSet};
use pingone_reconcile::reconciler::{ConfigDocument, Reconciler};
use pingone_reconcile::resources::default_registry;
use pingone_reconcile::state::{InstanceState, StateDocument};
use pingone_reconcile::value::Value;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ENV: &str = "6f3e1b7a-2c4d-4e5f-8a9b-0c1d2e3f4a5b";
const NEW_ENV: &str = "7a4f2c8b-3d5e-4f6a-9b0c-1d2e3f4a5b6c";
const POP: &str = "0b1c2d3e-4f5a-4b6c-8d7e-9f0a1b2c3d4e";
const LICENSE: &str = "1a2b3c4d-5e6f-4a7b-8c9d-0e1f2a3b4c5d";
const ORG: &str = "2c3d4e5f-6a7b-4c8d-9e0f-1a2b3c4d5e6f";
const AGREEMENT: &str = "3d4e5f6a-7b8c-4d9e-8f0a-1b2c3d4e5f6a";
const RESOURCE: &str = "4e5f6a7b-8c9d-4e0f-9a1b-2c3d4e5f6a7b";

fn client(uri: &str) -> ApiClient {
    let token = Token {
        access_token: String::from("test-token"),
        token_type: String::from("Bearer"),
        refresh_token: None,
        expiry: chrono::Utc::now() + chrono::Duration::hours(1),
    };
    let tokens = Arc::new(TokenCache::new(Arc::new(StaticToken::new(token))));
    let options = ClientOptions {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            factor: 2.0,
            max_delay: Duration::from_millis(20),
            jitter: 0.0,
        },
        ..ClientOptions::new(uri)
    };
    ApiClient::new(&options, tokens).expect("client")
}

fn reconciler(server: &MockServer) -> Reconciler {
    Reconciler::new(default_registry().expect("registry"))
        .with_client(client(&server.uri()), OperationTimeouts::default())
}

fn environment_body(id: &str, region: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": "x",
        "type": "SANDBOX",
        "region": region,
        "license": { "id": LICENSE },
        "organization": { "id": ORG }
    })
}

async fn mount_environment(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("/environments/{ENV}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(environment_body(ENV, "NA")))
        .mount(server)
        .await;
}

fn population_state(description: Option<&str>) -> Value {
    Value::object([
        ("id", Value::string(POP)),
        ("environment_id", Value::string(ENV)),
        ("name", Value::string("x")),
        ("description", description.map_or(Value::Null, Value::string)),
        ("password_policy", Value::Null),
    ])
}

#[tokio::test]
async fn test_noop_plan_makes_no_calls() {
    let server = MockServer::start().await;
    let reconciler = reconciler(&server);

    let prior = json!({
        "id": ENV, "name": "x", "description": null, "type": "SANDBOX", "region": "NA",
        "license_id": LICENSE, "organization_id": ORG
    });
    let config = json!({ "name": "x", "type": "SANDBOX", "region": "NA", "license_id": LICENSE });
    let plan = reconciler
        .plan("pingone_environment", Some(&prior), Some(&config))
        .expect("plan");
    assert_eq!(plan.action, Action::NoOp);

    let result = reconciler
        .apply("pingone_environment.x", "pingone_environment", &plan, &CancellationToken::new())
        .await
        .expect("apply");
    assert!(result.is_success());
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_in_place_update_issues_one_patch() {
    let server = MockServer::start().await;
    mount_environment(&server).await;
    let updated = json!({ "id": POP, "name": "x", "description": "hello" });
    Mock::given(method("PATCH"))
        .and(path(format!("/environments/{ENV}/populations/{POP}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(updated.clone()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/environments/{ENV}/populations/{POP}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(updated))
        .mount(&server)
        .await;

    let reconciler = reconciler(&server);
    let prior = population_state(None).to_json();
    let config = json!({ "environment_id": ENV, "name": "x", "description": "hello" });
    let plan = reconciler
        .plan("pingone_population", Some(&prior), Some(&config))
        .expect("plan");
    assert_eq!(plan.action, Action::Update);

    let result = reconciler
        .apply("pingone_population.x", "pingone_population", &plan, &CancellationToken::new())
        .await
        .expect("apply");
    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(result.state, Some(population_state(Some("hello"))));

    let again = reconciler
        .plan("pingone_population", result.state.as_ref().map(Value::to_json).as_ref(), Some(&config))
        .expect("plan");
    assert_eq!(again.action, Action::NoOp);
}

#[tokio::test]
async fn test_clearing_description_sends_null() {
    let server = MockServer::start().await;
    mount_environment(&server).await;
    let cleared = json!({ "id": POP, "name": "x" });
    Mock::given(method("PATCH"))
        .and(path(format!("/environments/{ENV}/populations/{POP}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(cleared.clone()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/environments/{ENV}/populations/{POP}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(cleared))
        .mount(&server)
        .await;

    let reconciler = reconciler(&server);
    let prior = population_state(Some("hello")).to_json();
    let config = json!({ "environment_id": ENV, "name": "x" });
    let plan = reconciler
        .plan("pingone_population", Some(&prior), Some(&config))
        .expect("plan");
    assert_eq!(plan.action, Action::Update);

    let result = reconciler
        .apply("pingone_population.x", "pingone_population", &plan, &CancellationToken::new())
        .await
        .expect("apply");
    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(result.state, Some(population_state(None)));

    let requests = server.received_requests().await.unwrap_or_default();
    let patch = requests
        .iter()
        .find(|r| r.method.as_str() == "PATCH")
        .expect("patch request");
    let body: serde_json::Value = serde_json::from_slice(&patch.body).expect("json body");
    assert_eq!(body.get("description"), Some(&serde_json::Value::Null), "{body}");

    let again = reconciler
        .plan("pingone_population", result.state.as_ref().map(Value::to_json).as_ref(), Some(&config))
        .expect("plan");
    assert_eq!(again.action, Action::NoOp);
}

#[tokio::test]
async fn test_region_change_deletes_then_creates() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("/environments/{ENV}")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/environments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(environment_body(NEW_ENV, "EU")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/environments/{NEW_ENV}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(environment_body(NEW_ENV, "EU")))
        .mount(&server)
        .await;

    let reconciler = reconciler(&server);
    let prior = json!({
        "id": ENV, "name": "x", "description": null, "type": "SANDBOX", "region": "NA",
        "license_id": LICENSE, "organization_id": ORG
    });
    let config = json!({ "name": "x", "region": "EU", "license_id": LICENSE });
    let plan = reconciler
        .plan("pingone_environment", Some(&prior), Some(&config))
        .expect("plan");
    assert_eq!(plan.action, Action::Replace);

    let result = reconciler
        .apply("pingone_environment.x", "pingone_environment", &plan, &CancellationToken::new())
        .await
        .expect("apply");
    assert!(result.is_success(), "{:?}", result.error);
    let state = result.state.expect("state");
    assert_eq!(state.attr("region"), &Value::string("EU"));
    assert_eq!(state.attr("id"), &Value::string(NEW_ENV));

    let requests = server.received_requests().await.unwrap_or_default();
    let methods: Vec<&str> = requests.iter().map(|r| r.method.as_str()).collect();
    assert_eq!(methods.first(), Some(&"DELETE"));
    assert_eq!(methods.get(1), Some(&"POST"));
}

#[tokio::test]
async fn test_externally_deleted_resource_is_recreated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/environments/{ENV}/populations/{POP}")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "id": "e", "code": "NOT_FOUND", "message": "Unable to find population"
        })))
        .mount(&server)
        .await;

    let reconciler = reconciler(&server);
    let mut state = StateDocument::new();
    state.set(
        "pingone_population.x",
        InstanceState::new("pingone_population", 2, &population_state(None)),
    );

    let report = reconciler
        .refresh_document(&mut state, &CancellationToken::new())
        .await
        .expect("refresh");
    assert_eq!(report.removed, vec![String::from("pingone_population.x")]);
    assert!(report.diagnostics.warnings().next().is_some());
    assert!(state.get("pingone_population.x").is_none());

    let config: ConfigDocument = serde_json::from_value(json!({
        "resources": {
            "pingone_population.x": { "config": { "environment_id": ENV, "name": "x" } }
        }
    }))
    .expect("config");
    let planned = reconciler.plan_document(&config, &state).expect("plan");
    assert_eq!(planned[0].plan.action, Action::Create);
}

#[tokio::test]
async fn test_partial_create_failure_keeps_allocated_state() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/environments/{ENV}/agreements")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": AGREEMENT, "name": "Terms" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/environments/{ENV}/agreements/{AGREEMENT}")))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let reconciler = reconciler(&server);
    let config: ConfigDocument = serde_json::from_value(json!({
        "resources": {
            "pingone_agreement.terms": {
                "config": { "environment_id": ENV, "name": "Terms", "enabled": true }
            }
        }
    }))
    .expect("config");
    let mut state = StateDocument::new();

    let (change_set, result) = reconciler
        .apply_document(&config, &mut state, false, &CancellationToken::new())
        .await
        .expect("apply");
    assert_eq!(change_set.count(ChangeKind::Create), 1);
    assert!(!result.all_successful());
    let error = result.results[0].error.clone().unwrap_or_default();
    assert!(error.contains("Upstream error"), "{error}");

    let instance = state.get("pingone_agreement.terms").expect("partial state");
    assert_eq!(instance.value["id"], json!(AGREEMENT));
    assert_eq!(instance.value["name"], json!("Terms"));
    assert!(state.history.last().is_some_and(|h| !h.success));

    let planned = reconciler.plan_document(&config, &state).expect("plan");
    assert_eq!(planned[0].plan.action, Action::Update);
    assert_eq!(ChangeSet::from_plans(&planned).count(ChangeKind::Update), 1);
}

#[tokio::test]
async fn test_parent_and_child_created_in_one_apply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/environments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(environment_body(ENV, "NA")))
        .expect(1)
        .mount(&server)
        .await;
    mount_environment(&server).await;
    let population = json!({ "id": POP, "name": "x" });
    Mock::given(method("POST"))
        .and(path(format!("/environments/{ENV}/populations")))
        .respond_with(ResponseTemplate::new(201).set_body_json(population.clone()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/environments/{ENV}/populations/{POP}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(population))
        .mount(&server)
        .await;

    let reconciler = reconciler(&server);
    let config: ConfigDocument = serde_json::from_value(json!({
        "resources": {
            "pingone_population.x": {
                "config": { "environment_id": { "$ref": "pingone_environment.x.id" }, "name": "x" }
            },
            "pingone_environment.x": {
                "config": { "name": "x", "region": "NA", "license_id": LICENSE }
            }
        }
    }))
    .expect("config");
    let mut state = StateDocument::new();

    let planned = reconciler.plan_document(&config, &state).expect("plan");
    let child = planned
        .iter()
        .find(|p| p.address == "pingone_population.x")
        .expect("child plan");
    assert_eq!(child.plan.action, Action::Create);
    assert_eq!(child.depends_on, vec![String::from("pingone_environment.x")]);

    let (change_set, result) = reconciler
        .apply_document(&config, &mut state, false, &CancellationToken::new())
        .await
        .expect("apply");
    assert_eq!(change_set.count(ChangeKind::Create), 2);
    assert!(result.all_successful(), "{:?}", result.results);
    assert_eq!(state.get("pingone_population.x").expect("child").value["environment_id"], json!(ENV));

    let again = reconciler.plan_document(&config, &state).expect("plan");
    assert!(again.iter().all(|p| p.plan.action == Action::NoOp));
}

#[tokio::test]
async fn test_import_composite_id() {
    let server = MockServer::start().await;
    mount_environment(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("/environments/{ENV}/populations/{POP}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": POP, "name": "Staff", "description": "Employees"
        })))
        .mount(&server)
        .await;

    let reconciler = reconciler(&server);
    let mut state = StateDocument::new();
    reconciler
        .import_document(
            &mut state,
            "pingone_population.staff",
            "pingone_population",
            &format!("{ENV}/{POP}"),
            &CancellationToken::new(),
        )
        .await
        .expect("import");

    let instance = state.get("pingone_population.staff").expect("imported");
    assert_eq!(instance.schema_version, 2);
    assert_eq!(instance.value["environment_id"], json!(ENV));
    assert_eq!(instance.value["id"], json!(POP));
    assert_eq!(instance.value["name"], json!("Staff"));
}

#[tokio::test]
async fn test_import_rejects_malformed_id() {
    let server = MockServer::start().await;
    let reconciler = reconciler(&server);
    let result = reconciler
        .import(
            "pingone_population.x",
            "pingone_population",
            "only-one-part",
            &CancellationToken::new(),
        )
        .await;
    assert!(result.is_err());
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_trigger_change_rotates_secret() {
    let server = MockServer::start().await;
    let secret_path = format!("/environments/{ENV}/resources/{RESOURCE}/secret");
    Mock::given(method("POST"))
        .and(path(secret_path.clone()))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "secret": "s2" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(secret_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "secret": "s2" })))
        .mount(&server)
        .await;

    let reconciler = reconciler(&server);
    let prior = json!({
        "id": RESOURCE, "environment_id": ENV, "resource_id": RESOURCE,
        "secret": "s1", "regenerate_trigger_values": { "k": "v1" }
    });
    let config = json!({
        "environment_id": ENV, "resource_id": RESOURCE,
        "regenerate_trigger_values": { "k": "v2" }
    });
    let plan = reconciler
        .plan("pingone_resource_secret", Some(&prior), Some(&config))
        .expect("plan");
    assert_eq!(plan.action, Action::Update);

    let result = reconciler
        .apply(
            "pingone_resource_secret.app",
            "pingone_resource_secret",
            &plan,
            &CancellationToken::new(),
        )
        .await
        .expect("apply");
    assert!(result.is_success(), "{:?}", result.error);
    let state = result.state.expect("state");
    assert_eq!(state.attr("secret"), &Value::string("s2"));
    assert_eq!(state.attr("regenerate_trigger_values").to_json(), json!({ "k": "v2" }));
}
