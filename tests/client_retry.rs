//! Rate-limit handling of the PingOne client.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pingone_reconcile::client::{ApiClient, ApiRequest, ApiResponse, ClientOptions, RetryPolicy, StaticToken, Token, TokenCache};
use pingone_reconcile::error::ApiError;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(uri: &str, max_attempts: u32) -> ApiClient {
    let token = Token {
        access_token: String::from("test-token"),
        token_type: String::from("Bearer"),
        refresh_token: None,
        expiry: chrono::Utc::now() + chrono::Duration::hours(1),
    };
    let options = ClientOptions {
        retry: RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(5),
            factor: 2.0,
            max_delay: Duration::from_millis(20),
            jitter: 0.0,
        },
        ..ClientOptions::new(uri)
    };
    ApiClient::new(&options, Arc::new(TokenCache::new(Arc::new(StaticToken::new(token))))).expect("client")
}

#[tokio::test]
async fn test_retry_after_is_honoured() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/environments"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/environments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "_embedded": { "environments": [] } })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server.uri(), 3);
    let started = Instant::now();
    let response = client
        .send(&ApiRequest::get("ReadAllEnvironments", "/environments"))
        .await
        .expect("send");

    assert!(matches!(response, ApiResponse::Ok { status: 200, .. }));
    assert!(started.elapsed() >= Duration::from_secs(2), "{:?}", started.elapsed());
}

#[tokio::test]
async fn test_rate_limit_exhausts_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server.uri(), 2);
    let result = client.send(&ApiRequest::get("ReadAllEnvironments", "/environments")).await;
    assert!(matches!(result, Err(ApiError::InvalidRequest { status: 429, .. })), "{result:?}");
}
