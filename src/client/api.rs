//! PingOne management API client.
//!
//! Every request goes through [`ApiClient::send`], which authenticates,
//! retries transient failures with backoff, honours `Retry-After`, and
//! classifies the final response. A 404 is never an error here: it is
//! returned as [`ApiResponse::NotFound`] for the lifecycle to interpret.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, Method};
use serde_json::Value as JsonValue;
use tracing::{debug, trace, warn};

use crate::error::ApiError;

use super::auth::TokenCache;
use super::classify::{classify, is_permission_propagation, P1Error};
use super::rate_limit::RateLimiter;
use super::retry::{is_retryable_status, parse_retry_after, RetryPolicy};

/// Default per-request timeout.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection and retry options.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Management API base URL, e.g. `https://api.pingone.com/v1`.
    pub api_url: String,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
    /// Idle connections kept per host.
    pub pool_max_idle_per_host: usize,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Optional client-side rate limit in requests per second.
    pub rate_limit: Option<u32>,
}

impl ClientOptions {
    /// Options with defaults for `api_url`.
    #[must_use]
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            retry: RetryPolicy::default(),
            pool_max_idle_per_host: 16,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            rate_limit: None,
        }
    }
}

/// Why a request found nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundReason {
    /// The resource itself returned 404.
    Resource,
    /// The request failed with 400/401/403 and its environment no longer exists.
    EnvironmentGone,
}

/// A classified response.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    /// A 2xx response with its decoded body (`null` when empty).
    Ok {
        /// HTTP status.
        status: u16,
        /// Decoded body.
        body: JsonValue,
    },
    /// The resource (or its environment) does not exist.
    NotFound {
        /// What was missing.
        reason: NotFoundReason,
        /// Decoded error body, if any.
        error: Option<P1Error>,
    },
}

impl ApiResponse {
    /// Returns the body of a successful response.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidRequest`] with status 404 for
    /// [`ApiResponse::NotFound`]; callers use this where absence is a
    /// failure, e.g. the parent of a resource being created.
    pub fn into_body(self, operation: &str) -> Result<JsonValue, ApiError> {
        match self {
            Self::Ok { body, .. } => Ok(body),
            Self::NotFound { reason, error } => Err(ApiError::InvalidRequest {
                operation: operation.to_string(),
                status: 404,
                message: match reason {
                    NotFoundReason::Resource => error
                        .map(|e| e.message)
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| String::from("resource not found")),
                    NotFoundReason::EnvironmentGone => String::from("the environment no longer exists"),
                },
                detail: String::new(),
            }),
        }
    }

    /// Returns true for [`ApiResponse::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// A request to a PingOne API.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// Operation name used in logs and diagnostics, e.g. `CreatePopulation`.
    pub operation: String,
    /// HTTP method.
    pub method: Method,
    /// Path relative to the API base URL, or an absolute URL.
    pub path: String,
    /// JSON body.
    pub body: Option<JsonValue>,
    /// Environment to recheck when the request fails with 400/401/403.
    pub environment_id: Option<String>,
    /// Retry 403s caused by role assignments that have not yet propagated.
    pub retry_on_propagation: bool,
}

impl ApiRequest {
    /// Creates a request without body.
    #[must_use]
    pub fn new(operation: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            method,
            path: path.into(),
            body: None,
            environment_id: None,
            retry_on_propagation: false,
        }
    }

    /// `GET path`.
    #[must_use]
    pub fn get(operation: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(operation, Method::GET, path)
    }

    /// `POST path` with a JSON body.
    #[must_use]
    pub fn post(operation: impl Into<String>, path: impl Into<String>, body: JsonValue) -> Self {
        Self::new(operation, Method::POST, path).json(body)
    }

    /// `PUT path` with a JSON body.
    #[must_use]
    pub fn put(operation: impl Into<String>, path: impl Into<String>, body: JsonValue) -> Self {
        Self::new(operation, Method::PUT, path).json(body)
    }

    /// `PATCH path` with a JSON body.
    #[must_use]
    pub fn patch(operation: impl Into<String>, path: impl Into<String>, body: JsonValue) -> Self {
        Self::new(operation, Method::PATCH, path).json(body)
    }

    /// `DELETE path`.
    #[must_use]
    pub fn delete(operation: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(operation, Method::DELETE, path)
    }

    /// Sets the JSON body.
    #[must_use]
    pub fn json(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    /// Rechecks `environment_id` when the request fails with 400/401/403.
    #[must_use]
    pub fn in_environment(mut self, environment_id: impl Into<String>) -> Self {
        self.environment_id = Some(environment_id.into());
        self
    }

    /// Retries 403s caused by role propagation delays.
    #[must_use]
    pub const fn retry_on_propagation(mut self) -> Self {
        self.retry_on_propagation = true;
        self
    }
}

/// Authenticated, retrying PingOne API client.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    api_url: String,
    tokens: Arc<TokenCache>,
    retry: RetryPolicy,
    limiter: Option<Arc<RateLimiter>>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("api_url", &self.api_url)
            .field("retry", &self.retry)
            .field("rate_limited", &self.limiter.is_some())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] if the HTTP client cannot be built.
    pub fn new(options: &ClientOptions, tokens: Arc<TokenCache>) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(options.request_timeout)
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .build()
            .map_err(|e| ApiError::Transport {
                operation: String::from("build HTTP client"),
                attempts: 0,
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            api_url: options.api_url.trim_end_matches('/').to_string(),
            tokens,
            retry: options.retry,
            limiter: options.rate_limit.map(|rps| Arc::new(RateLimiter::new(rps))),
        })
    }

    /// Management API base URL.
    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.api_url, path)
        }
    }

    /// Sends a request, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`] for any non-2xx, non-404
    /// response once retries are exhausted, [`ApiError::Transport`] for
    /// network failures, and authentication errors from the token cache.
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = self.url(&request.path);
        let mut delays = self.retry.delays();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            if let Some(limiter) = &self.limiter {
                limiter.acquire().await;
            }
            let token = self.tokens.access_token().await?;

            let mut builder = self
                .http
                .request(request.method.clone(), &url)
                .bearer_auth(token)
                .header(header::ACCEPT, "application/json");
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            debug!(
                operation = %request.operation,
                method = %request.method,
                url = %url,
                attempt = attempt,
                "Sending PingOne request"
            );

            let response = match builder.send().await {
                Ok(response) => response,
                Err(e) => {
                    if let Some(wait) = delays.next() {
                        warn!(
                            operation = %request.operation,
                            url = %url,
                            error = %e,
                            attempt = attempt,
                            wait_ms = wait.as_millis(),
                            "Request failed, retrying with backoff"
                        );
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    return Err(ApiError::Transport {
                        operation: request.operation.clone(),
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
            };

            let status = response.status().as_u16();
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            self.observe_rate_limit(response.headers()).await;

            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    if let Some(wait) = delays.next() {
                        warn!(
                            operation = %request.operation,
                            url = %url,
                            error = %e,
                            attempt = attempt,
                            wait_ms = wait.as_millis(),
                            "Reading response failed, retrying with backoff"
                        );
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    return Err(ApiError::Transport {
                        operation: request.operation.clone(),
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
            };

            debug!(
                operation = %request.operation,
                status = status,
                attempt = attempt,
                "Received PingOne response"
            );

            if (200..300).contains(&status) {
                let body = if text.trim().is_empty() {
                    JsonValue::Null
                } else {
                    serde_json::from_str(&text).map_err(|e| {
                        ApiError::invalid_response(&request.operation, format!("failed to parse response: {e}"))
                    })?
                };
                return Ok(ApiResponse::Ok { status, body });
            }

            if status == 404 {
                trace!(operation = %request.operation, body = %text, "Resource not found");
                return Ok(ApiResponse::NotFound {
                    reason: NotFoundReason::Resource,
                    error: P1Error::parse(&text),
                });
            }

            let propagation = request.retry_on_propagation && is_permission_propagation(status, &text);
            if (is_retryable_status(status) || propagation)
                && let Some(backoff) = delays.next()
            {
                let wait = if status == 429 {
                    retry_after.unwrap_or(backoff)
                } else {
                    backoff
                };
                if status == 429 {
                    warn!(
                        operation = %request.operation,
                        url = %url,
                        attempt = attempt,
                        wait_ms = wait.as_millis(),
                        "Rate limited (429), waiting before retry"
                    );
                } else if propagation {
                    warn!(
                        operation = %request.operation,
                        attempt = attempt,
                        wait_ms = wait.as_millis(),
                        "Insufficient PingOne privileges detected, waiting for role propagation"
                    );
                } else {
                    warn!(
                        operation = %request.operation,
                        url = %url,
                        status = status,
                        attempt = attempt,
                        wait_ms = wait.as_millis(),
                        "Transient error, retrying with backoff"
                    );
                }
                tokio::time::sleep(wait).await;
                continue;
            }

            if matches!(status, 400 | 401 | 403)
                && let Some(environment_id) = &request.environment_id
                && !self.probe_environment(environment_id).await
            {
                warn!(
                    operation = %request.operation,
                    environment_id = %environment_id,
                    status = status,
                    "API responded with 400, 401 or 403 and the environment no longer exists, overriding response"
                );
                return Ok(ApiResponse::NotFound {
                    reason: NotFoundReason::EnvironmentGone,
                    error: P1Error::parse(&text),
                });
            }

            return Err(classify(&request.operation, status, &text, attempt));
        }
    }

    /// Returns true if the environment exists.
    ///
    /// # Errors
    ///
    /// Returns the classified error if existence cannot be determined.
    pub async fn environment_exists(&self, environment_id: &str) -> Result<bool, ApiError> {
        let request = ApiRequest::get("ReadOneEnvironment", format!("/environments/{environment_id}"));
        Ok(!self.send(&request).await?.is_not_found())
    }

    /// Single unretried existence check used while classifying a failure.
    /// Anything other than a clean 404 counts as "exists" so the original
    /// error is reported.
    async fn probe_environment(&self, environment_id: &str) -> bool {
        let Ok(token) = self.tokens.access_token().await else {
            return true;
        };
        let url = self.url(&format!("/environments/{environment_id}"));
        match self.http.get(&url).bearer_auth(token).send().await {
            Ok(response) => response.status() != reqwest::StatusCode::NOT_FOUND,
            Err(e) => {
                debug!(error = %e, "Environment probe failed");
                true
            }
        }
    }

    async fn observe_rate_limit(&self, headers: &header::HeaderMap) {
        let Some(limiter) = &self.limiter else {
            return;
        };
        let declared = headers
            .get("x-ratelimit-limit")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u32>().ok());
        if let Some(rps) = declared {
            limiter.observe_limit(rps).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_client;
    use serde_json::json;
    use wiremock::matchers::{header as header_matcher, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_success_decodes_body_and_sends_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/environments/e1"))
            .and(header_matcher("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "e1"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let resp = client.send(&ApiRequest::get("ReadOneEnvironment", "/environments/e1")).await;
        assert_eq!(
            resp.ok(),
            Some(ApiResponse::Ok {
                status: 200,
                body: json!({"id": "e1"})
            })
        );
    }

    #[tokio::test]
    async fn test_404_is_not_found_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "id": "x", "code": "NOT_FOUND", "message": "Unable to find population"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let resp = client.send(&ApiRequest::get("ReadOnePopulation", "/p")).await;
        assert!(matches!(
            resp,
            Ok(ApiResponse::NotFound {
                reason: NotFoundReason::Resource,
                error: Some(_)
            })
        ));
    }

    #[tokio::test]
    async fn test_5xx_retried_then_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let resp = client.send(&ApiRequest::put("UpdatePopulation", "/p", json!({}))).await;
        assert!(matches!(
            resp,
            Err(ApiError::Upstream {
                attempts: 3,
                status: 500,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_501_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(501))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let resp = client.send(&ApiRequest::get("Op", "/p")).await;
        assert!(matches!(resp, Err(ApiError::Upstream { attempts: 1, .. })));
    }

    #[tokio::test]
    async fn test_400_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "id": "1", "code": "INVALID_DATA", "message": "bad"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let resp = client.send(&ApiRequest::post("Op", "/p", json!({}))).await;
        assert!(matches!(resp, Err(ApiError::InvalidRequest { status: 400, .. })));
    }

    #[tokio::test]
    async fn test_permission_error_with_missing_environment_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/environments/e1/populations/p1"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "id": "1", "code": "ACCESS_FAILED", "message": "forbidden"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/environments/e1"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let request = ApiRequest::get("ReadOnePopulation", "/environments/e1/populations/p1").in_environment("e1");
        let resp = client.send(&request).await;
        assert!(matches!(
            resp,
            Ok(ApiResponse::NotFound {
                reason: NotFoundReason::EnvironmentGone,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_permission_error_with_existing_environment_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/environments/e1/populations/p1"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "id": "1", "code": "ACCESS_FAILED", "message": "forbidden"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/environments/e1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "e1"})))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let request = ApiRequest::get("ReadOnePopulation", "/environments/e1/populations/p1").in_environment("e1");
        let resp = client.send(&request).await;
        assert!(matches!(resp, Err(ApiError::PermissionOrScope { status: 403, .. })));
    }

    #[tokio::test]
    async fn test_propagation_403_retried_when_enabled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "id": "1", "code": "ACCESS_FAILED",
                "message": "The actor attempting to perform the request is not authorized."
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "p1"})))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let request = ApiRequest::post("CreatePopulation", "/p", json!({})).retry_on_propagation();
        let resp = client.send(&request).await;
        assert!(matches!(resp, Ok(ApiResponse::Ok { status: 201, .. })));
    }

    #[test]
    fn test_into_body_of_not_found() {
        let resp = ApiResponse::NotFound {
            reason: NotFoundReason::EnvironmentGone,
            error: None,
        };
        let err = resp.into_body("CreatePopulation");
        assert!(matches!(err, Err(ApiError::InvalidRequest { status: 404, .. })));
    }
}
