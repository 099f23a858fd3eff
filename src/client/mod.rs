//! Typed HTTP client layer for the PingOne APIs.
//!
//! This module provides:
//! - authentication with cached, transparently refreshed tokens
//! - retry with exponential backoff and `Retry-After` support
//! - classification of PingOne error bodies into [`crate::error::ApiError`]
//! - drift detection and paged list iteration

mod api;
mod auth;
pub mod classify;
mod pagination;
mod rate_limit;
mod retry;
mod types;

pub use api::{ApiClient, ApiRequest, ApiResponse, ClientOptions, NotFoundReason};
pub use auth::{ClientCredentials, StaticToken, Token, TokenCache, TokenSource, REFRESH_SKEW};
pub use classify::{should_treat_as_destroyed, P1Error};
pub use pagination::Pages;
pub use rate_limit::RateLimiter;
pub use retry::{is_retryable_status, parse_retry_after, Backoff, RetryPolicy};
pub use types::Region;

#[cfg(test)]
pub(crate) fn test_client(uri: &str) -> ApiClient {
    use std::sync::Arc;
    use std::time::Duration;

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
    ApiClient::new(&options, tokens).unwrap_or_else(|e| panic!("client: {e}"))
}
