//! Access tokens for the PingOne APIs.
//!
//! A [`TokenSource`] yields time-bounded credentials. [`TokenCache`] sits in
//! front of one source per profile: cache hits only take a read lock, and
//! refreshes are serialised so concurrent requests never stampede the token
//! endpoint.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::TokenStore;
use crate::error::ApiError;

/// Tokens are refreshed this long before they expire.
pub const REFRESH_SKEW: Duration = Duration::from_secs(30);

/// An access token with its expiry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Bearer token.
    pub access_token: String,
    /// Token type, normally `Bearer`.
    pub token_type: String,
    /// Refresh token, when the grant issues one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry instant.
    pub expiry: DateTime<Utc>,
}

impl Token {
    /// Returns true if the token is still usable `skew` from now.
    #[must_use]
    pub fn is_fresh(&self, skew: Duration) -> bool {
        let skew = chrono::Duration::from_std(skew).unwrap_or_else(|_| chrono::Duration::zero());
        Utc::now() < self.expiry - skew
    }

    /// Returns true if the token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expiry
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("token_type", &self.token_type)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

/// A source of access tokens.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Obtains a new token.
    async fn fetch(&self) -> Result<Token, ApiError>;

    /// Exchanges a refresh token for a new token.
    async fn refresh(&self, refresh_token: &str) -> Result<Token, ApiError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

fn default_token_type() -> String {
    String::from("Bearer")
}

impl TokenResponse {
    fn into_token(self) -> Token {
        Token {
            access_token: self.access_token,
            token_type: self.token_type,
            refresh_token: self.refresh_token,
            expiry: Utc::now() + chrono::Duration::seconds(self.expires_in.unwrap_or(3600)),
        }
    }
}

/// OAuth2 client-credentials grant against a PingOne token endpoint.
#[derive(Clone)]
pub struct ClientCredentials {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scopes: Vec<String>,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl ClientCredentials {
    /// Creates a client-credentials source.
    #[must_use]
    pub fn new(
        http: Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scopes: Vec::new(),
        }
    }

    /// Requests the given scopes.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    async fn request(&self, params: Vec<(&str, String)>) -> Result<Token, (u16, String)> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| (0, format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err((status.as_u16(), format!("token endpoint returned {status}: {body}")));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| (status.as_u16(), format!("failed to parse token response: {e}")))?;
        Ok(body.into_token())
    }
}

#[async_trait]
impl TokenSource for ClientCredentials {
    async fn fetch(&self) -> Result<Token, ApiError> {
        debug!(client_id = %self.client_id, "Requesting client credentials token");
        let mut params = vec![
            ("grant_type", String::from("client_credentials")),
            ("client_id", self.client_id.clone()),
            ("client_secret", self.client_secret.clone()),
        ];
        if !self.scopes.is_empty() {
            params.push(("scope", self.scopes.join(" ")));
        }
        self.request(params)
            .await
            .map_err(|(_, message)| ApiError::authentication(message))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Token, ApiError> {
        let params = vec![
            ("grant_type", String::from("refresh_token")),
            ("refresh_token", refresh_token.to_string()),
            ("client_id", self.client_id.clone()),
            ("client_secret", self.client_secret.clone()),
        ];
        self.request(params)
            .await
            .map_err(|(_, message)| ApiError::AuthExpired { message })
    }
}

/// A token supplied from outside, e.g. by a host that performed its own login.
#[derive(Debug, Clone)]
pub struct StaticToken {
    token: Token,
}

impl StaticToken {
    /// Wraps an externally supplied token.
    #[must_use]
    pub const fn new(token: Token) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn fetch(&self) -> Result<Token, ApiError> {
        if self.token.is_expired() {
            return Err(ApiError::AuthExpired {
                message: String::from("the supplied access token has expired"),
            });
        }
        Ok(self.token.clone())
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<Token, ApiError> {
        Err(ApiError::AuthExpired {
            message: String::from("the supplied access token cannot be refreshed"),
        })
    }
}

/// Process-wide token cache for one profile.
pub struct TokenCache {
    source: Arc<dyn TokenSource>,
    cached: RwLock<Option<Token>>,
    refresh_lock: Mutex<()>,
    store: Option<TokenStore>,
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCache")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl TokenCache {
    /// Creates an empty cache in front of `source`.
    #[must_use]
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            cached: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            store: None,
        }
    }

    /// Persists tokens in `store` and seeds the cache from it.
    ///
    /// A stored token that has expired is discarded unless it carries a
    /// refresh token, in which case it is refreshed on first use.
    #[must_use]
    pub fn with_store(mut self, store: TokenStore) -> Self {
        match store.load() {
            Ok(Some(token)) if token.is_expired() && token.refresh_token.is_none() => {
                debug!(path = %store.path().display(), "Discarding expired stored token");
                if let Err(e) = store.clear() {
                    warn!(error = %e, "Failed to remove expired token file");
                }
            }
            Ok(Some(token)) => {
                self.cached = RwLock::new(Some(token));
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Ignoring unreadable token file"),
        }
        self.store = Some(store);
        self
    }

    /// Returns a usable access token, refreshing it when needed.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Authentication`] if a new token cannot be obtained,
    /// or [`ApiError::AuthExpired`] if the refresh token was rejected.
    pub async fn access_token(&self) -> Result<String, ApiError> {
        if let Some(token) = self.cached.read().await.as_ref()
            && token.is_fresh(REFRESH_SKEW)
        {
            return Ok(token.access_token.clone());
        }

        let _guard = self.refresh_lock.lock().await;
        let stale = self.cached.read().await.clone();
        if let Some(token) = &stale
            && token.is_fresh(REFRESH_SKEW)
        {
            return Ok(token.access_token.clone());
        }

        let token = match stale.and_then(|t| t.refresh_token) {
            Some(refresh_token) => {
                info!("Refreshing access token");
                self.source
                    .refresh(&refresh_token)
                    .await
                    .map_err(|e| ApiError::AuthExpired {
                        message: e.to_string(),
                    })?
            }
            None => self.source.fetch().await?,
        };

        if let Some(store) = &self.store
            && let Err(e) = store.save(&token)
        {
            warn!(error = %e, "Failed to persist access token");
        }

        let access = token.access_token.clone();
        *self.cached.write().await = Some(token);
        Ok(access)
    }

    /// Drops the cached token so the next request obtains a new one.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token(access: &str, expires_in: i64, refresh: Option<&str>) -> Token {
        Token {
            access_token: access.to_string(),
            token_type: String::from("Bearer"),
            refresh_token: refresh.map(ToString::to_string),
            expiry: Utc::now() + chrono::Duration::seconds(expires_in),
        }
    }

    #[tokio::test]
    async fn test_cache_hit_does_not_refetch() {
        let mut source = MockTokenSource::new();
        source
            .expect_fetch()
            .times(1)
            .returning(|| Ok(token("t1", 3600, None)));

        let cache = TokenCache::new(Arc::new(source));
        assert_eq!(cache.access_token().await.ok().as_deref(), Some("t1"));
        assert_eq!(cache.access_token().await.ok().as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn test_token_inside_skew_is_refreshed() {
        let mut source = MockTokenSource::new();
        source
            .expect_fetch()
            .times(1)
            .returning(|| Ok(token("t1", 10, Some("r1"))));
        source
            .expect_refresh()
            .withf(|rt| rt == "r1")
            .times(1)
            .returning(|_| Ok(token("t2", 3600, None)));

        let cache = TokenCache::new(Arc::new(source));
        assert_eq!(cache.access_token().await.ok().as_deref(), Some("t1"));
        assert_eq!(cache.access_token().await.ok().as_deref(), Some("t2"));
    }

    #[tokio::test]
    async fn test_rejected_refresh_is_auth_expired() {
        let mut source = MockTokenSource::new();
        source
            .expect_fetch()
            .returning(|| Ok(token("t1", 5, Some("r1"))));
        source
            .expect_refresh()
            .returning(|_| Err(ApiError::authentication("invalid_grant")));

        let cache = TokenCache::new(Arc::new(source));
        let _ = cache.access_token().await;
        let err = cache.access_token().await;
        assert!(matches!(err, Err(ApiError::AuthExpired { .. })));
    }

    #[tokio::test]
    async fn test_static_token_expired() {
        let source = StaticToken::new(token("t", -5, None));
        assert!(matches!(source.fetch().await, Err(ApiError::AuthExpired { .. })));
    }

    #[tokio::test]
    async fn test_client_credentials_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/env/as/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=cid"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "abc",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = ClientCredentials::new(
            Client::new(),
            format!("{}/env/as/token", server.uri()),
            "cid",
            "secret",
        );
        let token = source.fetch().await;
        assert_eq!(token.map(|t| t.access_token).ok().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_client_credentials_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let source = ClientCredentials::new(Client::new(), server.uri(), "cid", "bad");
        assert!(matches!(source.fetch().await, Err(ApiError::Authentication { .. })));
    }
}
