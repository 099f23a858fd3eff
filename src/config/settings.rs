//! Provider settings.
//!
//! Settings come either from environment variables (after loading an
//! optional `.env` file) or from a PingCLI profile. URL overrides and the
//! debug flag are read from the environment in both cases.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::client::{
    ApiClient, ClientCredentials, ClientOptions, Region, RetryPolicy, StaticToken, TokenCache, TokenSource,
};
use crate::error::{ApiError, ConfigError, ProviderError, Result};

use super::profile::{GrantType, Profile};
use super::token_store::{TokenKey, TokenStore};

/// OAuth client id.
pub const ENV_CLIENT_ID: &str = "PINGONE_CLIENT_ID";
/// OAuth client secret.
pub const ENV_CLIENT_SECRET: &str = "PINGONE_CLIENT_SECRET";
/// Environment the client authenticates against.
pub const ENV_ENVIRONMENT_ID: &str = "PINGONE_ENVIRONMENT_ID";
/// Region code.
pub const ENV_REGION_CODE: &str = "PINGONE_REGION_CODE";
/// Enables debug logging when set to a truthy value.
pub const ENV_DEBUG: &str = "PINGONE_DEBUG";
/// Management API base URL override.
pub const ENV_API_URL: &str = "PINGONE_API_URL";
/// Token endpoint override.
pub const ENV_AUTH_URL: &str = "PINGONE_AUTH_URL";
/// Optional client-side rate limit in requests per second.
pub const ENV_RATE_LIMIT: &str = "PINGONE_RATE_LIMIT";

/// Wall-clock budgets of the lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationTimeouts {
    /// Create, including the read that follows it.
    pub create: Duration,
    /// Read.
    pub read: Duration,
    /// Update, including the read that follows it.
    pub update: Duration,
    /// Delete.
    pub delete: Duration,
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(30 * 60),
            read: Duration::from_secs(5 * 60),
            update: Duration::from_secs(30 * 60),
            delete: Duration::from_secs(20 * 60),
        }
    }
}

/// Everything needed to talk to one PingOne tenant.
#[derive(Clone)]
pub struct ProviderSettings {
    /// Region.
    pub region: Region,
    /// Environment the client authenticates against.
    pub environment_id: String,
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: Option<String>,
    /// Grant type.
    pub grant_type: GrantType,
    /// Profile the settings came from, if any.
    pub profile: Option<String>,
    /// Persist tokens under `~/.pingcli/credentials`.
    pub file_storage: bool,
    /// Management API base URL override.
    pub api_url: Option<String>,
    /// Token endpoint override.
    pub auth_url: Option<String>,
    /// Idle HTTP connections kept per host.
    pub pool_max_idle_per_host: usize,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
    /// Optional client-side rate limit.
    pub rate_limit: Option<u32>,
    /// Per-operation timeouts.
    pub timeouts: OperationTimeouts,
    /// Debug logging requested.
    pub debug: bool,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("region", &self.region)
            .field("environment_id", &self.environment_id)
            .field("client_id", &self.client_id)
            .field("grant_type", &self.grant_type)
            .field("profile", &self.profile)
            .field("api_url", &self.api_url)
            .field("retry", &self.retry)
            .field("rate_limit", &self.rate_limit)
            .finish_non_exhaustive()
    }
}

/// Loads `.env` from `dir` (or the working directory) if present.
///
/// # Errors
///
/// Returns [`ConfigError::ParseError`] if the file exists but is invalid.
pub fn load_dotenv(dir: Option<&Path>) -> std::result::Result<(), ConfigError> {
    let env_path = dir.map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));
    if env_path.exists() {
        info!(path = %env_path.display(), "Loading environment file");
        dotenvy::from_path(&env_path).map_err(|e| ConfigError::ParseError {
            message: format!("Failed to load .env file: {e}"),
            location: Some(env_path.display().to_string()),
        })?;
    } else {
        debug!(path = %env_path.display(), ".env file not found");
    }
    Ok(())
}

fn truthy(value: Option<String>) -> bool {
    value.is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

impl ProviderSettings {
    fn base(region: Region, environment_id: String, client_id: String, grant_type: GrantType) -> Self {
        Self {
            region,
            environment_id,
            client_id,
            client_secret: None,
            grant_type,
            profile: None,
            file_storage: false,
            api_url: None,
            auth_url: None,
            pool_max_idle_per_host: 16,
            request_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            rate_limit: None,
            timeouts: OperationTimeouts::default(),
            debug: false,
        }
    }

    /// Reads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] for a missing variable and
    /// [`ConfigError::InvalidValue`] for an unknown region.
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, which maps variable names to values.
    ///
    /// # Errors
    ///
    /// See [`ProviderSettings::from_env`].
    pub fn from_lookup<F>(lookup: F) -> std::result::Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar { name: name.to_string() })
        };

        let region: Region = required(ENV_REGION_CODE)?.parse()?;
        let mut settings = Self::base(
            region,
            required(ENV_ENVIRONMENT_ID)?,
            required(ENV_CLIENT_ID)?,
            GrantType::ClientCredentials,
        );
        settings.client_secret = Some(required(ENV_CLIENT_SECRET)?);
        settings.apply_overrides(&lookup)?;
        Ok(settings)
    }

    /// Builds settings from a PingCLI profile, applying environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a malformed override.
    pub fn from_profile(profile: &Profile) -> std::result::Result<Self, ConfigError> {
        let mut settings = Self::base(
            profile.region,
            profile.environment_id.clone(),
            profile.client_id.clone(),
            profile.grant_type,
        );
        settings.client_secret.clone_from(&profile.client_secret);
        settings.profile = Some(profile.name.clone());
        settings.file_storage = profile.file_storage;
        settings.apply_overrides(&|key: &str| std::env::var(key).ok())?;
        Ok(settings)
    }

    fn apply_overrides<F>(&mut self, lookup: &F) -> std::result::Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            debug!("Overriding API URL from environment");
            self.api_url = Some(url.trim().trim_end_matches('/').to_string());
        }
        if let Some(url) = lookup(ENV_AUTH_URL).filter(|v| !v.trim().is_empty()) {
            debug!("Overriding token endpoint from environment");
            self.auth_url = Some(url.trim().to_string());
        }
        if let Some(rate) = lookup(ENV_RATE_LIMIT).filter(|v| !v.trim().is_empty()) {
            let rps = rate.trim().parse::<u32>().map_err(|_| ConfigError::InvalidValue {
                key: ENV_RATE_LIMIT.to_string(),
                message: format!("'{rate}' is not a positive integer"),
            })?;
            self.rate_limit = Some(rps).filter(|r| *r > 0);
        }
        self.debug = truthy(lookup(ENV_DEBUG));
        Ok(())
    }

    /// Management API base URL.
    #[must_use]
    pub fn api_url(&self) -> String {
        self.api_url.clone().unwrap_or_else(|| self.region.api_url())
    }

    /// Token endpoint.
    #[must_use]
    pub fn auth_url(&self) -> String {
        self.auth_url
            .clone()
            .unwrap_or_else(|| self.region.auth_url(&self.environment_id))
    }

    /// HTTP client options.
    #[must_use]
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            api_url: self.api_url(),
            retry: self.retry,
            pool_max_idle_per_host: self.pool_max_idle_per_host,
            request_timeout: self.request_timeout,
            rate_limit: self.rate_limit,
        }
    }

    fn token_key(&self) -> TokenKey {
        TokenKey {
            environment_id: self.environment_id.clone(),
            client_id: self.client_id.clone(),
            grant_type: self.grant_type.as_str().to_string(),
            profile: self.profile.clone().unwrap_or_else(|| String::from("default")),
        }
    }

    /// Builds the token cache for these settings.
    ///
    /// Non-interactive grants fetch tokens themselves. Interactive grants
    /// need a token stored by a prior `pingcli login`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Authentication`] when an interactive grant has no
    /// usable stored token, or a [`ConfigError`] when the secret is missing.
    pub fn token_cache(&self, credentials_dir: Option<&Path>) -> Result<TokenCache> {
        let store = if self.file_storage {
            let dir = match credentials_dir {
                Some(dir) => dir.to_path_buf(),
                None => TokenStore::default_dir()?,
            };
            Some(TokenStore::new(dir, &self.token_key()))
        } else {
            None
        };

        let source: Arc<dyn TokenSource> = if self.grant_type.is_non_interactive() {
            let secret = self.client_secret.clone().ok_or_else(|| {
                ConfigError::missing(
                    self.profile.as_deref().unwrap_or_default(),
                    "clientSecret",
                    "a client secret is required for this grant type",
                )
            })?;
            let http = reqwest::Client::builder()
                .timeout(self.request_timeout)
                .build()
                .map_err(|e| ApiError::authentication(format!("failed to build token client: {e}")))?;
            Arc::new(ClientCredentials::new(http, self.auth_url(), self.client_id.clone(), secret))
        } else {
            let stored = store
                .as_ref()
                .map(TokenStore::load)
                .transpose()?
                .flatten()
                .ok_or_else(|| {
                    ApiError::authentication(format!(
                        "the {} grant requires a valid stored token; run `pingcli login` first",
                        self.grant_type
                    ))
                })?;
            if store.is_none() {
                warn!("Keychain token storage is not supported; set login.storage.type to file_system");
            }
            Arc::new(StaticToken::new(stored))
        };

        let cache = TokenCache::new(source);
        Ok(match store {
            Some(store) => cache.with_store(store),
            None => cache,
        })
    }

    /// Builds an API client for these settings.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`ProviderSettings::token_cache`] and client
    /// construction.
    pub fn build_client(&self, credentials_dir: Option<&Path>) -> Result<ApiClient> {
        let tokens = Arc::new(self.token_cache(credentials_dir)?);
        ApiClient::new(&self.client_options(), tokens).map_err(ProviderError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const BASE: [(&str, &str); 4] = [
        (ENV_CLIENT_ID, "cid"),
        (ENV_CLIENT_SECRET, "secret"),
        (ENV_ENVIRONMENT_ID, "2b0a0d1e-5a43-4c6c-9a3d-7f1b9f0c8e11"),
        (ENV_REGION_CODE, "EU"),
    ];

    #[test]
    fn test_from_lookup() {
        let settings = ProviderSettings::from_lookup(lookup(&BASE)).unwrap();
        assert_eq!(settings.region, Region::Europe);
        assert_eq!(settings.api_url(), "https://api.pingone.eu/v1");
        assert_eq!(
            settings.auth_url(),
            "https://auth.pingone.eu/2b0a0d1e-5a43-4c6c-9a3d-7f1b9f0c8e11/as/token"
        );
        assert!(!settings.debug);
        assert_eq!(settings.timeouts.read, Duration::from_secs(300));
    }

    #[test]
    fn test_missing_variable() {
        let err = ProviderSettings::from_lookup(lookup(&BASE[..3])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar { name } if name == ENV_REGION_CODE));
    }

    #[test]
    fn test_overrides() {
        let mut vars = BASE.to_vec();
        vars.push((ENV_API_URL, "http://localhost:8080/v1/"));
        vars.push((ENV_DEBUG, "true"));
        vars.push((ENV_RATE_LIMIT, "20"));
        let settings = ProviderSettings::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(settings.api_url(), "http://localhost:8080/v1");
        assert!(settings.debug);
        assert_eq!(settings.rate_limit, Some(20));
    }

    #[test]
    fn test_interactive_grant_without_stored_token() {
        let mut settings = ProviderSettings::from_lookup(lookup(&BASE)).unwrap();
        settings.grant_type = GrantType::DeviceCode;
        settings.file_storage = true;
        let dir = tempfile::TempDir::new().unwrap();
        let err = settings.token_cache(Some(dir.path())).unwrap_err();
        assert!(matches!(err, ProviderError::Api(ApiError::Authentication { .. })));
    }
}
