//! Provider configuration.
//!
//! This module handles:
//! - Loading settings from environment variables and `.env` files
//! - Reading PingCLI profiles from `~/.pingcli/config.yaml`
//! - Persisting OAuth tokens under `~/.pingcli/credentials`

mod profile;
mod settings;
mod token_store;

pub use profile::{GrantType, Profile, ProfileFile};
pub use settings::{
    load_dotenv, OperationTimeouts, ProviderSettings, ENV_API_URL, ENV_AUTH_URL, ENV_CLIENT_ID,
    ENV_CLIENT_SECRET, ENV_DEBUG, ENV_ENVIRONMENT_ID, ENV_RATE_LIMIT, ENV_REGION_CODE,
};
pub use token_store::{TokenKey, TokenStore};
