//! On-disk token storage.
//!
//! Tokens are stored as JSON under `~/.pingcli/credentials`, one file per
//! profile. The file name is derived from a hash over the environment id,
//! client id, grant type and profile name, so a change to any of them never
//! picks up a token issued for different credentials.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::client::Token;
use crate::error::{ConfigError, StateError};

/// Identity a stored token belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenKey {
    /// Environment the client authenticates against.
    pub environment_id: String,
    /// OAuth client id.
    pub client_id: String,
    /// Grant type, e.g. `client_credentials`.
    pub grant_type: String,
    /// Profile name.
    pub profile: String,
}

impl TokenKey {
    /// Returns the file stem for this key.
    #[must_use]
    pub fn file_stem(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [&self.environment_id, &self.client_id, &self.grant_type, &self.profile] {
            hasher.update(part.trim().as_bytes());
            hasher.update([0u8]);
        }
        let digest = hex::encode(hasher.finalize());
        format!("token-{}_pingone_{}_{}", &digest[..16], self.grant_type.trim(), self.profile.trim())
    }
}

/// A token file for one profile.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Default credentials directory, `~/.pingcli/credentials`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the home directory is unknown.
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".pingcli").join("credentials"))
            .ok_or_else(|| ConfigError::InvalidValue {
                key: String::from("home directory"),
                message: String::from("cannot determine the user's home directory"),
            })
    }

    /// Store for `key` inside `dir`.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>, key: &TokenKey) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", key.file_stem())),
        }
    }

    /// Path of the token file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored token, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Corrupted`] if the file exists but is not a token.
    pub fn load(&self) -> Result<Option<Token>, StateError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .map_err(|e| StateError::corrupted(format!("failed to read {}: {e}", self.path.display())))?;
        let token: Token = serde_json::from_str(&content)
            .map_err(|e| StateError::corrupted(format!("invalid token file {}: {e}", self.path.display())))?;
        debug!(
            path = %self.path.display(),
            expiry = %token.expiry,
            has_refresh = token.refresh_token.is_some(),
            "Loaded stored token"
        );
        Ok(Some(token))
    }

    /// Writes `token`, replacing the file atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::SerializationError`] if the file cannot be written.
    pub fn save(&self, token: &Token) -> Result<(), StateError> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| StateError::serialization("token path has no parent directory"))?;
        fs::create_dir_all(dir)
            .map_err(|e| StateError::serialization(format!("failed to create {}: {e}", dir.display())))?;

        let content = serde_json::to_string_pretty(token)
            .map_err(|e| StateError::serialization(format!("failed to encode token: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp)
            .map_err(|e| StateError::serialization(format!("failed to create {}: {e}", tmp.display())))?;
        file.write_all(content.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| StateError::serialization(format!("failed to write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| StateError::serialization(format!("failed to replace {}: {e}", self.path.display())))?;
        Ok(())
    }

    /// Removes the token file.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::SerializationError`] if the file exists and
    /// cannot be removed.
    pub fn clear(&self) -> Result<(), StateError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StateError::serialization(format!(
                "failed to remove {}: {e}",
                self.path.display()
            ))),
        }
    }
}
