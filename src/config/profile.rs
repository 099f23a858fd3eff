//! PingCLI profile files.
//!
//! A profile file is a YAML document with a top-level `activeProfile` key
//! (`active_profile` and the legacy `activeprofile` are accepted too) and
//! one mapping per named profile:
//!
//! ```yaml
//! activeProfile: default
//! default:
//!   service:
//!     pingOne:
//!       regionCode: NA
//!       authentication:
//!         type: client_credentials
//!         environmentID: 2b0a0d1e-5a43-4c6c-9a3d-7f1b9f0c8e11
//!         clientCredentials:
//!           clientID: ...
//!           clientSecret: ...
//!   login:
//!     storage:
//!       type: file_system
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_yaml::Value as YamlValue;
use tracing::{debug, info};

use crate::client::Region;
use crate::error::ConfigError;

const ACTIVE_PROFILE_KEYS: [&str; 3] = ["activeProfile", "active_profile", "activeprofile"];

/// OAuth grant a profile authenticates with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    /// Client credentials.
    ClientCredentials,
    /// Authorization code; requires a token stored by a prior login.
    AuthorizationCode,
    /// Device code; requires a token stored by a prior login.
    DeviceCode,
    /// Worker application client credentials.
    Worker,
}

impl GrantType {
    /// Value used in profile files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClientCredentials => "client_credentials",
            Self::AuthorizationCode => "authorization_code",
            Self::DeviceCode => "device_code",
            Self::Worker => "worker",
        }
    }

    const fn section(self) -> &'static str {
        match self {
            Self::ClientCredentials => "clientCredentials",
            Self::AuthorizationCode => "authorizationCode",
            Self::DeviceCode => "deviceCode",
            Self::Worker => "worker",
        }
    }

    /// Returns true if the grant can obtain tokens without user interaction.
    #[must_use]
    pub const fn is_non_interactive(self) -> bool {
        matches!(self, Self::ClientCredentials | Self::Worker)
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Authentication settings of one profile.
#[derive(Clone, PartialEq, Eq)]
pub struct Profile {
    /// Profile name.
    pub name: String,
    /// Region.
    pub region: Region,
    /// Environment the client authenticates against.
    pub environment_id: String,
    /// Grant type.
    pub grant_type: GrantType,
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret, for non-interactive grants.
    pub client_secret: Option<String>,
    /// Redirect URI path, for the authorization code grant.
    pub redirect_uri_path: Option<String>,
    /// Redirect URI port, for the authorization code grant.
    pub redirect_uri_port: Option<String>,
    /// Requested scopes.
    pub scopes: Vec<String>,
    /// Tokens are stored on disk rather than in the platform keychain.
    pub file_storage: bool,
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("name", &self.name)
            .field("region", &self.region)
            .field("environment_id", &self.environment_id)
            .field("grant_type", &self.grant_type)
            .field("client_id", &self.client_id)
            .field("file_storage", &self.file_storage)
            .finish_non_exhaustive()
    }
}

/// A parsed profile file.
#[derive(Debug, Clone)]
pub struct ProfileFile {
    root: YamlValue,
    source: Option<PathBuf>,
}

impl ProfileFile {
    /// Default location, `~/.pingcli/config.yaml`.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".pingcli").join("config.yaml"))
    }

    /// Loads a profile file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileNotFound`] or [`ConfigError::ParseError`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading profile file");

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError {
            message: format!("Failed to read file: {e}"),
            location: Some(path.display().to_string()),
        })?;

        let mut file = Self::parse(&content)?;
        file.source = Some(path.to_path_buf());
        Ok(file)
    }

    /// Parses a profile document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParseError`] for invalid YAML or a non-mapping root.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let root: YamlValue = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
            message: format!("YAML parse error: {e}"),
            location: e.location().map(|l| format!("line {}, column {}", l.line(), l.column())),
        })?;
        if !root.is_mapping() {
            return Err(ConfigError::ParseError {
                message: String::from("profile file must be a mapping"),
                location: None,
            });
        }
        Ok(Self { root, source: None })
    }

    /// Name of the active profile.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingKey`] if no active profile is set.
    pub fn active_profile(&self) -> Result<String, ConfigError> {
        let found = ACTIVE_PROFILE_KEYS
            .iter()
            .find_map(|key| self.root.get(*key).and_then(scalar));
        match found {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(ConfigError::missing(
                "",
                "activeProfile",
                "no active profile is set in the profile file",
            )),
        }
    }

    /// Loads the named profile, or the active one when `name` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ProfileNotFound`], [`ConfigError::MissingKey`]
    /// labelled with the full key path, [`ConfigError::InvalidValue`] for a
    /// bad region, or [`ConfigError::UnsupportedGrantType`].
    pub fn profile(&self, name: Option<&str>) -> Result<Profile, ConfigError> {
        let name = match name {
            Some(name) => name.to_string(),
            None => self.active_profile()?,
        };
        let node = self
            .root
            .get(name.as_str())
            .filter(|n| n.is_mapping())
            .ok_or_else(|| ConfigError::ProfileNotFound {
                profile: name.clone(),
            })?;
        let reader = Reader { name: &name, node };

        let grant = reader.required("service.pingOne.authentication.type")?;
        let grant_type = match grant.as_str() {
            "client_credentials" => GrantType::ClientCredentials,
            "authorization_code" => GrantType::AuthorizationCode,
            "device_code" => GrantType::DeviceCode,
            "worker" => GrantType::Worker,
            other => {
                return Err(ConfigError::UnsupportedGrantType {
                    grant_type: other.to_string(),
                    profile: name.clone(),
                });
            }
        };

        let region_key = "service.pingOne.regionCode";
        let region = Region::from_str(&reader.required(region_key)?).map_err(|_| ConfigError::InvalidValue {
            key: reader.label(region_key),
            message: String::from("must be one of NA, EU, ASIA, CA"),
        })?;

        let section = format!("service.pingOne.authentication.{}", grant_type.section());
        let environment_key = "service.pingOne.authentication.environmentID";
        let environment_id = match grant_type {
            GrantType::Worker => match reader.optional(environment_key) {
                Some(id) => id,
                None => reader.required(&format!("{section}.environmentID"))?,
            },
            _ => reader.required(environment_key)?,
        };

        let client_id = reader.required(&format!("{section}.clientID"))?;
        let client_secret = if grant_type.is_non_interactive() {
            Some(reader.required(&format!("{section}.clientSecret"))?)
        } else {
            None
        };

        let (redirect_uri_path, redirect_uri_port) = if grant_type == GrantType::AuthorizationCode {
            (
                reader.optional(&format!("{section}.redirectURIPath")),
                reader.optional(&format!("{section}.redirectURIPort")),
            )
        } else {
            (None, None)
        };

        let file_storage = reader
            .optional("login.storage.type")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("file_system"));

        debug!(profile = %name, grant_type = %grant_type, region = %region, "Loaded profile");

        Ok(Profile {
            name: name.clone(),
            region,
            environment_id,
            grant_type,
            client_id,
            client_secret,
            redirect_uri_path,
            redirect_uri_port,
            scopes: vec![String::from("openid")],
            file_storage,
        })
    }

    /// Path the file was loaded from.
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

struct Reader<'a> {
    name: &'a str,
    node: &'a YamlValue,
}

impl Reader<'_> {
    fn label(&self, key: &str) -> String {
        format!("{}.{key}", self.name)
    }

    fn optional(&self, key: &str) -> Option<String> {
        key.split('.')
            .try_fold(self.node, |node, part| node.get(part))
            .and_then(scalar)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key).ok_or_else(|| {
            ConfigError::missing(self.name, self.label(key), "required value is missing or empty")
        })
    }
}

fn scalar(node: &YamlValue) -> Option<String> {
    match node {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r"
activeProfile: default
default:
  service:
    pingOne:
      regionCode: EU
      authentication:
        type: client_credentials
        environmentID: 2b0a0d1e-5a43-4c6c-9a3d-7f1b9f0c8e11
        clientCredentials:
          clientID: cid
          clientSecret: secret
  login:
    storage:
      type: file_system
worker:
  service:
    pingOne:
      regionCode: CA
      authentication:
        type: worker
        worker:
          environmentID: 9b0a0d1e-5a43-4c6c-9a3d-7f1b9f0c8e11
          clientID: wid
          clientSecret: wsecret
code:
  service:
    pingOne:
      regionCode: NA
      authentication:
        type: authorization_code
        environmentID: 2b0a0d1e-5a43-4c6c-9a3d-7f1b9f0c8e11
        authorizationCode:
          clientID: app
          redirectURIPath: /callback
          redirectURIPort: 7464
broken:
  service:
    pingOne:
      regionCode: NA
      authentication:
        type: client_credentials
        environmentID: 2b0a0d1e-5a43-4c6c-9a3d-7f1b9f0c8e11
        clientCredentials:
          clientID: ''
";

    #[test]
    fn test_active_profile() {
        let file = ProfileFile::parse(DOC).unwrap();
        let profile = file.profile(None).unwrap();
        assert_eq!(profile.name, "default");
        assert_eq!(profile.region, Region::Europe);
        assert_eq!(profile.grant_type, GrantType::ClientCredentials);
        assert_eq!(profile.client_secret.as_deref(), Some("secret"));
        assert!(profile.file_storage);
    }

    #[test]
    fn test_legacy_active_profile_key() {
        let doc = DOC.replace("activeProfile: default", "activeprofile: worker");
        let file = ProfileFile::parse(&doc).unwrap();
        assert_eq!(file.active_profile().unwrap(), "worker");
    }

    #[test]
    fn test_worker_environment_fallback() {
        let file = ProfileFile::parse(DOC).unwrap();
        let profile = file.profile(Some("worker")).unwrap();
        assert_eq!(profile.environment_id, "9b0a0d1e-5a43-4c6c-9a3d-7f1b9f0c8e11");
        assert_eq!(profile.region, Region::Canada);
        assert!(!profile.file_storage);
    }

    #[test]
    fn test_authorization_code_profile() {
        let file = ProfileFile::parse(DOC).unwrap();
        let profile = file.profile(Some("code")).unwrap();
        assert_eq!(profile.client_secret, None);
        assert_eq!(profile.redirect_uri_port.as_deref(), Some("7464"));
    }

    #[test]
    fn test_missing_key_is_path_labelled() {
        let file = ProfileFile::parse(DOC).unwrap();
        let err = file.profile(Some("broken")).unwrap_err();
        match err {
            ConfigError::MissingKey { key, profile, .. } => {
                assert_eq!(profile, "broken");
                assert_eq!(key, "broken.service.pingOne.authentication.clientCredentials.clientID");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_profile_and_grant() {
        let file = ProfileFile::parse(DOC).unwrap();
        assert!(matches!(
            file.profile(Some("nope")),
            Err(ConfigError::ProfileNotFound { .. })
        ));

        let doc = DOC.replace("type: worker", "type: implicit");
        let file = ProfileFile::parse(&doc).unwrap();
        assert!(matches!(
            file.profile(Some("worker")),
            Err(ConfigError::UnsupportedGrantType { .. })
        ));
    }

    #[test]
    fn test_missing_active_profile() {
        let file = ProfileFile::parse("default: {}").unwrap();
        assert!(matches!(file.active_profile(), Err(ConfigError::MissingKey { .. })));
    }
}
