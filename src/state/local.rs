//! JSON state file.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{ProviderError, Result, StateError};
use crate::schema::Registry;

use super::migrate::upgrade_document;
use super::store::{LoadedState, StateStore};
use super::types::{StateDocument, STATE_FORMAT_VERSION};

/// Default state directory name.
const STATE_DIR: &str = ".pingone";

/// State file name.
const STATE_FILE: &str = "state.json";

/// State kept in a single JSON file, replaced atomically on save.
#[derive(Debug)]
pub struct LocalStateStore {
    state_path: PathBuf,
}

fn write_error(what: &str, e: &std::io::Error) -> ProviderError {
    ProviderError::State(StateError::serialization(format!("Failed to {what}: {e}")))
}

impl LocalStateStore {
    /// Uses `.pingone/state.json` under the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn new() -> Result<Self> {
        let dir = std::env::current_dir()
            .map_err(|e| ProviderError::internal(format!("Cannot determine current directory: {e}")))?;
        Ok(Self::with_state_path(dir.join(STATE_DIR).join(STATE_FILE)))
    }

    /// Uses the given state file.
    #[must_use]
    pub fn with_state_path(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
        }
    }

    /// Path of the state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.state_path
    }

    async fn read(&self) -> Result<Option<StateDocument>> {
        let content = match fs::read_to_string(&self.state_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.state_path.display(), "No state file yet");
                return Ok(None);
            }
            Err(e) => {
                return Err(StateError::corrupted(format!("Failed to read state file: {e}")).into());
            }
        };

        let state: StateDocument = serde_json::from_str(&content)
            .map_err(|e| StateError::corrupted(format!("Failed to parse state file: {e}")))?;
        if state.version != STATE_FORMAT_VERSION {
            return Err(StateError::corrupted(format!(
                "Unsupported state format version {} (expected {STATE_FORMAT_VERSION})",
                state.version
            ))
            .into());
        }
        Ok(Some(state))
    }
}

#[async_trait]
impl StateStore for LocalStateStore {
    async fn load(&self, registry: &Registry) -> Result<Option<LoadedState>> {
        let Some(mut document) = self.read().await? else {
            return Ok(None);
        };
        let upgraded = upgrade_document(registry, &mut document)?;
        info!(
            path = %self.state_path.display(),
            resources = document.resources.len(),
            upgraded = upgraded.len(),
            "Loaded state"
        );
        Ok(Some(LoadedState { document, upgraded }))
    }

    async fn save(&self, state: &StateDocument) -> Result<()> {
        if let Some(dir) = self.state_path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| write_error("create state directory", &e))?;
        }

        let mut next = state.clone();
        next.serial += 1;
        info!(
            path = %self.state_path.display(),
            resources = next.resources.len(),
            serial = next.serial,
            "Saving state"
        );
        let content = serde_json::to_string_pretty(&next)
            .map_err(|e| StateError::serialization(format!("Failed to serialize state: {e}")))?;

        let temp_path = self.state_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| write_error("create temp state file", &e))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| write_error("write state file", &e))?;
        file.sync_all().await.map_err(|e| write_error("sync state file", &e))?;
        fs::rename(&temp_path, &self.state_path)
            .await
            .map_err(|e| write_error("rename state file", &e))?;

        debug!("State saved");
        Ok(())
    }

    fn location(&self) -> String {
        self.state_path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::default_registry;
    use crate::state::{HistoryOperation, InstanceState};
    use crate::value::Value;
    use serde_json::json;
    use tempfile::TempDir;

    const ENV: &str = "6f3e1b7a-2c4d-4e5f-8a9b-0c1d2e3f4a5b";
    const POP: &str = "0b1c2d3e-4f5a-4b6c-8d7e-9f0a1b2c3d4e";

    fn create_test_store() -> (LocalStateStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = LocalStateStore::with_state_path(temp_dir.path().join("state").join(STATE_FILE));
        (store, temp_dir)
    }

    fn population(version: u64, value: serde_json::Value) -> InstanceState {
        InstanceState {
            resource_type: String::from("pingone_population"),
            schema_version: version,
            resource_id: Some(POP.to_string()),
            depends_on: Vec::new(),
            value,
            updated_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _temp) = create_test_store();
        let registry = default_registry().expect("registry");

        let mut state = StateDocument::new();
        let value = Value::object([
            ("id", Value::string(POP)),
            ("environment_id", Value::string(ENV)),
            ("name", Value::string("staff")),
        ]);
        state.set("pingone_population.staff", InstanceState::new("pingone_population", 2, &value));
        store.save(&state).await.expect("Failed to save state");

        let loaded = store
            .load(&registry)
            .await
            .expect("Failed to load state")
            .expect("State should exist");

        assert_eq!(loaded.document.serial, 1);
        assert!(loaded.upgraded.is_empty());
        let instance = loaded.document.get("pingone_population.staff").expect("instance");
        assert_eq!(instance.schema_version, 2);
        assert_eq!(instance.resource_id.as_deref(), Some(POP));
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let (store, _temp) = create_test_store();
        let registry = default_registry().expect("registry");
        assert!(store.load(&registry).await.expect("Load should not fail").is_none());
    }

    #[tokio::test]
    async fn test_load_upgrades_old_instances() {
        let (store, _temp) = create_test_store();
        let registry = default_registry().expect("registry");

        let mut state = StateDocument::new();
        state.set(
            "pingone_population.staff",
            population(
                0,
                json!({ "id": POP, "environment_id": ENV, "name": "staff", "password_policy_id": POP }),
            ),
        );
        store.save(&state).await.expect("save");

        let loaded = store.load(&registry).await.expect("load").expect("state");
        assert_eq!(loaded.upgraded, vec![String::from("pingone_population.staff")]);
        let instance = loaded.document.get("pingone_population.staff").expect("instance");
        assert_eq!(instance.schema_version, 2);
        assert_eq!(instance.value["password_policy"], json!({ "id": POP }));
        assert_eq!(
            loaded.document.history.last().map(|h| h.operation),
            Some(HistoryOperation::Upgrade)
        );
    }

    #[tokio::test]
    async fn test_load_fails_when_an_upgrade_step_rejects() {
        let (store, _temp) = create_test_store();
        let registry = default_registry().expect("registry");

        let mut state = StateDocument::new();
        state.set(
            "pingone_population.staff",
            population(
                1,
                json!({
                    "id": POP, "environment_id": ENV, "name": "staff",
                    "password_policy": [{ "id": POP }, { "id": POP }]
                }),
            ),
        );
        store.save(&state).await.expect("save");

        assert!(matches!(
            store.load(&registry).await,
            Err(ProviderError::State(StateError::UpgradeFailed { from: 1, .. }))
        ));
    }

    #[tokio::test]
    async fn test_load_fails_on_future_version() {
        let (store, _temp) = create_test_store();
        let registry = default_registry().expect("registry");

        let mut state = StateDocument::new();
        state.set(
            "pingone_population.staff",
            population(9, json!({ "id": POP, "environment_id": ENV, "name": "staff" })),
        );
        store.save(&state).await.expect("save");

        assert!(matches!(
            store.load(&registry).await,
            Err(ProviderError::State(StateError::FutureVersion { found: 9, .. }))
        ));
    }

    #[tokio::test]
    async fn test_corrupt_file() {
        let (store, _temp) = create_test_store();
        let registry = default_registry().expect("registry");
        store.save(&StateDocument::new()).await.expect("Failed to save state");
        tokio::fs::write(store.path(), "{not json").await.expect("write");

        assert!(matches!(
            store.load(&registry).await,
            Err(ProviderError::State(StateError::Corrupted { .. }))
        ));
    }
}
