//! State store trait definition.

use async_trait::async_trait;

use crate::error::Result;
use crate::schema::Registry;

use super::types::StateDocument;

/// A state document as loaded, with every instance at its current schema
/// version.
#[derive(Debug, Default)]
pub struct LoadedState {
    /// The upgraded document.
    pub document: StateDocument,
    /// Addresses whose stored schema version was older.
    pub upgraded: Vec<String>,
}

/// Where state documents are kept.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the state document and runs every instance through the
    /// upgrader chain of its resource type in `registry`.
    ///
    /// Returns `None` if no state exists yet.
    ///
    /// # Errors
    ///
    /// Fails on unreadable state, an unregistered resource type, or an
    /// instance whose upgrade chain is broken.
    async fn load(&self, registry: &Registry) -> Result<Option<LoadedState>>;

    /// Saves the state document, bumping its serial.
    async fn save(&self, state: &StateDocument) -> Result<()>;

    /// Human-readable location, for logs.
    fn location(&self) -> String;
}
