//! The per-resource handler contract.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::client::ApiClient;
use crate::diag::Diagnostics;
use crate::error::Result;
use crate::value::Value;

/// Result of reading a resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// The resource exists; its refreshed state.
    Found(Value),
    /// The resource no longer exists remotely.
    NotFound,
}

/// Result of updating a resource.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The update was applied.
    Updated(Value),
    /// The resource no longer exists remotely.
    NotFound,
}

/// Sink for state that must survive a failed or cancelled operation.
///
/// A handler records the state as soon as the remote system has allocated
/// an identifier. If the operation later fails, the driver persists the
/// recorded state alongside the error.
#[derive(Debug, Clone, Default)]
pub struct StateWriter {
    recorded: Arc<Mutex<Option<Value>>>,
}

impl StateWriter {
    /// Records `state`, replacing anything recorded earlier.
    pub fn record(&self, state: Value) {
        *self.recorded.lock().unwrap_or_else(PoisonError::into_inner) = Some(state);
    }

    /// Takes the recorded state.
    #[must_use]
    pub fn take(&self) -> Option<Value> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// Everything a handler call may use.
#[derive(Debug)]
pub struct OpContext<'a> {
    /// API client.
    pub client: &'a ApiClient,
    /// Resource type name.
    pub resource_type: &'a str,
    /// Instance address.
    pub address: &'a str,
    /// Cancellation signal of the operation.
    pub cancel: CancellationToken,
    /// Partial state sink.
    pub partial: StateWriter,
}

/// Create/Read/Update/Delete against the remote system for one resource type.
///
/// Values passed in and returned are whole resource objects conforming to
/// the type's current schema. Handlers never see trigger attributes change
/// meaning: the driver carries them over from the plan.
#[async_trait]
pub trait ResourceHandler: fmt::Debug + Send + Sync {
    /// Creates the resource described by `planned`.
    ///
    /// The returned state must carry the identifiers needed by
    /// [`ResourceHandler::read`]; the driver reads right after.
    async fn create(&self, ctx: &OpContext<'_>, planned: &Value, diags: &mut Diagnostics) -> Result<Value>;

    /// Reads the current remote state.
    async fn read(&self, ctx: &OpContext<'_>, current: &Value, diags: &mut Diagnostics) -> Result<ReadOutcome>;

    /// Updates the resource from `prior` to `planned`.
    async fn update(
        &self,
        ctx: &OpContext<'_>,
        prior: &Value,
        planned: &Value,
        diags: &mut Diagnostics,
    ) -> Result<UpdateOutcome>;

    /// Deletes the resource. A resource that is already gone is a success.
    async fn delete(&self, ctx: &OpContext<'_>, current: &Value, diags: &mut Diagnostics) -> Result<()>;

    /// Returns true if the instance identified by `id` exists.
    ///
    /// Used when this type is the parent of another type.
    async fn exists(&self, ctx: &OpContext<'_>, id: &str) -> Result<bool> {
        let _ = (ctx, id);
        Ok(true)
    }
}
