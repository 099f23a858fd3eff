//! In-memory handler used by unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::diag::Diagnostics;
use crate::error::{ApiError, Result};
use crate::schema::{Attribute, Schema};
use crate::value::{AttrType, Value};

use super::handler::{OpContext, ReadOutcome, ResourceHandler, UpdateOutcome};

/// Schema served by [`MemoryHandler`].
pub fn memory_schema() -> Schema {
    Schema::new(
        0,
        "in-memory widget",
        [
            ("id", Attribute::computed(AttrType::ResourceId)),
            ("environment_id", Attribute::required(AttrType::ResourceId)),
            ("name", Attribute::required(AttrType::String)),
            ("description", Attribute::optional(AttrType::String)),
            ("secret", Attribute::computed(AttrType::String).sensitive()),
            ("triggers", Attribute::optional(AttrType::map(AttrType::String)).trigger()),
        ],
    )
}

#[derive(Debug, Default)]
pub struct MemoryHandler {
    objects: Mutex<BTreeMap<String, Value>>,
    calls: Mutex<Vec<&'static str>>,
    gone: AtomicBool,
    fail_after_allocation: bool,
    delay: Option<Duration>,
}

impl MemoryHandler {
    pub fn failing_after_allocation() -> Self {
        Self {
            fail_after_allocation: true,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_gone(&self, gone: bool) {
        self.gone.store(gone, Ordering::SeqCst);
    }

    pub fn forget_all(&self) {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Stores a resolved copy of `config` without recording a call.
    pub fn seed(&self, config: &Value) -> Value {
        let state = resolve(config, None);
        self.store(&state);
        state
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(call);
    }

    fn store(&self, state: &Value) {
        if let Some(id) = state.attr("id").as_str() {
            self.objects
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id.to_string(), state.clone());
        }
    }

    fn lookup(&self, state: &Value) -> Option<Value> {
        let id = state.attr("id").as_str()?;
        self.objects.lock().unwrap_or_else(PoisonError::into_inner).get(id).cloned()
    }
}

fn resolve(planned: &Value, id: Option<&str>) -> Value {
    let mut state = planned.clone();
    let id = id.map_or_else(|| uuid::Uuid::new_v4().to_string(), ToString::to_string);
    if !state.attr("id").is_known() {
        state.set_attr("id", Value::String(id));
    }
    if !state.attr("secret").is_known() {
        state.set_attr("secret", Value::String(format!("secret-{}", uuid::Uuid::new_v4())));
    }
    state
}

#[async_trait]
impl ResourceHandler for MemoryHandler {
    async fn create(&self, ctx: &OpContext<'_>, planned: &Value, _diags: &mut Diagnostics) -> Result<Value> {
        self.record("create");
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let state = resolve(planned, None);
        if self.fail_after_allocation {
            ctx.partial.record(state);
            return Err(ApiError::Upstream {
                operation: String::from("ConfigureWidget"),
                status: 500,
                attempts: 1,
                message: String::from("internal error"),
                detail: String::new(),
            }
            .into());
        }
        self.store(&state);
        Ok(state)
    }

    async fn read(&self, _ctx: &OpContext<'_>, current: &Value, _diags: &mut Diagnostics) -> Result<ReadOutcome> {
        self.record("read");
        Ok(self.lookup(current).map_or(ReadOutcome::NotFound, ReadOutcome::Found))
    }

    async fn update(
        &self,
        _ctx: &OpContext<'_>,
        prior: &Value,
        planned: &Value,
        _diags: &mut Diagnostics,
    ) -> Result<UpdateOutcome> {
        self.record("update");
        if self.lookup(prior).is_none() {
            return Ok(UpdateOutcome::NotFound);
        }
        let state = resolve(planned, prior.attr("id").as_str());
        self.store(&state);
        Ok(UpdateOutcome::Updated(state))
    }

    async fn delete(&self, _ctx: &OpContext<'_>, current: &Value, _diags: &mut Diagnostics) -> Result<()> {
        self.record("delete");
        if let Some(id) = current.attr("id").as_str() {
            self.objects.lock().unwrap_or_else(PoisonError::into_inner).remove(id);
        }
        Ok(())
    }

    async fn exists(&self, _ctx: &OpContext<'_>, _id: &str) -> Result<bool> {
        Ok(!self.gone.load(Ordering::SeqCst))
    }
}
