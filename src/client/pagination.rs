//! Paged list endpoints.
//!
//! PingOne list responses carry their items under `_embedded.<key>` and a
//! link to the next page under `_links.next.href`. [`Pages`] fetches one
//! page per call and stops at the first page without a next link, or whose
//! next link was already followed.

use std::collections::HashSet;

use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{LifecycleError, ProviderError, Result};

use super::api::{ApiClient, ApiRequest, ApiResponse};

/// Lazy, finite sequence of pages of a list endpoint.
#[derive(Debug)]
pub struct Pages<'a> {
    client: &'a ApiClient,
    operation: String,
    embedded: String,
    environment_id: Option<String>,
    next: Option<String>,
    seen: HashSet<String>,
    cancel: CancellationToken,
    fetched: usize,
}

impl<'a> Pages<'a> {
    /// Starts paging `path`, reading items from `_embedded.<embedded>`.
    #[must_use]
    pub fn new(
        client: &'a ApiClient,
        operation: impl Into<String>,
        path: impl Into<String>,
        embedded: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            operation: operation.into(),
            embedded: embedded.into(),
            environment_id: None,
            next: Some(path.into()),
            seen: HashSet::new(),
            cancel,
            fetched: 0,
        }
    }

    /// Rechecks `environment_id` when a page fails with 400/401/403.
    #[must_use]
    pub fn in_environment(mut self, environment_id: impl Into<String>) -> Self {
        self.environment_id = Some(environment_id.into());
        self
    }

    /// Fetches the next page; `None` once the sequence is exhausted.
    ///
    /// A list endpoint that returns 404 yields no pages.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Cancelled`] if the operation was cancelled
    /// before the page was requested, or the classified API error.
    pub async fn next_page(&mut self) -> Result<Option<Vec<JsonValue>>> {
        let Some(path) = self.next.take() else {
            return Ok(None);
        };
        if self.cancel.is_cancelled() {
            return Err(ProviderError::Lifecycle(LifecycleError::Cancelled {
                operation: self.operation.clone(),
                address: path,
            }));
        }

        self.seen.insert(path.clone());
        let mut request = ApiRequest::get(self.operation.clone(), path);
        if let Some(environment_id) = &self.environment_id {
            request = request.in_environment(environment_id.clone());
        }
        let body = match self.client.send(&request).await? {
            ApiResponse::Ok { body, .. } => body,
            ApiResponse::NotFound { .. } => return Ok(None),
        };

        self.next = body
            .pointer("/_links/next/href")
            .and_then(JsonValue::as_str)
            .filter(|href| {
                let fresh = !self.seen.contains(*href);
                if !fresh {
                    warn!(operation = %self.operation, href, "Next page link repeats a fetched page; stopping");
                }
                fresh
            })
            .map(ToString::to_string);
        self.fetched += 1;

        let items = body
            .get("_embedded")
            .and_then(|e| e.get(&self.embedded))
            .and_then(JsonValue::as_array)
            .cloned()
            .unwrap_or_default();
        debug!(
            operation = %self.operation,
            page = self.fetched,
            items = items.len(),
            has_next = self.next.is_some(),
            "Fetched page"
        );
        Ok(Some(items))
    }

    /// Pages until an item satisfies `predicate`.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Pages::next_page`].
    pub async fn find<F>(mut self, predicate: F) -> Result<Option<JsonValue>>
    where
        F: Fn(&JsonValue) -> bool,
    {
        while let Some(items) = self.next_page().await? {
            if let Some(found) = items.into_iter().find(|item| predicate(item)) {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Collects every item of every page.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Pages::next_page`].
    pub async fn collect_all(mut self) -> Result<Vec<JsonValue>> {
        let mut all = Vec::new();
        while let Some(items) = self.next_page().await? {
            all.extend(items);
        }
        Ok(all)
    }
}
