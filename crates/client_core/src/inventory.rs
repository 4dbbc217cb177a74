//! View-state for the item list: which query feeds the visible collection
//! (browse by filter mode, or search) and how it is refreshed after writes.
//!
//! The visible collection is only ever replaced wholesale. Overlapping
//! `load`/`search` calls are not sequenced; whichever response lands last
//! wins.

use std::sync::Arc;

use shared::{
    domain::{FilterMode, Item, ItemId, SearchPredicate},
    protocol::ApiEnvelope,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{error::ApiError, notify::NotificationSink, transport::HttpAdapter};

pub const LOAD_FAILED_ERROR: &str = "Failed to fetch sweets. Please try again.";
pub const LOAD_FAILED_NOTICE: &str = "Failed to fetch sweets";
pub const SEARCH_FAILED_ERROR: &str = "Failed to search sweets. Please try again.";
pub const SEARCH_FAILED_NOTICE: &str = "Search failed";
pub const SEARCH_DONE_NOTICE: &str = "Search completed successfully";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewSnapshot {
    pub filter_mode: FilterMode,
    /// Active search; `Some` only for a non-empty, trimmed predicate.
    pub search: Option<SearchPredicate>,
    pub items: Vec<Item>,
    pub loading: bool,
    pub searching: bool,
    pub error: Option<String>,
}

impl ViewSnapshot {
    pub fn heading(&self) -> &'static str {
        if self.search.is_some() {
            "Search Results"
        } else {
            "Available Sweets"
        }
    }
}

/// Which query the next refresh will issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshQuery {
    Browse(FilterMode),
    Search(SearchPredicate),
}

pub struct InventoryView {
    adapter: Arc<HttpAdapter>,
    notifications: NotificationSink,
    state: Mutex<ViewSnapshot>,
}

impl InventoryView {
    pub fn new(adapter: Arc<HttpAdapter>, notifications: NotificationSink) -> Self {
        Self {
            adapter,
            notifications,
            state: Mutex::new(ViewSnapshot::default()),
        }
    }

    pub async fn snapshot(&self) -> ViewSnapshot {
        self.state.lock().await.clone()
    }

    pub async fn filter_mode(&self) -> FilterMode {
        self.state.lock().await.filter_mode
    }

    pub async fn active_search(&self) -> Option<SearchPredicate> {
        self.state.lock().await.search.clone()
    }

    pub async fn find_item(&self, id: &ItemId) -> Option<Item> {
        self.state
            .lock()
            .await
            .items
            .iter()
            .find(|item| &item.id == id)
            .cloned()
    }

    /// Replaces the visible collection with the listing bound to `mode`.
    /// Returns the number of visible items.
    pub async fn load(&self, mode: FilterMode) -> Result<usize, ApiError> {
        {
            let mut state = self.state.lock().await;
            state.loading = true;
            state.error = None;
        }

        let result = self.fetch_listing(mode).await;

        let mut state = self.state.lock().await;
        state.loading = false;
        match result {
            Ok(items) => {
                let count = items.len();
                info!(filter = %mode, count, "inventory: listing loaded");
                state.items = items;
                Ok(count)
            }
            Err(err) => {
                if err.is_session_expired() {
                    debug!(filter = %mode, "inventory: listing aborted by session expiry");
                } else {
                    warn!(filter = %mode, "inventory: listing failed: {err}");
                    state.error = Some(LOAD_FAILED_ERROR.to_string());
                    drop(state);
                    self.notifications.error(LOAD_FAILED_NOTICE);
                }
                Err(err)
            }
        }
    }

    /// Runs a search and makes its predicate the active query source.
    /// A predicate with every field blank is refused without a request.
    pub async fn search(&self, predicate: &SearchPredicate) -> Result<usize, ApiError> {
        let Some(predicate) = predicate.normalized() else {
            info!("inventory: search skipped, every field is blank");
            return Err(ApiError::Validation(
                "search needs at least one non-blank field".into(),
            ));
        };

        {
            let mut state = self.state.lock().await;
            state.searching = true;
            state.error = None;
        }

        let result = self
            .adapter
            .get_json::<ApiEnvelope<Vec<Item>>>(
                &["api", "sweets", "search"],
                &predicate.query_pairs(),
            )
            .await;

        let mut state = self.state.lock().await;
        state.searching = false;
        match result {
            Ok(envelope) => {
                let count = envelope.data.len();
                info!(query = ?predicate.query_pairs(), count, "inventory: search completed");
                state.items = envelope.data;
                state.search = Some(predicate);
                drop(state);
                self.notifications.success(SEARCH_DONE_NOTICE);
                Ok(count)
            }
            Err(err) => {
                if err.is_session_expired() {
                    debug!("inventory: search aborted by session expiry");
                } else {
                    warn!("inventory: search failed: {err}");
                    state.error = Some(SEARCH_FAILED_ERROR.to_string());
                    drop(state);
                    self.notifications.error(SEARCH_FAILED_NOTICE);
                }
                Err(err)
            }
        }
    }

    /// Drops the active search and reloads the current filter mode.
    pub async fn clear_search(&self) -> Result<usize, ApiError> {
        let mode = {
            let mut state = self.state.lock().await;
            state.search = None;
            state.filter_mode
        };
        self.load(mode).await
    }

    /// Switches filter mode and discards any active search. Does not reload.
    pub async fn set_filter_mode(&self, mode: FilterMode) {
        let mut state = self.state.lock().await;
        if state.search.take().is_some() {
            debug!(filter = %mode, "inventory: filter change cleared active search");
        }
        state.filter_mode = mode;
    }

    /// `set_filter_mode` followed by the reload a bound view would trigger.
    pub async fn select_filter(&self, mode: FilterMode) -> Result<usize, ApiError> {
        self.set_filter_mode(mode).await;
        self.load(mode).await
    }

    pub async fn next_refresh(&self) -> RefreshQuery {
        let state = self.state.lock().await;
        match &state.search {
            Some(predicate) => RefreshQuery::Search(predicate.clone()),
            None => RefreshQuery::Browse(state.filter_mode),
        }
    }

    /// Re-derives the visible collection after a write: replays the active
    /// search if there is one, otherwise reloads the current filter mode.
    pub async fn refresh_after_mutation(&self) -> Result<usize, ApiError> {
        match self.next_refresh().await {
            RefreshQuery::Search(predicate) => self.search(&predicate).await,
            RefreshQuery::Browse(mode) => self.load(mode).await,
        }
    }

    async fn fetch_listing(&self, mode: FilterMode) -> Result<Vec<Item>, ApiError> {
        // NotAvailable is always derived from a fresh full listing.
        let segments: &[&str] = match mode {
            FilterMode::Available => &["api", "sweets", "available"],
            FilterMode::All | FilterMode::NotAvailable => &["api", "sweets"],
        };
        let envelope: ApiEnvelope<Vec<Item>> = self.adapter.get_json(segments, &[]).await?;
        Ok(match mode {
            FilterMode::NotAvailable => envelope
                .data
                .into_iter()
                .filter(|item| item.quantity == 0)
                .collect(),
            _ => envelope.data,
        })
    }
}

#[cfg(test)]
#[path = "tests/inventory_tests.rs"]
mod tests;
