//! Admin and shopper writes. Each operation performs the remote call, reports
//! the result once, and hands the list back to [`InventoryView`] to refresh.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use shared::{
    domain::{Item, ItemDraft, ItemId},
    protocol::QuantityRequest,
};
use tracing::{info, warn};

use crate::{
    error::{ApiError, ErrorKind},
    inventory::InventoryView,
    notify::NotificationSink,
    transport::HttpAdapter,
};

pub const CONNECTIVITY_NOTICE: &str = "Connection error: unable to reach the inventory service";

/// Asks the user to confirm a destructive action.
#[async_trait]
pub trait Confirmation: Send + Sync {
    async fn confirm(&self, prompt: &str) -> bool;
}

pub struct AlwaysConfirm;

#[async_trait]
impl Confirmation for AlwaysConfirm {
    async fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    Cancelled,
    /// Structural precondition failed; nothing was sent.
    Invalid(String),
    /// The session ended while the write was in flight; already reported.
    SessionExpired,
    Failed(ErrorKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Create,
    Update,
    Delete,
    Purchase,
    Restock,
}

impl Action {
    fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Purchase => "purchase",
            Self::Restock => "restock",
        }
    }

    fn fallback_message(self) -> &'static str {
        match self {
            Self::Create | Self::Update => "Failed to save sweet. Please try again.",
            Self::Delete => "Failed to delete sweet. Please try again.",
            Self::Purchase => "Purchase failed. Please try again.",
            Self::Restock => "Failed to restock sweet. Please try again.",
        }
    }
}

pub fn delete_prompt(item: &Item) -> String {
    format!(
        "Are you sure you want to delete \"{}\"? This action cannot be undone.",
        item.name
    )
}

pub struct MutationOrchestrator {
    adapter: Arc<HttpAdapter>,
    view: Arc<InventoryView>,
    notifications: NotificationSink,
    confirmation: Arc<dyn Confirmation>,
}

impl MutationOrchestrator {
    pub fn new(
        adapter: Arc<HttpAdapter>,
        view: Arc<InventoryView>,
        notifications: NotificationSink,
        confirmation: Arc<dyn Confirmation>,
    ) -> Self {
        Self {
            adapter,
            view,
            notifications,
            confirmation,
        }
    }

    pub async fn create_item(&self, draft: &ItemDraft) -> MutationOutcome {
        if let Err(reason) = check_draft(draft) {
            return self.invalid(Action::Create, reason);
        }
        let result = self
            .adapter
            .send_body(Method::POST, &["api", "sweets"], draft)
            .await;
        self.finish(
            Action::Create,
            result,
            format!("Sweet \"{}\" added successfully", draft.name),
        )
        .await
    }

    pub async fn update_item(&self, id: &ItemId, draft: &ItemDraft) -> MutationOutcome {
        if let Err(reason) = check_draft(draft) {
            return self.invalid(Action::Update, reason);
        }
        let result = self
            .adapter
            .send_body(Method::PUT, &["api", "sweets", id.as_str()], draft)
            .await;
        self.finish(
            Action::Update,
            result,
            format!("Sweet \"{}\" updated successfully", draft.name),
        )
        .await
    }

    /// Asks for confirmation first; a refusal sends nothing.
    pub async fn delete_item(&self, item: &Item) -> MutationOutcome {
        if !self.confirmation.confirm(&delete_prompt(item)).await {
            info!(item_id = %item.id, "mutation: delete cancelled");
            return MutationOutcome::Cancelled;
        }
        let result = self
            .adapter
            .delete(&["api", "sweets", item.id.as_str()])
            .await;
        self.finish(
            Action::Delete,
            result,
            format!("Sweet \"{}\" deleted successfully", item.name),
        )
        .await
    }

    /// Buys `quantity` units. The upper bound is the quantity currently shown
    /// for the item; the server settles any race with the real stock.
    pub async fn purchase(&self, id: &ItemId, quantity: u32) -> MutationOutcome {
        if quantity == 0 {
            return self.invalid(Action::Purchase, "quantity must be a positive integer");
        }
        let Some(displayed) = self.view.find_item(id).await else {
            return self.invalid(Action::Purchase, format!("item {id} is not in the current view"));
        };
        if quantity > displayed.quantity {
            return self.invalid(
                Action::Purchase,
                format!(
                    "only {} units of \"{}\" are available",
                    displayed.quantity, displayed.name
                ),
            );
        }

        let result = self
            .adapter
            .send_body(
                Method::POST,
                &["api", "sweets", id.as_str(), "purchase"],
                &QuantityRequest { quantity },
            )
            .await;
        self.finish(
            Action::Purchase,
            result,
            format!("Successfully purchased {quantity} units!"),
        )
        .await
    }

    pub async fn restock(&self, id: &ItemId, quantity: u32) -> MutationOutcome {
        if quantity == 0 {
            return self.invalid(Action::Restock, "quantity must be a positive integer");
        }
        let result = self
            .adapter
            .send_body(
                Method::POST,
                &["api", "sweets", id.as_str(), "restock"],
                &QuantityRequest { quantity },
            )
            .await;
        self.finish(
            Action::Restock,
            result,
            format!("Successfully restocked {quantity} units!"),
        )
        .await
    }

    fn invalid(&self, action: Action, reason: impl Into<String>) -> MutationOutcome {
        let reason = reason.into();
        warn!(action = action.as_str(), "mutation: rejected locally: {reason}");
        MutationOutcome::Invalid(reason)
    }

    async fn finish(
        &self,
        action: Action,
        result: Result<(), ApiError>,
        success_message: String,
    ) -> MutationOutcome {
        match result {
            Ok(()) => {
                info!(action = action.as_str(), "mutation: applied");
                self.notifications.success(success_message);
                // Refresh failures are reported by the view itself.
                let _ = self.view.refresh_after_mutation().await;
                MutationOutcome::Applied
            }
            Err(err) if err.is_session_expired() => {
                info!(action = action.as_str(), "mutation: abandoned, session expired");
                MutationOutcome::SessionExpired
            }
            Err(err) => {
                warn!(action = action.as_str(), "mutation: failed: {err}");
                let message = match &err {
                    ApiError::Connectivity(_) => CONNECTIVITY_NOTICE,
                    other => other.server_message().unwrap_or(action.fallback_message()),
                };
                self.notifications.error(message);
                MutationOutcome::Failed(err.kind())
            }
        }
    }
}

fn check_draft(draft: &ItemDraft) -> Result<(), String> {
    if !draft.price.is_finite() || draft.price < 0.0 {
        return Err("price must be a non-negative number".into());
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/mutations_tests.rs"]
mod tests;
