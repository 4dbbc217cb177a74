use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

pub mod error;
pub mod inventory;
pub mod mutations;
pub mod notify;
pub mod session;
pub mod transport;

pub use error::{is_session_expired, ApiError, ErrorKind};
pub use inventory::{InventoryView, RefreshQuery, ViewSnapshot};
pub use mutations::{AlwaysConfirm, Confirmation, MutationOrchestrator, MutationOutcome};
pub use notify::{Notification, NotificationLevel, NotificationReceiver, NotificationSink};
pub use session::{
    AuthOutcome, CredentialStore, InMemoryNavigator, MemoryStore, Navigator, Route,
    SessionManager,
};
pub use transport::{FailedRequest, HookError, HookRegistration, HttpAdapter, ResponseHook};

/// One wired-up client: a shared adapter with the session's expiry hook
/// installed, the view controller, and the mutation orchestrator on top.
pub struct InventoryClient {
    pub session: SessionManager,
    pub view: Arc<InventoryView>,
    pub mutations: MutationOrchestrator,
    adapter: Arc<HttpAdapter>,
}

impl InventoryClient {
    pub fn new(
        api_base_url: &str,
        store: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
        confirmation: Arc<dyn Confirmation>,
        notifications: NotificationSink,
    ) -> Result<Self> {
        let adapter = HttpAdapter::new(api_base_url)
            .with_context(|| format!("failed to build http adapter for {api_base_url}"))?;
        let session = SessionManager::new(
            Arc::clone(&adapter),
            store,
            navigator,
            notifications.clone(),
        )
        .context("failed to install session expiry hook")?;
        let view = Arc::new(InventoryView::new(
            Arc::clone(&adapter),
            notifications.clone(),
        ));
        let mutations = MutationOrchestrator::new(
            Arc::clone(&adapter),
            Arc::clone(&view),
            notifications,
            confirmation,
        );
        info!(api = %adapter.base_url(), "client: initialised");
        Ok(Self {
            session,
            view,
            mutations,
            adapter,
        })
    }

    pub fn adapter(&self) -> &Arc<HttpAdapter> {
        &self.adapter
    }
}

#[cfg(test)]
#[path = "tests/mock_api.rs"]
mod mock_api;
