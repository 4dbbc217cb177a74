//! Authentication state machine: owns the bearer token, mirrors it into the
//! HTTP adapter, persists it locally, and ends the session when the server
//! reports the credential as no longer valid.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use reqwest::Method;
use shared::{
    domain::SessionUser,
    protocol::{ApiEnvelope, Credentials, LoginData, MessageResponse},
};
use storage::Storage;
use tracing::{debug, info, warn};

use crate::{
    error::ApiError,
    notify::NotificationSink,
    transport::{FailedRequest, HookError, HookRegistration, HttpAdapter, ResponseHook},
};

pub const TOKEN_KEY: &str = "session.token";
pub const USER_KEY: &str = "session.user";
pub const SESSION_EXPIRED_NOTICE: &str = "Token expired. Please login again.";

const LOGIN_FAILED: &str = "Login failed";
const REGISTRATION_FAILED: &str = "Registration failed";

/// Durable client-local key/value storage for the session.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>>;
    async fn save(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

#[async_trait]
impl CredentialStore for Storage {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        self.get(key).await
    }

    async fn save(&self, key: &str, value: &str) -> Result<()> {
        self.put(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        Storage::remove(self, key).await.map(|_| ())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get(key))
    }

    async fn save(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Register,
    Dashboard,
}

impl Route {
    /// Where a request for `self` ends up given the session state.
    pub fn guard(self, authenticated: bool) -> Route {
        match (self, authenticated) {
            (Route::Login | Route::Register, true) => Route::Dashboard,
            (Route::Dashboard, false) => Route::Login,
            (route, _) => route,
        }
    }
}

pub trait Navigator: Send + Sync {
    fn current(&self) -> Route;
    fn navigate(&self, route: Route);
}

/// Navigator that only tracks the current route and how often it changed.
pub struct InMemoryNavigator {
    route: Mutex<Route>,
    navigations: Mutex<Vec<Route>>,
}

impl InMemoryNavigator {
    pub fn new(initial: Route) -> Self {
        Self {
            route: Mutex::new(initial),
            navigations: Mutex::new(Vec::new()),
        }
    }

    pub fn navigations(&self) -> Vec<Route> {
        self.navigations.lock().clone()
    }
}

impl Navigator for InMemoryNavigator {
    fn current(&self) -> Route {
        *self.route.lock()
    }

    fn navigate(&self, route: Route) {
        *self.route.lock() = route;
        self.navigations.lock().push(route);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub success: bool,
    pub message: String,
}

impl AuthOutcome {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn failed(error: &ApiError, fallback: &str) -> Self {
        Self {
            success: false,
            message: error.server_message().unwrap_or(fallback).to_string(),
        }
    }
}

#[derive(Default)]
struct SessionState {
    token: Option<String>,
    user: Option<SessionUser>,
}

/// State shared by the manager and its expiry hook.
struct SessionCore {
    state: RwLock<SessionState>,
    store: Arc<dyn CredentialStore>,
    navigator: Arc<dyn Navigator>,
    notifications: NotificationSink,
}

impl SessionCore {
    /// Clears the session and its traces. Returns whether a session was live;
    /// only the caller that observed the live token gets `true`.
    async fn end_session(&self, adapter: &HttpAdapter) -> bool {
        let was_live = {
            let mut state = self.state.write();
            let was_live = state.token.is_some();
            *state = SessionState::default();
            was_live
        };
        adapter.detach_credential();

        for key in [TOKEN_KEY, USER_KEY] {
            if let Err(err) = self.store.remove(key).await {
                warn!("session: failed to remove persisted {key}: {err:#}");
            }
        }

        if self.navigator.current() != Route::Login {
            self.navigator.navigate(Route::Login);
        }

        if was_live {
            info!("session: ended");
        }
        was_live
    }
}

const LOGIN_PATH: [&str; 3] = ["api", "auth", "login"];

struct ExpiryHook {
    core: Arc<SessionCore>,
}

#[async_trait]
impl ResponseHook for ExpiryHook {
    async fn on_error(&self, adapter: &HttpAdapter, request: &FailedRequest, error: &ApiError) {
        let ApiError::SessionExpired { message } = error else {
            return;
        };
        let ended_live = self.core.end_session(adapter).await;

        // Authenticated requests racing on one session share a single notice.
        let notify = if request.carried_credential {
            ended_live
        } else {
            !request.targets(&LOGIN_PATH)
        };
        if notify {
            info!(
                reason = %message,
                path = %request.path,
                "session: credential rejected by server, logged out"
            );
            self.core.notifications.error(SESSION_EXPIRED_NOTICE);
        } else {
            debug!(reason = %message, path = %request.path, "session: expiry signal already handled");
        }
    }
}

pub struct SessionManager {
    core: Arc<SessionCore>,
    adapter: Arc<HttpAdapter>,
    busy: AtomicBool,
    _expiry_hook: HookRegistration,
}

impl SessionManager {
    /// Registers the expiry hook on `adapter`; it stays installed for the
    /// lifetime of the manager.
    pub fn new(
        adapter: Arc<HttpAdapter>,
        store: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
        notifications: NotificationSink,
    ) -> Result<Self, HookError> {
        let core = Arc::new(SessionCore {
            state: RwLock::new(SessionState::default()),
            store,
            navigator,
            notifications,
        });
        let registration = adapter.register_response_hook(Arc::new(ExpiryHook {
            core: Arc::clone(&core),
        }))?;
        Ok(Self {
            core,
            adapter,
            busy: AtomicBool::new(false),
            _expiry_hook: registration,
        })
    }

    /// Restores a persisted session. Returns whether a token was found.
    pub async fn hydrate(&self) -> Result<bool> {
        let Some(token) = self.core.store.load(TOKEN_KEY).await? else {
            debug!("session: nothing persisted");
            return Ok(false);
        };

        let user = match self.core.store.load(USER_KEY).await? {
            Some(raw) => match serde_json::from_str::<SessionUser>(&raw) {
                Ok(user) => Some(user),
                Err(err) => {
                    warn!("session: discarding unreadable persisted identity: {err}");
                    None
                }
            },
            None => None,
        };

        self.adapter.attach_credential(&token)?;
        let username = user.as_ref().map(|u| u.username.clone());
        *self.core.state.write() = SessionState {
            token: Some(token),
            user,
        };
        info!(username = ?username, "session: restored from local state");
        Ok(true)
    }

    pub async fn login(&self, username: &str, password: &str) -> AuthOutcome {
        self.busy.store(true, Ordering::SeqCst);
        let outcome = async {
            let credentials = Credentials {
                username: username.to_string(),
                password: password.to_string(),
            };
            let response: ApiEnvelope<LoginData> = match self
                .adapter
                .send_json(Method::POST, &LOGIN_PATH, &credentials)
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    warn!(username, "session: login failed: {err}");
                    return AuthOutcome::failed(&err, LOGIN_FAILED);
                }
            };

            let LoginData {
                jwt,
                user_id,
                roles,
            } = response.data;
            if let Err(err) = self.adapter.attach_credential(&jwt) {
                warn!(username, "session: server issued an unusable token: {err}");
                return AuthOutcome::failed(&err, LOGIN_FAILED);
            }

            let user = SessionUser {
                user_id,
                username: username.to_string(),
                roles,
            };
            *self.core.state.write() = SessionState {
                token: Some(jwt.clone()),
                user: Some(user.clone()),
            };
            self.persist(&jwt, &user).await;

            info!(username, admin = user.is_admin(), "session: logged in");
            AuthOutcome::ok(
                response
                    .message
                    .unwrap_or_else(|| "Login successful".to_string()),
            )
        }
        .await;
        self.busy.store(false, Ordering::SeqCst);
        outcome
    }

    pub async fn register(&self, username: &str, password: &str) -> AuthOutcome {
        self.busy.store(true, Ordering::SeqCst);
        let credentials = Credentials {
            username: username.to_string(),
            password: password.to_string(),
        };
        let outcome = match self
            .adapter
            .send_json::<_, MessageResponse>(Method::POST, &["api", "auth", "register"], &credentials)
            .await
        {
            Ok(response) => {
                info!(username, "session: registered");
                AuthOutcome::ok(
                    response
                        .message
                        .unwrap_or_else(|| "Registration successful".to_string()),
                )
            }
            Err(err) => {
                warn!(username, "session: registration failed: {err}");
                AuthOutcome::failed(&err, REGISTRATION_FAILED)
            }
        };
        self.busy.store(false, Ordering::SeqCst);
        outcome
    }

    /// Ends the session. Safe to call without one.
    pub async fn logout(&self) {
        self.core.end_session(&self.adapter).await;
    }

    pub fn is_authenticated(&self) -> bool {
        self.core.state.read().token.is_some()
    }

    pub fn current_user(&self) -> Option<SessionUser> {
        self.core.state.read().user.clone()
    }

    pub fn token(&self) -> Option<String> {
        self.core.state.read().token.clone()
    }

    pub fn is_admin(&self) -> bool {
        self.core
            .state
            .read()
            .user
            .as_ref()
            .is_some_and(SessionUser::is_admin)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.core.navigator
    }

    async fn persist(&self, token: &str, user: &SessionUser) {
        if let Err(err) = self.core.store.save(TOKEN_KEY, token).await {
            warn!("session: failed to persist token: {err:#}");
        }
        match serde_json::to_string(user) {
            Ok(raw) => {
                if let Err(err) = self.core.store.save(USER_KEY, &raw).await {
                    warn!("session: failed to persist identity: {err:#}");
                }
            }
            Err(err) => warn!("session: failed to encode identity: {err}"),
        }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
