//! Outbound HTTP adapter: one default-header slot for the bearer credential
//! and one response-error hook slot. Every API call in the crate goes through
//! [`HttpAdapter`], so the hook observes all failures regardless of origin.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Weak,
};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client, Method, RequestBuilder, Response,
};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::error::ApiError;

/// Observer for failed exchanges. Runs before the error is returned to the
/// caller, which still receives the original error.
#[async_trait]
pub trait ResponseHook: Send + Sync {
    async fn on_error(&self, adapter: &HttpAdapter, request: &FailedRequest, error: &ApiError);
}

/// The request side of a failed exchange, as seen by the hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRequest {
    pub method: Method,
    pub path: String,
    /// Whether the bearer credential was attached when the request left.
    pub carried_credential: bool,
}

impl FailedRequest {
    /// Whether the request path ends with `segments`, ignoring any base path.
    pub fn targets(&self, segments: &[&str]) -> bool {
        let mut own = self.path.trim_end_matches('/').rsplit('/');
        segments.iter().rev().all(|segment| own.next() == Some(*segment))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HookError {
    #[error("a response hook is already registered (registration {active})")]
    AlreadyRegistered { active: u64 },
}

struct RegisteredHook {
    id: u64,
    hook: Arc<dyn ResponseHook>,
}

pub struct HttpAdapter {
    http: Client,
    base_url: Url,
    default_headers: RwLock<HeaderMap>,
    response_hook: Mutex<Option<RegisteredHook>>,
    next_hook_id: AtomicU64,
}

/// Live hook registration. Dropping it deregisters the hook.
#[must_use = "dropping the registration removes the hook immediately"]
pub struct HookRegistration {
    adapter: Weak<HttpAdapter>,
    id: u64,
}

impl HookRegistration {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for HookRegistration {
    fn drop(&mut self) {
        if let Some(adapter) = self.adapter.upgrade() {
            adapter.deregister_response_hook(self.id);
        }
    }
}

impl HttpAdapter {
    pub fn new(base_url: &str) -> Result<Arc<Self>, ApiError> {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: &str, http: Client) -> Result<Arc<Self>, ApiError> {
        let base_url = Url::parse(base_url)
            .map_err(|err| ApiError::Validation(format!("invalid api base url '{base_url}': {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Validation(format!(
                "api base url '{base_url}' cannot carry a path"
            )));
        }
        Ok(Arc::new(Self {
            http,
            base_url,
            default_headers: RwLock::new(HeaderMap::new()),
            response_hook: Mutex::new(None),
            next_hook_id: AtomicU64::new(1),
        }))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn attach_credential(&self, token: &str) -> Result<(), ApiError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            ApiError::Validation("credential contains characters not allowed in a header".into())
        })?;
        value.set_sensitive(true);
        self.default_headers.write().insert(AUTHORIZATION, value);
        Ok(())
    }

    pub(crate) fn detach_credential(&self) {
        self.default_headers.write().remove(AUTHORIZATION);
    }

    pub fn has_credential(&self) -> bool {
        self.default_headers.read().contains_key(AUTHORIZATION)
    }

    /// Installs `hook` as the only response hook. Fails while another
    /// registration is alive.
    pub fn register_response_hook(
        self: &Arc<Self>,
        hook: Arc<dyn ResponseHook>,
    ) -> Result<HookRegistration, HookError> {
        let mut slot = self.response_hook.lock();
        if let Some(active) = slot.as_ref() {
            return Err(HookError::AlreadyRegistered { active: active.id });
        }
        let id = self.next_hook_id.fetch_add(1, Ordering::Relaxed);
        *slot = Some(RegisteredHook { id, hook });
        debug!(hook_id = id, "transport: response hook registered");
        Ok(HookRegistration {
            adapter: Arc::downgrade(self),
            id,
        })
    }

    /// Removes the hook if `id` is still the active registration.
    pub fn deregister_response_hook(&self, id: u64) -> bool {
        let mut slot = self.response_hook.lock();
        if slot.as_ref().is_some_and(|active| active.id == id) {
            *slot = None;
            debug!(hook_id = id, "transport: response hook deregistered");
            true
        } else {
            false
        }
    }

    pub fn has_response_hook(&self) -> bool {
        self.response_hook.lock().is_some()
    }

    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ApiError::Validation(format!("api base url '{}' cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = self.endpoint(segments)?;
        let response = self.execute(self.http.get(url).query(query)).await?;
        decode(response).await
    }

    pub async fn send_json<B, T>(
        &self,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        let response = self.execute(self.http.request(method, url).json(body)).await?;
        decode(response).await
    }

    /// Sends a JSON write whose success body the caller does not need.
    pub async fn send_body<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(segments)?;
        self.execute(self.http.request(method, url).json(body)).await?;
        Ok(())
    }

    pub async fn delete(&self, segments: &[&str]) -> Result<(), ApiError> {
        let url = self.endpoint(segments)?;
        self.execute(self.http.delete(url)).await?;
        Ok(())
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let headers = self.default_headers.read().clone();
        let carried_credential = headers.contains_key(AUTHORIZATION);
        let request = request.headers(headers).build()?;
        let failed = FailedRequest {
            method: request.method().clone(),
            path: request.url().path().to_string(),
            carried_credential,
        };
        let error = match self.http.execute(request).await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status();
                let body = response.bytes().await.unwrap_or_default();
                ApiError::from_status(status, &body)
            }
            Err(err) => {
                warn!("transport: request failed without a response: {err}");
                ApiError::Connectivity(err.to_string())
            }
        };

        let hook = self
            .response_hook
            .lock()
            .as_ref()
            .map(|registered| Arc::clone(&registered.hook));
        if let Some(hook) = hook {
            hook.on_error(self, &failed, &error).await;
        }
        Err(error)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|err| ApiError::InvalidResponse(err.to_string()))
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
