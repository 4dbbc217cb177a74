//! In-process stand-in for the inventory API, plus a harness wiring a full
//! client against it.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use axum::{
    extract::{Path, Query, Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use shared::{
    domain::{Item, ItemDraft, ItemId},
    protocol::{Credentials, QuantityRequest},
};
use tokio::net::TcpListener;

use crate::{
    AlwaysConfirm, Confirmation, InMemoryNavigator, InventoryClient, MemoryStore,
    NotificationReceiver, NotificationSink, Route,
};

pub(crate) const PASSWORD: &str = "secret";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
}

#[derive(Default)]
struct ApiState {
    items: Vec<Item>,
    next_id: u64,
    usernames: HashSet<String>,
    requests: Vec<RecordedRequest>,
    scripted: HashMap<(String, String), (StatusCode, Value)>,
}

#[derive(Clone, Default)]
pub(crate) struct MockApi {
    state: Arc<Mutex<ApiState>>,
}

pub(crate) fn item(id: &str, name: &str, category: &str, price: f64, quantity: u32) -> Item {
    Item {
        id: ItemId::from(id),
        name: name.to_string(),
        category: category.to_string(),
        price,
        quantity,
        created_at: None,
        updated_at: None,
    }
}

/// Mixed stock: two available, one sold out, two in "Festival".
pub(crate) fn catalogue() -> Vec<Item> {
    vec![
        item("x", "Kaju Katli", "Festival", 450.0, 5),
        item("y", "Gulab Jamun", "Syrup", 120.5, 0),
        item("z", "Motichoor Ladoo", "Festival", 300.0, 12),
        item("w", "Rasgulla", "Syrup", 90.0, 0),
    ]
}

impl MockApi {
    pub fn with_items(items: Vec<Item>) -> Self {
        let api = Self::default();
        {
            let mut state = api.state.lock();
            state.next_id = items.len() as u64 + 1;
            state.items = items;
        }
        api
    }

    /// Answers the next `method path` request with `status` and `body`
    /// instead of the regular handler.
    pub fn respond_once(&self, method: &str, path: &str, status: u16, body: Value) {
        let status = StatusCode::from_u16(status).expect("valid status");
        self.state
            .lock()
            .scripted
            .insert((method.to_string(), path.to_string()), (status, body));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.path == path)
            .collect()
    }

    pub fn clear_requests(&self) {
        self.state.lock().requests.clear();
    }

    pub fn stock_of(&self, id: &str) -> Option<u32> {
        self.state
            .lock()
            .items
            .iter()
            .find(|item| item.id.as_str() == id)
            .map(|item| item.quantity)
    }

    /// Sets stock behind the client's back, simulating another shopper.
    pub fn set_stock(&self, id: &str, quantity: u32) {
        if let Some(item) = self
            .state
            .lock()
            .items
            .iter_mut()
            .find(|item| item.id.as_str() == id)
        {
            item.quantity = quantity;
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/auth/login", post(login))
            .route("/api/auth/register", post(register))
            .route("/api/sweets", get(list_all).post(create))
            .route("/api/sweets/available", get(list_available))
            .route("/api/sweets/search", get(search))
            .route("/api/sweets/:id", put(update).delete(remove))
            .route("/api/sweets/:id/purchase", post(purchase))
            .route("/api/sweets/:id/restock", post(restock))
            .layer(middleware::from_fn_with_state(self.clone(), record))
            .with_state(self.clone())
    }

    pub async fn spawn(&self) -> String {
        std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock api");
        let addr = listener.local_addr().expect("mock api address");
        let app = self.router();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }
}

async fn record(State(api): State<MockApi>, request: Request, next: Next) -> Response {
    let recorded = RecordedRequest {
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
        query: request.uri().query().map(str::to_string),
        authorization: request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    };
    let scripted = {
        let mut state = api.state.lock();
        let scripted = state
            .scripted
            .remove(&(recorded.method.clone(), recorded.path.clone()));
        state.requests.push(recorded);
        scripted
    };
    match scripted {
        Some((status, body)) => (status, Json(body)).into_response(),
        None => next.run(request).await,
    }
}

fn listing(items: Vec<Item>) -> Json<Value> {
    Json(json!({ "message": "Sweets retrieved successfully", "data": items }))
}

fn error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({ "error": message, "statusCode": status.canonical_reason() })),
    )
        .into_response()
}

async fn login(State(api): State<MockApi>, Json(credentials): Json<Credentials>) -> Response {
    if credentials.password != PASSWORD {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "Invalid username or password",
                "statusCode": "UNAUTHORIZED"
            })),
        )
            .into_response();
    }
    api.state.lock().usernames.insert(credentials.username.clone());
    let roles = if credentials.username == "admin" {
        json!(["ADMIN", "USER"])
    } else {
        json!(["USER"])
    };
    Json(json!({
        "message": "Login successful",
        "data": {
            "jwt": format!("token-{}", credentials.username),
            "userId": format!("user-{}", credentials.username),
            "roles": roles
        }
    }))
    .into_response()
}

async fn register(State(api): State<MockApi>, Json(credentials): Json<Credentials>) -> Response {
    if !api.state.lock().usernames.insert(credentials.username) {
        return error(StatusCode::BAD_REQUEST, "Username already exists");
    }
    Json(json!({ "message": "User registered successfully" })).into_response()
}

async fn list_all(State(api): State<MockApi>) -> Json<Value> {
    listing(api.state.lock().items.clone())
}

async fn list_available(State(api): State<MockApi>) -> Json<Value> {
    listing(
        api.state
            .lock()
            .items
            .iter()
            .filter(|item| item.quantity > 0)
            .cloned()
            .collect(),
    )
}

async fn search(
    State(api): State<MockApi>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let price = |key: &str| params.get(key).and_then(|raw| raw.parse::<f64>().ok());
    let (min, max) = (price("minPrice"), price("maxPrice"));
    let items = api
        .state
        .lock()
        .items
        .iter()
        .filter(|item| {
            params.get("name").map_or(true, |name| {
                item.name.to_lowercase().contains(&name.to_lowercase())
            })
        })
        .filter(|item| {
            params
                .get("category")
                .map_or(true, |category| item.category.eq_ignore_ascii_case(category))
        })
        .filter(|item| min.map_or(true, |min| item.price >= min))
        .filter(|item| max.map_or(true, |max| item.price <= max))
        .cloned()
        .collect();
    listing(items)
}

async fn create(State(api): State<MockApi>, Json(draft): Json<ItemDraft>) -> Response {
    let mut state = api.state.lock();
    let id = format!("item-{}", state.next_id);
    state.next_id += 1;
    let created = item(&id, &draft.name, &draft.category, draft.price, draft.quantity);
    state.items.push(created.clone());
    (StatusCode::CREATED, Json(created)).into_response()
}

async fn update(
    State(api): State<MockApi>,
    Path(id): Path<String>,
    Json(draft): Json<ItemDraft>,
) -> Response {
    let mut state = api.state.lock();
    let Some(existing) = state.items.iter_mut().find(|item| item.id.as_str() == id) else {
        return error(StatusCode::NOT_FOUND, "Sweet not found");
    };
    existing.name = draft.name;
    existing.category = draft.category;
    existing.price = draft.price;
    existing.quantity = draft.quantity;
    Json(existing.clone()).into_response()
}

async fn remove(State(api): State<MockApi>, Path(id): Path<String>) -> Response {
    let mut state = api.state.lock();
    let before = state.items.len();
    state.items.retain(|item| item.id.as_str() != id);
    if state.items.len() == before {
        return error(StatusCode::NOT_FOUND, "Sweet not found");
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn purchase(
    State(api): State<MockApi>,
    Path(id): Path<String>,
    Json(request): Json<QuantityRequest>,
) -> Response {
    let mut state = api.state.lock();
    let Some(existing) = state.items.iter_mut().find(|item| item.id.as_str() == id) else {
        return error(StatusCode::NOT_FOUND, "Sweet not found");
    };
    if request.quantity > existing.quantity {
        return error(StatusCode::CONFLICT, "Not enough stock");
    }
    existing.quantity -= request.quantity;
    Json(json!({ "message": "Purchase successful", "data": existing.clone() })).into_response()
}

async fn restock(
    State(api): State<MockApi>,
    Path(id): Path<String>,
    Json(request): Json<QuantityRequest>,
) -> Response {
    let mut state = api.state.lock();
    let Some(existing) = state.items.iter_mut().find(|item| item.id.as_str() == id) else {
        return error(StatusCode::NOT_FOUND, "Sweet not found");
    };
    existing.quantity += request.quantity;
    Json(json!({ "message": "Restock successful", "data": existing.clone() })).into_response()
}

/// Confirmation stub that always answers `false` and remembers the prompt.
#[derive(Default)]
pub(crate) struct DeclineConfirm {
    pub prompts: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl Confirmation for DeclineConfirm {
    async fn confirm(&self, prompt: &str) -> bool {
        self.prompts.lock().push(prompt.to_string());
        false
    }
}

pub(crate) struct Harness {
    pub api: MockApi,
    pub client: InventoryClient,
    pub store: Arc<MemoryStore>,
    pub navigator: Arc<InMemoryNavigator>,
    pub notifications: NotificationReceiver,
}

impl Harness {
    pub async fn start(items: Vec<Item>) -> Self {
        Self::start_with(items, Arc::new(AlwaysConfirm)).await
    }

    pub async fn start_with(items: Vec<Item>, confirmation: Arc<dyn Confirmation>) -> Self {
        let api = MockApi::with_items(items);
        let base_url = api.spawn().await;
        let store = Arc::new(MemoryStore::default());
        let navigator = Arc::new(InMemoryNavigator::new(Route::Dashboard));
        let (sink, notifications) = NotificationSink::channel();
        let client = InventoryClient::new(
            &base_url,
            store.clone(),
            navigator.clone(),
            confirmation,
            sink,
        )
        .expect("client");
        Self {
            api,
            client,
            store,
            navigator,
            notifications,
        }
    }

    pub async fn login_as(&self, username: &str) {
        let outcome = self.client.session.login(username, PASSWORD).await;
        assert!(outcome.success, "login failed: {}", outcome.message);
    }

    /// Every notification published so far, as plain messages.
    pub fn drain_messages(&mut self) -> Vec<String> {
        let mut messages = Vec::new();
        while let Ok(notification) = self.notifications.try_recv() {
            messages.push(notification.message);
        }
        messages
    }
}
