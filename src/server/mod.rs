//! The `farmsync-server` record store.
//!
//! Serves per-user record trees over a WebSocket speaking the
//! [`protocol`](crate::protocol) frames, persisted in SQLite.
//!
//! # Endpoints
//!
//! - `GET /health`: Health check endpoint (no auth required)
//! - `GET /me`: Returns the user the API key belongs to (auth required)
//! - `GET /store`: WebSocket upgrade for the record store (auth required)

mod auth;
mod hub;
mod session;
mod storage;

pub use auth::{auth_middleware, ApiKeyEntry, ApiKeyStore, AuthUser};
pub use hub::{ChangeHub, Changed};
pub use storage::{init_db, RecordRepository, StorageError};

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    middleware,
    response::Response,
    routing::get,
    Extension, Json, Router,
};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub repo: RecordRepository,
    pub hub: Arc<ChangeHub>,
    pub api_keys: Arc<ApiKeyStore>,
}

impl AppState {
    pub fn new(pool: SqlitePool, api_keys: ApiKeyStore) -> Self {
        Self {
            repo: RecordRepository::new(pool),
            hub: Arc::new(ChangeHub::new()),
            api_keys: Arc::new(api_keys),
        }
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Current user response
#[derive(Serialize)]
struct MeResponse {
    user_id: String,
}

async fn me(Extension(user): Extension<AuthUser>) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: user.user_id,
    })
}

async fn store_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Response {
    ws.on_upgrade(move |socket| session::run_session(socket, state, user))
}

/// Builds the router with all routes and layers.
pub fn router(state: AppState) -> Router {
    // Public routes (no auth)
    let public_routes = Router::new().route("/health", get(health));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/me", get(me))
        .route("/store", get(store_socket))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serves the router on an already bound listener until the process ends.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}
