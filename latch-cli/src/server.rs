use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use latch_core::config::ManagerConfig;
use latch_core::manager::LockManager;
use latch_core::types::{
    FailureMessage, LockRequestsMessage, LockResponsesMessage, UnlockRequestsMessage,
    UnlockedObjectsMessage,
};

use crate::handlers::*;

/// The manager synchronizes internally, so handlers share it directly.
pub type AppState = Arc<LockManager>;

pub struct ServeOptions {
    pub host: String,
    pub port: u16,
    pub default_auto_unlock: Duration,
    pub reap_interval: Duration,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // Health is always open (no auth)
        .route("/health", get(health))
        // Protected routes
        .route("/locks", post(request_locks).get(list_locks).delete(unlock_all))
        .route("/unlocks", post(unlock_objects))
        .route("/evict", post(evict_expired))
        .layer(middleware::from_fn(auth_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run(options: ServeOptions) -> anyhow::Result<()> {
    let config = ManagerConfig::default().with_default_auto_unlock(options.default_auto_unlock);
    let state: AppState = Arc::new(LockManager::with_config(config));

    tracing::info!(
        "⏱️  Default auto-unlock {}s, reaping every {}s",
        options.default_auto_unlock.as_secs(),
        options.reap_interval.as_secs()
    );
    let _reaper = state.spawn_reaper(options.reap_interval);

    let app = router(state);
    let addr = format!("{}:{}", options.host, options.port);

    if std::env::var("LATCH_API_KEY").is_ok() {
        tracing::info!("🔐 API key authentication enabled");
    } else {
        tracing::warn!("⚠️  No LATCH_API_KEY set, server is open (dev mode)");
    }

    tracing::info!("🔒 Latch server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

// ─── Auth Middleware ────────────────────────────────────────────────────────

async fn auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // If no API key is configured, allow all requests (dev mode)
    let expected_key = match std::env::var("LATCH_API_KEY") {
        Ok(key) if !key.is_empty() => key,
        _ => return Ok(next.run(request).await),
    };

    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    if token == expected_key {
        Ok(next.run(request).await)
    } else {
        tracing::warn!("🚫 Unauthorized request to {}", request.uri().path());
        Err(StatusCode::UNAUTHORIZED)
    }
}

// ─── Handlers ───────────────────────────────────────────────────────────────

async fn health(State(manager): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::ok(HealthResponse {
        status: "ok".to_string(),
        locked_objects: manager.locked_objects().len(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

async fn request_locks(
    State(manager): State<AppState>,
    Json(message): Json<LockRequestsMessage>,
) -> Result<Json<LockResponsesMessage>, (StatusCode, Json<FailureMessage>)> {
    let failure = |message: String| (StatusCode::BAD_REQUEST, Json(FailureMessage { message }));

    validate_lock_requests(&message).map_err(failure)?;

    let responses = manager
        .request_locks(&message.requests)
        .map_err(|e| failure(e.to_string()))?;

    let granted = responses.iter().filter(|r| r.is_granted).count();
    tracing::info!(trees = responses.len(), granted, "Lock requests processed");

    Ok(Json(LockResponsesMessage { responses }))
}

async fn list_locks(State(manager): State<AppState>) -> Json<ApiResponse<Vec<LockedObjectInfo>>> {
    let locks: Vec<LockedObjectInfo> = manager
        .locked_objects()
        .into_iter()
        .map(LockedObjectInfo::from)
        .collect();
    Json(ApiResponse::ok(locks))
}

async fn unlock_objects(
    State(manager): State<AppState>,
    Json(message): Json<UnlockRequestsMessage>,
) -> Result<Json<UnlockedObjectsMessage>, (StatusCode, Json<FailureMessage>)> {
    validate_unlock_requests(&message)
        .map_err(|message| (StatusCode::BAD_REQUEST, Json(FailureMessage { message })))?;

    let unlocked = manager.unlock_objects(&message.requests);
    tracing::info!(objects = ?unlocked, "Objects unlocked");
    Ok(Json(UnlockedObjectsMessage { unlocked }))
}

async fn unlock_all(State(manager): State<AppState>) -> Json<ApiResponse<UnlockedResponse>> {
    let unlocked = manager.unlock_all();
    tracing::info!(count = unlocked.len(), "All locks released");
    Json(ApiResponse::ok(UnlockedResponse { unlocked }))
}

async fn evict_expired(State(manager): State<AppState>) -> Json<ApiResponse<UnlockedResponse>> {
    let unlocked = manager.unlock_expired();
    tracing::info!(count = unlocked.len(), "Expired locks evicted");
    Json(ApiResponse::ok(UnlockedResponse { unlocked }))
}
