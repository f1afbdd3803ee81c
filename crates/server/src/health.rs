//! Health and readiness surface.
//!
//! `/health` reports engine reachability, process stats and startup
//! configuration validity; `/health/ready` gates on the engine being
//! reachable; `/health/live` is unconditional; `/health/connections`
//! (admin) exposes pool statistics.

use crate::api::handlers::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

async fn engine_reachable(state: &AppState) -> bool {
    let settings = &state.settings;
    match state
        .pool
        .acquire(
            &settings.vectordb_uri,
            &settings.vectordb_username,
            &settings.vectordb_password,
            "default",
        )
        .await
    {
        Ok(client) => client.ping().await.is_ok(),
        Err(_) => false,
    }
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let connected = engine_reachable(&state).await;
    let config_valid = state.startup_errors.is_empty();
    let healthy = connected && config_valid;

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let pool_stats = state.pool.stats();

    (
        status_code,
        Json(json!({
            "status": if healthy { "ok" } else { "degraded" },
            "milvus": {
                "connected": connected,
                "uri": state.settings.vectordb_uri,
            },
            "system": {
                "version": env!("CARGO_PKG_VERSION"),
                "uptime_seconds": state.start_time.elapsed().as_secs(),
                "pool_entries": pool_stats.active + pool_stats.idle,
                "tenant_buckets": state.limiters.tenant.bucket_count(),
            },
            "configuration": {
                "valid": config_valid,
                "errors": state.startup_errors.as_slice(),
            },
        })),
    )
}

/// `GET /health/ready` — 200 iff the engine is reachable.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    if engine_reachable(&state).await {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not ready" })),
        )
    }
}

/// `GET /health/live`
pub async fn live() -> Json<Value> {
    Json(json!({ "status": "alive" }))
}

/// `GET /health/connections` (admin)
pub async fn connections(State(state): State<AppState>) -> Json<Value> {
    let stats = state.pool.stats();
    Json(json!({
        "active": stats.active,
        "idle": stats.idle,
        "max_entries": stats.max_entries,
        "by_key": stats.entries,
    }))
}
