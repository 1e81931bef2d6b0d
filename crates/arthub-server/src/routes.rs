//! Health routes.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;

/// Create the health routes router.
pub fn health_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let cache = &state.cache;
    let reachable = cache.ping().await;
    let stats = cache.stats();

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "cache": {
            "backend": cache.backend_name(),
            "status": cache.status(),
            "reachable": reachable,
            "hits": stats.hits,
            "misses": stats.misses,
            "errors": stats.errors,
            "hit_rate": stats.hit_rate(),
        }
    }))
}

async fn liveness() -> impl IntoResponse {
    Json(json!({ "status": "alive" }))
}

async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if state.cache.ping().await {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable", "cache": state.cache.status() })),
        )
    }
}
