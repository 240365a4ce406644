use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health — liveness probe. Per the explicit non-goal excluding
/// a metrics pipeline, this stays structural (queue depth, active count)
/// rather than growing into a Prometheus endpoint.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let queue_len = state.storage.queue_length().await.unwrap_or(0);
    let stats = state.storage.stats().await.ok();

    Json(json!({
        "status": "healthy",
        "queue_length": queue_len,
        "total_tasks": stats.as_ref().map(|s| s.total).unwrap_or(0),
    }))
}
