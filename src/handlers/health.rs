use axum::extract::State;
use axum::response::IntoResponse;
use serde_json::json;

use super::common::success_response;
use crate::handlers::AppState;

/// Liveness plus a store reachability probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up")),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store = match state
        .store
        .get(crate::store::collections::JOB_CODES, "health-probe")
        .await
    {
        Ok(_) => "ok",
        Err(_) => "unreachable",
    };
    success_response(json!({ "status": "ok", "store": store }))
}
