use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::common::{map_service_error, success_response, validate_input};
use super::costing_entries::CostingEntryResponse;
use crate::errors::ApiError;
use crate::handlers::AppState;
use crate::services::approvals::QueueScope;

#[derive(Debug, Deserialize, IntoParams)]
pub struct QueueParams {
    /// Restrict the queue to one company's job codes.
    pub company_prefix: Option<String>,
    /// Restrict the queue to entries assigned to this approver or unassigned.
    pub approver_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApprovalQueueItemResponse {
    pub entry: CostingEntryResponse,
    pub days_waiting: i64,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct ApproveEntryRequest {
    #[validate(length(min = 1))]
    pub approver_id: String,
    #[validate(length(max = 1000))]
    pub remarks: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct RejectEntryRequest {
    #[validate(length(min = 1))]
    pub approver_id: String,
    #[validate(length(min = 1, max = 1000, message = "rejection reason is required"))]
    pub reason: String,
}

/// Pending entries awaiting a decision, oldest submission first
#[utoipa::path(
    get,
    path = "/api/v1/approvals",
    params(QueueParams),
    responses(
        (status = 200, description = "Approval queue listed", body = [ApprovalQueueItemResponse])
    ),
    tag = "approvals"
)]
pub async fn list_approval_queue(
    State(state): State<AppState>,
    Query(params): Query<QueueParams>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let items = state
        .services
        .approvals
        .list(QueueScope {
            company_prefix: params.company_prefix,
            approver_id: params.approver_id,
        })
        .await
        .map_err(map_service_error)?;
    let body: Vec<ApprovalQueueItemResponse> = items
        .into_iter()
        .map(|item| ApprovalQueueItemResponse {
            entry: CostingEntryResponse::from(item.entry),
            days_waiting: item.days_waiting,
        })
        .collect();
    Ok(success_response(body))
}

/// Approve a pending costing entry
#[utoipa::path(
    post,
    path = "/api/v1/approvals/{id}/approve",
    request_body = ApproveEntryRequest,
    params(("id" = Uuid, Path, description = "Costing entry ID")),
    responses(
        (status = 200, description = "Costing entry approved", body = CostingEntryResponse),
        (status = 404, description = "Costing entry not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Entry is not pending", body = crate::errors::ErrorResponse)
    ),
    tag = "approvals"
)]
pub async fn approve_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ApproveEntryRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;
    let entry = state
        .services
        .approvals
        .approve(id, &payload.approver_id, payload.remarks)
        .await
        .map_err(map_service_error)?;
    info!(entry_id = %id, "costing entry approved");
    Ok(success_response(CostingEntryResponse::from(entry)))
}

/// Reject a pending costing entry with a mandatory reason
#[utoipa::path(
    post,
    path = "/api/v1/approvals/{id}/reject",
    request_body = RejectEntryRequest,
    params(("id" = Uuid, Path, description = "Costing entry ID")),
    responses(
        (status = 200, description = "Costing entry rejected", body = CostingEntryResponse),
        (status = 400, description = "Missing rejection reason", body = crate::errors::ErrorResponse),
        (status = 404, description = "Costing entry not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Entry is not pending", body = crate::errors::ErrorResponse)
    ),
    tag = "approvals"
)]
pub async fn reject_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RejectEntryRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;
    let entry = state
        .services
        .approvals
        .reject(id, &payload.approver_id, &payload.reason)
        .await
        .map_err(map_service_error)?;
    info!(entry_id = %id, "costing entry rejected");
    Ok(success_response(CostingEntryResponse::from(entry)))
}

/// Creates the router for approval queue endpoints
pub fn approval_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_approval_queue))
        .route("/:id/approve", post(approve_entry))
        .route("/:id/reject", post(reject_entry))
}
