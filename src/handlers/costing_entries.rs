use axum::{
    extract::{Json, Path, State},
    routing::{delete, get, post, put},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::common::{
    created_response, map_service_error, no_content_response, success_response, validate_input,
};
use crate::errors::ApiError;
use crate::handlers::AppState;
use crate::models::{
    money, ApprovalStatus, CostCategory, CostType, CostingEntry, EntrySource,
};
use crate::services::costing::{CostingEntryPatch, NewCostingEntry};

// Request and response DTOs

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateCostingEntryRequest {
    #[validate(length(min = 1))]
    pub job_code: String,
    pub cost_type: CostType,
    pub category: CostCategory,
    pub description: Option<String>,
    pub amount: Decimal,
    pub amount_paid: Option<Decimal>,
    pub unit_rate: Option<Decimal>,
    pub assigned_approver_id: Option<String>,
    #[validate(length(max = 1000))]
    pub remarks: Option<String>,
    #[validate(length(min = 1))]
    pub created_by: String,
    /// Submit straight into the approval queue instead of landing as draft.
    #[serde(default)]
    pub submit_immediately: bool,
    /// Links a fresh attempt back to a rejected entry.
    pub resubmission_of: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateCostingEntryRequest {
    pub category: Option<CostCategory>,
    pub description: Option<String>,
    pub amount: Option<Decimal>,
    pub amount_paid: Option<Decimal>,
    pub unit_rate: Option<Decimal>,
    pub assigned_approver_id: Option<String>,
    #[validate(length(max = 1000))]
    pub remarks: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct SubmitCostingEntryRequest {
    pub approver_id: Option<String>,
}

/// Costing entry as served over the API: minor units rendered as decimal
/// currency values.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CostingEntryResponse {
    pub id: Uuid,
    pub job_code: String,
    pub cost_type: CostType,
    pub category: CostCategory,
    pub description: Option<String>,
    pub amount: Decimal,
    pub amount_paid: Decimal,
    pub balance_payable: Decimal,
    pub unit_rate: Option<Decimal>,
    pub approval_status: ApprovalStatus,
    pub assigned_approver_id: Option<String>,
    pub remarks: Option<String>,
    pub rejection_reason: Option<String>,
    pub decided_by: Option<String>,
    pub created_by: String,
    pub source: EntrySource,
    pub source_origin: Option<String>,
    pub external_ref: Option<String>,
    pub resubmission_of: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
    pub submitted_at: Option<String>,
    pub approved_at: Option<String>,
    pub rejected_at: Option<String>,
}

impl From<CostingEntry> for CostingEntryResponse {
    fn from(entry: CostingEntry) -> Self {
        Self {
            id: entry.id,
            job_code: entry.job_code,
            cost_type: entry.cost_type,
            category: entry.category,
            description: entry.description,
            amount: money::from_minor_units(entry.amount),
            amount_paid: money::from_minor_units(entry.amount_paid),
            balance_payable: money::from_minor_units(entry.balance_payable),
            unit_rate: entry.unit_rate.map(money::from_minor_units),
            approval_status: entry.approval_status,
            assigned_approver_id: entry.assigned_approver_id,
            remarks: entry.remarks,
            rejection_reason: entry.rejection_reason,
            decided_by: entry.decided_by,
            created_by: entry.created_by,
            source: entry.source,
            source_origin: entry.source_origin,
            external_ref: entry.external_ref,
            resubmission_of: entry.resubmission_of,
            created_at: entry.created_at.to_rfc3339(),
            updated_at: entry.updated_at.to_rfc3339(),
            submitted_at: entry.submitted_at.map(|at| at.to_rfc3339()),
            approved_at: entry.approved_at.map(|at| at.to_rfc3339()),
            rejected_at: entry.rejected_at.map(|at| at.to_rfc3339()),
        }
    }
}

// Handler functions

/// Create a costing entry, optionally submitting it for approval in the
/// same call
#[utoipa::path(
    post,
    path = "/api/v1/costing-entries",
    request_body = CreateCostingEntryRequest,
    responses(
        (status = 201, description = "Costing entry created", body = CostingEntryResponse),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Job code not found", body = crate::errors::ErrorResponse)
    ),
    tag = "costing-entries"
)]
pub async fn create_costing_entry(
    State(state): State<AppState>,
    Json(payload): Json<CreateCostingEntryRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;
    let entry = state
        .services
        .costing
        .create(
            NewCostingEntry {
                job_code: payload.job_code,
                cost_type: payload.cost_type,
                category: payload.category,
                description: payload.description,
                amount: payload.amount,
                amount_paid: payload.amount_paid.unwrap_or_default(),
                unit_rate: payload.unit_rate,
                assigned_approver_id: payload.assigned_approver_id,
                remarks: payload.remarks,
                created_by: payload.created_by,
                source: EntrySource::Manual,
                source_origin: None,
                external_ref: None,
                resubmission_of: payload.resubmission_of,
            },
            payload.submit_immediately,
        )
        .await
        .map_err(map_service_error)?;

    info!(entry_id = %entry.id, job_code = %entry.job_code, "costing entry created");
    Ok(created_response(CostingEntryResponse::from(entry)))
}

/// Get a costing entry by ID
#[utoipa::path(
    get,
    path = "/api/v1/costing-entries/{id}",
    params(("id" = Uuid, Path, description = "Costing entry ID")),
    responses(
        (status = 200, description = "Costing entry fetched", body = CostingEntryResponse),
        (status = 404, description = "Costing entry not found", body = crate::errors::ErrorResponse)
    ),
    tag = "costing-entries"
)]
pub async fn get_costing_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let entry = state
        .services
        .costing
        .get(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(CostingEntryResponse::from(entry)))
}

/// List costing entries for a job code
#[utoipa::path(
    get,
    path = "/api/v1/costing-entries/job/{code}",
    params(("code" = String, Path, description = "Job code")),
    responses(
        (status = 200, description = "Costing entries listed", body = [CostingEntryResponse])
    ),
    tag = "costing-entries"
)]
pub async fn list_entries_for_job(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let entries = state
        .services
        .costing
        .list_for_job(&code)
        .await
        .map_err(map_service_error)?;
    let body: Vec<CostingEntryResponse> =
        entries.into_iter().map(CostingEntryResponse::from).collect();
    Ok(success_response(body))
}

/// Update a draft or pending costing entry
#[utoipa::path(
    put,
    path = "/api/v1/costing-entries/{id}",
    request_body = UpdateCostingEntryRequest,
    params(("id" = Uuid, Path, description = "Costing entry ID")),
    responses(
        (status = 200, description = "Costing entry updated", body = CostingEntryResponse),
        (status = 404, description = "Costing entry not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Entry already decided", body = crate::errors::ErrorResponse)
    ),
    tag = "costing-entries"
)]
pub async fn update_costing_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCostingEntryRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;
    let entry = state
        .services
        .costing
        .update(
            id,
            CostingEntryPatch {
                category: payload.category,
                description: payload.description,
                amount: payload.amount,
                amount_paid: payload.amount_paid,
                unit_rate: payload.unit_rate,
                assigned_approver_id: payload.assigned_approver_id,
                remarks: payload.remarks,
                ..Default::default()
            },
        )
        .await
        .map_err(map_service_error)?;
    Ok(success_response(CostingEntryResponse::from(entry)))
}

/// Delete a draft costing entry
#[utoipa::path(
    delete,
    path = "/api/v1/costing-entries/{id}",
    params(("id" = Uuid, Path, description = "Costing entry ID")),
    responses(
        (status = 204, description = "Costing entry deleted"),
        (status = 404, description = "Costing entry not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Only draft entries can be deleted", body = crate::errors::ErrorResponse)
    ),
    tag = "costing-entries"
)]
pub async fn delete_costing_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    state
        .services
        .costing
        .delete(id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

/// Submit a draft entry into the approval queue
#[utoipa::path(
    post,
    path = "/api/v1/costing-entries/{id}/submit",
    request_body = SubmitCostingEntryRequest,
    params(("id" = Uuid, Path, description = "Costing entry ID")),
    responses(
        (status = 200, description = "Costing entry submitted", body = CostingEntryResponse),
        (status = 404, description = "Costing entry not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Entry already decided", body = crate::errors::ErrorResponse)
    ),
    tag = "costing-entries"
)]
pub async fn submit_costing_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitCostingEntryRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let entry = state
        .services
        .costing
        .submit_for_approval(id, payload.approver_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(CostingEntryResponse::from(entry)))
}

/// Creates the router for costing entry endpoints
pub fn costing_entry_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_costing_entry))
        .route("/job/:code", get(list_entries_for_job))
        .route("/:id", get(get_costing_entry))
        .route("/:id", put(update_costing_entry))
        .route("/:id", delete(delete_costing_entry))
        .route("/:id/submit", post(submit_costing_entry))
}
