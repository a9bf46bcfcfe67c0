use axum::{
    extract::{Json, State},
    routing::post,
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;

use super::common::{map_service_error, success_response, validate_input};
use crate::errors::ApiError;
use crate::handlers::AppState;
use crate::services::external_sync::ExternalCostingRecord;

/// One costing record from the external workspace feed. `cost_type` and
/// `category` stay strings here so unknown values surface as per-record
/// errors instead of failing the whole batch at deserialization.
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct SyncEntryRequest {
    #[validate(length(min = 1))]
    pub external_id: String,
    #[validate(length(min = 1))]
    pub origin: String,
    #[validate(length(min = 1))]
    pub job_code: String,
    pub cost_type: String,
    pub category: String,
    pub description: Option<String>,
    pub amount: Decimal,
    pub amount_paid: Option<Decimal>,
    pub unit_rate: Option<Decimal>,
    #[serde(default)]
    pub submit: bool,
    pub approver_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct SyncBatchRequest {
    #[validate(length(min = 1))]
    pub records: Vec<SyncEntryRequest>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncReportResponse {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Ingest a batch of external costing records, upserting by external ID
#[utoipa::path(
    post,
    path = "/api/v1/sync/entries",
    request_body = SyncBatchRequest,
    responses(
        (status = 200, description = "Batch processed", body = SyncReportResponse),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse)
    ),
    tag = "sync"
)]
pub async fn sync_entries(
    State(state): State<AppState>,
    Json(payload): Json<SyncBatchRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;
    let records: Vec<ExternalCostingRecord> = payload
        .records
        .into_iter()
        .map(|record| ExternalCostingRecord {
            external_id: record.external_id,
            origin: record.origin,
            job_code: record.job_code,
            cost_type: record.cost_type,
            category: record.category,
            description: record.description,
            amount: record.amount,
            amount_paid: record.amount_paid,
            unit_rate: record.unit_rate,
            submit: record.submit,
            approver_id: record.approver_id,
        })
        .collect();

    let report = state
        .services
        .external_sync
        .sync_batch(records)
        .await
        .map_err(map_service_error)?;
    info!(
        created = report.created,
        updated = report.updated,
        skipped = report.skipped,
        errors = report.errors.len(),
        "external sync batch processed"
    );
    Ok(success_response(SyncReportResponse {
        created: report.created,
        updated: report.updated,
        skipped: report.skipped,
        errors: report.errors,
    }))
}

/// Creates the router for external sync endpoints
pub fn sync_routes() -> Router<AppState> {
    Router::new().route("/entries", post(sync_entries))
}
