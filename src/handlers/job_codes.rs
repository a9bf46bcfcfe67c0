use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, post, put},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::common::{created_response, map_service_error, success_response, validate_input};
use crate::errors::ApiError;
use crate::handlers::AppState;
use crate::models::{money, CodeSource, CostBucket, CostingSummary, JobCode, JobNature, JobStatus, LinkedDocRef};
use crate::services::job_codes::{JobCodeListFilter, JobCodePatch, NewJobCode};

// Request and response DTOs

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateJobCodeRequest {
    #[validate(length(min = 1))]
    pub company_prefix: String,
    pub job_nature: JobNature,
    /// Explicit code for CRM imports; omit to let the registry mint one.
    pub code: Option<String>,
    #[validate(length(min = 1))]
    pub title: String,
    pub description: Option<String>,
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    #[validate(length(min = 3, max = 3))]
    pub currency: Option<String>,
    pub quoted_value: Option<Decimal>,
    pub source: Option<CodeSource>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateJobCodeRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    pub status: Option<JobStatus>,
    #[validate(length(min = 3, max = 3))]
    pub currency: Option<String>,
    pub quoted_value: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct GenerateCodeRequest {
    #[validate(length(min = 1))]
    pub company_prefix: String,
    pub job_nature: JobNature,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct ValidateCodeRequest {
    #[validate(length(min = 1))]
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct RekeyJobCodeRequest {
    #[validate(length(min = 1))]
    pub new_code: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListJobCodesParams {
    pub company_prefix: Option<String>,
    pub status: Option<JobStatus>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CostBucketResponse {
    pub total: Decimal,
    pub by_category: BTreeMap<String, Decimal>,
}

impl From<&CostBucket> for CostBucketResponse {
    fn from(bucket: &CostBucket) -> Self {
        Self {
            total: money::from_minor_units(bucket.total),
            by_category: bucket
                .by_category
                .iter()
                .map(|(category, cents)| (category.to_string(), money::from_minor_units(*cents)))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CostingSummaryResponse {
    pub pre_cost: CostBucketResponse,
    pub post_cost: CostBucketResponse,
    pub total_paid: Decimal,
    pub total_payable: Decimal,
    pub pending_approval_count: i64,
    pub pending_approval_amount: Decimal,
}

impl From<&CostingSummary> for CostingSummaryResponse {
    fn from(summary: &CostingSummary) -> Self {
        Self {
            pre_cost: CostBucketResponse::from(&summary.pre_cost),
            post_cost: CostBucketResponse::from(&summary.post_cost),
            total_paid: money::from_minor_units(summary.total_paid),
            total_payable: money::from_minor_units(summary.total_payable),
            pending_approval_count: summary.pending_approval_count,
            pending_approval_amount: money::from_minor_units(summary.pending_approval_amount),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LinkedDocResponse {
    pub id: String,
    pub number: String,
    pub counterparty: Option<String>,
    pub amount: Decimal,
}

impl From<&LinkedDocRef> for LinkedDocResponse {
    fn from(link: &LinkedDocRef) -> Self {
        Self {
            id: link.id.clone(),
            number: link.number.clone(),
            counterparty: link.counterparty.clone(),
            amount: money::from_minor_units(link.amount),
        }
    }
}

/// Job code as served over the API: monetary minor units rendered as
/// decimal currency values.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobCodeResponse {
    pub code: String,
    pub company_prefix: String,
    pub job_nature: JobNature,
    pub running_number: u32,
    pub title: String,
    pub description: Option<String>,
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    pub status: JobStatus,
    pub currency: String,
    pub quoted_value: Decimal,
    pub costing_summary: CostingSummaryResponse,
    pub linked_pos: Vec<LinkedDocResponse>,
    pub linked_pis: Vec<LinkedDocResponse>,
    pub total_po_value: Decimal,
    pub total_pi_value: Decimal,
    pub gross_margin: Decimal,
    pub gross_margin_percentage: f64,
    pub source: CodeSource,
    pub created_at: String,
    pub updated_at: String,
}

impl From<JobCode> for JobCodeResponse {
    fn from(job: JobCode) -> Self {
        Self {
            costing_summary: CostingSummaryResponse::from(&job.costing_summary),
            linked_pos: job.linked_pos.iter().map(LinkedDocResponse::from).collect(),
            linked_pis: job.linked_pis.iter().map(LinkedDocResponse::from).collect(),
            code: job.code,
            company_prefix: job.company_prefix,
            job_nature: job.job_nature,
            running_number: job.running_number,
            title: job.title,
            description: job.description,
            client_id: job.client_id,
            client_name: job.client_name,
            status: job.status,
            currency: job.currency,
            quoted_value: money::from_minor_units(job.quoted_value),
            total_po_value: money::from_minor_units(job.total_po_value),
            total_pi_value: money::from_minor_units(job.total_pi_value),
            gross_margin: money::from_minor_units(job.gross_margin),
            gross_margin_percentage: job.gross_margin_percentage,
            source: job.source,
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}

// Handler functions

/// Create a job code, minting the next running number unless an explicit
/// code is supplied (CRM imports).
#[utoipa::path(
    post,
    path = "/api/v1/job-codes",
    request_body = CreateJobCodeRequest,
    responses(
        (status = 201, description = "Job code created", body = JobCodeResponse),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 409, description = "Code already exists", body = crate::errors::ErrorResponse),
        (status = 503, description = "Code registry unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "job-codes"
)]
pub async fn create_job_code(
    State(state): State<AppState>,
    Json(payload): Json<CreateJobCodeRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let job = state
        .services
        .job_codes
        .create(NewJobCode {
            company_prefix: payload.company_prefix,
            job_nature: payload.job_nature,
            code: payload.code,
            title: payload.title,
            description: payload.description,
            client_id: payload.client_id,
            client_name: payload.client_name,
            currency: payload.currency.unwrap_or_else(|| "USD".to_string()),
            quoted_value: payload.quoted_value.unwrap_or_default(),
            source: payload.source.unwrap_or(CodeSource::Manual),
        })
        .await
        .map_err(map_service_error)?;

    info!(code = %job.code, "job code created");
    Ok(created_response(JobCodeResponse::from(job)))
}

/// List job codes, optionally scoped by company prefix and status
#[utoipa::path(
    get,
    path = "/api/v1/job-codes",
    params(ListJobCodesParams),
    responses(
        (status = 200, description = "Job codes listed", body = [JobCodeResponse])
    ),
    tag = "job-codes"
)]
pub async fn list_job_codes(
    State(state): State<AppState>,
    Query(params): Query<ListJobCodesParams>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let jobs = state
        .services
        .job_codes
        .list(JobCodeListFilter {
            company_prefix: params.company_prefix,
            status: params.status,
        })
        .await
        .map_err(map_service_error)?;
    let body: Vec<JobCodeResponse> = jobs.into_iter().map(JobCodeResponse::from).collect();
    Ok(success_response(body))
}

/// Get a job code by its code string
#[utoipa::path(
    get,
    path = "/api/v1/job-codes/{code}",
    params(("code" = String, Path, description = "Job code")),
    responses(
        (status = 200, description = "Job code fetched", body = JobCodeResponse),
        (status = 404, description = "Job code not found", body = crate::errors::ErrorResponse)
    ),
    tag = "job-codes"
)]
pub async fn get_job_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let job = state
        .services
        .job_codes
        .get(&code)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(JobCodeResponse::from(job)))
}

/// Edit a job code's descriptive fields
#[utoipa::path(
    put,
    path = "/api/v1/job-codes/{code}",
    request_body = UpdateJobCodeRequest,
    params(("code" = String, Path, description = "Job code")),
    responses(
        (status = 200, description = "Job code updated", body = JobCodeResponse),
        (status = 404, description = "Job code not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Job code is CRM-sourced", body = crate::errors::ErrorResponse)
    ),
    tag = "job-codes"
)]
pub async fn update_job_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(payload): Json<UpdateJobCodeRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;
    let job = state
        .services
        .job_codes
        .edit(
            &code,
            JobCodePatch {
                title: payload.title,
                description: payload.description,
                client_id: payload.client_id,
                client_name: payload.client_name,
                status: payload.status,
                currency: payload.currency,
                quoted_value: payload.quoted_value,
            },
        )
        .await
        .map_err(map_service_error)?;
    Ok(success_response(JobCodeResponse::from(job)))
}

/// Mint the next code for a (prefix, nature) pair without creating a record
#[utoipa::path(
    post,
    path = "/api/v1/job-codes/generate",
    request_body = GenerateCodeRequest,
    responses(
        (status = 200, description = "Code generated"),
        (status = 400, description = "Unknown company prefix", body = crate::errors::ErrorResponse),
        (status = 503, description = "Code registry unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "job-codes"
)]
pub async fn generate_code(
    State(state): State<AppState>,
    Json(payload): Json<GenerateCodeRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;
    let code = state
        .services
        .registry
        .generate(&payload.company_prefix, payload.job_nature)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(serde_json::json!({ "code": code })))
}

/// Structurally validate a code against the grammar and company directory
#[utoipa::path(
    post,
    path = "/api/v1/job-codes/validate",
    request_body = ValidateCodeRequest,
    responses((status = 200, description = "Validation result")),
    tag = "job-codes"
)]
pub async fn validate_code(
    State(state): State<AppState>,
    Json(payload): Json<ValidateCodeRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;
    let violations = state
        .services
        .registry
        .validate(&payload.code)
        .await
        .map_err(map_service_error)?;
    let messages: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
    Ok(success_response(serde_json::json!({
        "valid": messages.is_empty(),
        "violations": messages,
    })))
}

/// Recompute the derived financials for a job code
#[utoipa::path(
    post,
    path = "/api/v1/job-codes/{code}/refresh",
    params(("code" = String, Path, description = "Job code")),
    responses(
        (status = 200, description = "Financials recomputed", body = JobCodeResponse),
        (status = 404, description = "Job code not found", body = crate::errors::ErrorResponse)
    ),
    tag = "job-codes"
)]
pub async fn refresh_job_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let job = state
        .services
        .rollup
        .recompute(&code)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(JobCodeResponse::from(job)))
}

/// Rebuild the PO/invoice link caches from the source-of-truth references
#[utoipa::path(
    post,
    path = "/api/v1/job-codes/{code}/rebuild-links",
    params(("code" = String, Path, description = "Job code")),
    responses(
        (status = 200, description = "Links rebuilt", body = JobCodeResponse),
        (status = 404, description = "Job code not found", body = crate::errors::ErrorResponse)
    ),
    tag = "job-codes"
)]
pub async fn rebuild_links(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let job = state
        .services
        .crossref
        .rebuild_links(&code)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(JobCodeResponse::from(job)))
}

/// Move a job code to a new code, repointing every referencing document
#[utoipa::path(
    post,
    path = "/api/v1/job-codes/{code}/rekey",
    request_body = RekeyJobCodeRequest,
    params(("code" = String, Path, description = "Current job code")),
    responses(
        (status = 200, description = "Job code re-keyed", body = JobCodeResponse),
        (status = 404, description = "Job code not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Target code exists or source is CRM-sourced", body = crate::errors::ErrorResponse),
        (status = 500, description = "Partial re-key, safe to re-run", body = crate::errors::ErrorResponse)
    ),
    tag = "job-codes"
)]
pub async fn rekey_job_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(payload): Json<RekeyJobCodeRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;
    let job = state
        .services
        .crossref
        .rekey(&code, &payload.new_code)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(JobCodeResponse::from(job)))
}

/// Creates the router for job code endpoints
pub fn job_code_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_job_code))
        .route("/", get(list_job_codes))
        .route("/generate", post(generate_code))
        .route("/validate", post(validate_code))
        .route("/:code", get(get_job_code))
        .route("/:code", put(update_job_code))
        .route("/:code/refresh", post(refresh_job_code))
        .route("/:code/rebuild-links", post(rebuild_links))
        .route("/:code/rekey", post(rekey_job_code))
}
