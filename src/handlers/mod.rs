//! HTTP surface. Handlers stay thin: deserialize and validate the payload,
//! call one service method, translate the result. All business rules live in
//! the service layer.

pub mod approvals;
pub mod common;
pub mod costing_entries;
pub mod health;
pub mod job_codes;
pub mod sync;

use axum::{routing::get, Router};
use utoipa::OpenApi;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        job_codes::create_job_code,
        job_codes::list_job_codes,
        job_codes::get_job_code,
        job_codes::update_job_code,
        job_codes::generate_code,
        job_codes::validate_code,
        job_codes::refresh_job_code,
        job_codes::rebuild_links,
        job_codes::rekey_job_code,
        costing_entries::create_costing_entry,
        costing_entries::get_costing_entry,
        costing_entries::list_entries_for_job,
        costing_entries::update_costing_entry,
        costing_entries::delete_costing_entry,
        costing_entries::submit_costing_entry,
        approvals::list_approval_queue,
        approvals::approve_entry,
        approvals::reject_entry,
        sync::sync_entries,
    ),
    tags(
        (name = "job-codes", description = "Job code registry and records"),
        (name = "costing-entries", description = "Costing entry lifecycle"),
        (name = "approvals", description = "Approval queue and decisions"),
        (name = "sync", description = "External costing feed ingestion"),
        (name = "health", description = "Liveness"),
    )
)]
pub struct ApiDoc;

/// Builds the full application router.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/openapi.json",
            get(|| async { axum::Json(ApiDoc::openapi()) }),
        )
        .nest("/api/v1/job-codes", job_codes::job_code_routes())
        .nest(
            "/api/v1/costing-entries",
            costing_entries::costing_entry_routes(),
        )
        .nest("/api/v1/approvals", approvals::approval_routes())
        .nest("/api/v1/sync", sync::sync_routes())
        .with_state(state)
}
