mod common;

use rust_decimal_macros::dec;

use common::test_app;
use jobcost_api::errors::ServiceError;
use jobcost_api::models::{ApprovalStatus, CostType, EntrySource, JobNature};
use jobcost_api::services::external_sync::{ExternalCostingRecord, SyncOutcome};

fn record(external_id: &str, job_code: &str) -> ExternalCostingRecord {
    ExternalCostingRecord {
        external_id: external_id.to_string(),
        origin: "workspace-a".to_string(),
        job_code: job_code.to_string(),
        cost_type: "pre".to_string(),
        category: "B".to_string(),
        description: Some("imported".to_string()),
        amount: dec!(10.00),
        amount_paid: None,
        unit_rate: None,
        submit: false,
        approver_id: None,
    }
}

#[tokio::test]
async fn first_sight_creates_a_tagged_entry() {
    let app = test_app();
    let job = app.create_job("FS", JobNature::Product).await;

    let outcome = app
        .services
        .external_sync
        .sync_record(record("ext-1", &job.code))
        .await
        .unwrap();
    let SyncOutcome::Created { entry_id } = outcome else {
        panic!("expected created, got {outcome:?}");
    };

    let entry = app.services.costing.get(entry_id).await.unwrap();
    assert_eq!(entry.source, EntrySource::External);
    assert_eq!(entry.source_origin.as_deref(), Some("workspace-a"));
    assert_eq!(entry.external_ref.as_deref(), Some("ext-1"));
    assert_eq!(entry.created_by, "sync:workspace-a");
    assert_eq!(entry.approval_status, ApprovalStatus::Draft);
}

#[tokio::test]
async fn amounts_convert_with_round_half_up() {
    let app = test_app();
    let job = app.create_job("FS", JobNature::Product).await;

    let mut rec = record("ext-rounding", &job.code);
    rec.amount = dec!(10.005);
    let SyncOutcome::Created { entry_id } = app
        .services
        .external_sync
        .sync_record(rec)
        .await
        .unwrap()
    else {
        panic!("expected created");
    };

    let entry = app.services.costing.get(entry_id).await.unwrap();
    assert_eq!(entry.amount, 1_001);
}

#[tokio::test]
async fn representing_the_same_id_updates_instead_of_duplicating() {
    let app = test_app();
    let job = app.create_job("FS", JobNature::Product).await;

    let SyncOutcome::Created { entry_id } = app
        .services
        .external_sync
        .sync_record(record("ext-2", &job.code))
        .await
        .unwrap()
    else {
        panic!("expected created");
    };

    let mut rec = record("ext-2", &job.code);
    rec.amount = dec!(42.00);
    let outcome = app.services.external_sync.sync_record(rec).await.unwrap();
    assert_eq!(outcome, SyncOutcome::Updated { entry_id });

    let entries = app.services.costing.list_for_job(&job.code).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].amount, 4_200);
}

#[tokio::test]
async fn representing_with_a_new_cost_type_moves_a_draft_entry() {
    let app = test_app();
    let job = app.create_job("FS", JobNature::Product).await;

    let SyncOutcome::Created { entry_id } = app
        .services
        .external_sync
        .sync_record(record("ext-type", &job.code))
        .await
        .unwrap()
    else {
        panic!("expected created");
    };
    assert_eq!(
        app.services.costing.get(entry_id).await.unwrap().cost_type,
        CostType::Pre
    );

    let mut rec = record("ext-type", &job.code);
    rec.cost_type = "post".to_string();
    let outcome = app.services.external_sync.sync_record(rec).await.unwrap();
    assert_eq!(outcome, SyncOutcome::Updated { entry_id });
    assert_eq!(
        app.services.costing.get(entry_id).await.unwrap().cost_type,
        CostType::Post
    );
}

#[tokio::test]
async fn cost_type_change_on_a_submitted_entry_is_a_conflict() {
    let app = test_app();
    let job = app.create_job("FS", JobNature::Product).await;

    let mut rec = record("ext-frozen", &job.code);
    rec.submit = true;
    let SyncOutcome::Created { entry_id } = app
        .services
        .external_sync
        .sync_record(rec)
        .await
        .unwrap()
    else {
        panic!("expected created");
    };

    let mut rec = record("ext-frozen", &job.code);
    rec.cost_type = "post".to_string();
    let err = app.services.external_sync.sync_record(rec).await.unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)), "got {err:?}");

    // The stored entry keeps its submitted cost type.
    let entry = app.services.costing.get(entry_id).await.unwrap();
    assert_eq!(entry.cost_type, CostType::Pre);
    assert_eq!(entry.approval_status, ApprovalStatus::Pending);
}

#[tokio::test]
async fn terminal_entries_are_skipped() {
    let app = test_app();
    let job = app.create_job("FS", JobNature::Product).await;

    let mut rec = record("ext-3", &job.code);
    rec.submit = true;
    let SyncOutcome::Created { entry_id } = app
        .services
        .external_sync
        .sync_record(rec)
        .await
        .unwrap()
    else {
        panic!("expected created");
    };
    app.services
        .approvals
        .approve(entry_id, "alice", None)
        .await
        .unwrap();

    let mut rec = record("ext-3", &job.code);
    rec.amount = dec!(999.00);
    let outcome = app.services.external_sync.sync_record(rec).await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Skipped { .. }));

    // The decided amount is untouched.
    let entry = app.services.costing.get(entry_id).await.unwrap();
    assert_eq!(entry.amount, 1_000);
}

#[tokio::test]
async fn batch_isolates_bad_records() {
    let app = test_app();
    let job = app.create_job("FS", JobNature::Product).await;

    let mut bad_category = record("ext-bad", &job.code);
    bad_category.category = "Z".to_string();
    let mut bad_type = record("ext-bad-type", &job.code);
    bad_type.cost_type = "mid".to_string();

    let report = app
        .services
        .external_sync
        .sync_batch(vec![
            record("ext-a", &job.code),
            bad_category,
            bad_type,
            record("ext-b", &job.code),
        ])
        .await
        .unwrap();

    assert_eq!(report.created, 2);
    assert_eq!(report.updated, 0);
    assert_eq!(report.errors.len(), 2);
    assert!(report.errors[0].contains("ext-bad"));
    assert!(report.errors[1].contains("ext-bad-type"));

    let entries = app.services.costing.list_for_job(&job.code).await.unwrap();
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn unknown_job_code_surfaces_in_the_report() {
    let app = test_app();
    let report = app
        .services
        .external_sync
        .sync_batch(vec![record("ext-z", "FS-P404")])
        .await
        .unwrap();
    assert_eq!(report.created, 0);
    assert_eq!(report.errors.len(), 1);
}
