mod common;

use assert_matches::assert_matches;
use proptest::prelude::*;
use std::collections::HashSet;

use common::test_app;
use jobcost_api::errors::ServiceError;
use jobcost_api::models::{CodeSource, JobNature};
use jobcost_api::services::registry::{format_code, parse_code, CodeViolation};

#[tokio::test]
async fn generated_codes_start_at_one_and_increment() {
    let app = test_app();
    let first = app
        .services
        .registry
        .generate("FS", JobNature::ServiceSale)
        .await
        .unwrap();
    let second = app
        .services
        .registry
        .generate("FS", JobNature::ServiceSale)
        .await
        .unwrap();
    assert_eq!(first, "FS-S1");
    assert_eq!(second, "FS-S2");
}

#[tokio::test]
async fn counters_are_independent_per_prefix_and_nature() {
    let app = test_app();
    let fs_s = app
        .services
        .registry
        .generate("FS", JobNature::ServiceSale)
        .await
        .unwrap();
    let fs_sw = app
        .services
        .registry
        .generate("FS", JobNature::ServiceWork)
        .await
        .unwrap();
    let hq_s = app
        .services
        .registry
        .generate("HQ", JobNature::ServiceSale)
        .await
        .unwrap();
    assert_eq!(fs_s, "FS-S1");
    assert_eq!(fs_sw, "FS-SW1");
    assert_eq!(hq_s, "HQ-S1");
}

#[tokio::test]
async fn concurrent_generation_never_duplicates() {
    let app = test_app();
    let registry = app.services.registry.clone();

    let mut handles = Vec::new();
    for _ in 0..32 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry.generate("NE", JobNature::Product).await.unwrap()
        }));
    }

    let mut codes = HashSet::new();
    for handle in handles {
        assert!(codes.insert(handle.await.unwrap()));
    }
    assert_eq!(codes.len(), 32);
    // Contiguous: every number 1..=32 was issued exactly once.
    for n in 1..=32u32 {
        assert!(codes.contains(&format!("NE-P{n}")));
    }
}

#[tokio::test]
async fn unknown_prefix_is_rejected_without_consuming_a_number() {
    let app = test_app();
    let err = app
        .services
        .registry
        .generate("ZZ", JobNature::Product)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Validation(_));

    // The next valid generation still starts at 1.
    let code = app
        .services
        .registry
        .generate("FS", JobNature::Product)
        .await
        .unwrap();
    assert_eq!(code, "FS-P1");
}

#[tokio::test]
async fn minting_skips_numbers_occupied_by_explicit_codes() {
    let app = test_app();
    // A CRM import takes FS-P2 without touching the counter, so the second
    // minted code would land on it.
    let crm = app.create_crm_job("FS-P2").await;
    assert_eq!(crm.source, CodeSource::Crm);

    let first = app.create_job("FS", JobNature::Product).await;
    let second = app.create_job("FS", JobNature::Product).await;
    assert_eq!(first.code, "FS-P1");
    assert_eq!(second.code, "FS-P3");

    // The imported job is untouched.
    let reloaded = app.reload_job("FS-P2").await;
    assert_eq!(reloaded.source, CodeSource::Crm);
    assert_eq!(reloaded.title, "CRM imported job");
}

#[tokio::test]
async fn explicit_code_creation_rejects_occupied_codes() {
    let app = test_app();
    let minted = app.create_job("FS", JobNature::Product).await;
    assert_eq!(minted.code, "FS-P1");

    let err = app
        .services
        .job_codes
        .create(jobcost_api::services::job_codes::NewJobCode {
            company_prefix: "FS".to_string(),
            job_nature: JobNature::Product,
            code: Some("FS-P1".to_string()),
            title: "duplicate import".to_string(),
            description: None,
            client_id: None,
            client_name: None,
            currency: "USD".to_string(),
            quoted_value: rust_decimal::Decimal::ZERO,
            source: CodeSource::Crm,
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));

    let reloaded = app.reload_job("FS-P1").await;
    assert_eq!(reloaded.source, CodeSource::Manual);
}

#[test]
fn service_work_lexes_before_service_sale() {
    let parts = parse_code("FS-SW12").unwrap();
    assert_eq!(parts.job_nature, JobNature::ServiceWork);
    assert_eq!(parts.running_number, 12);

    let parts = parse_code("FS-S12").unwrap();
    assert_eq!(parts.job_nature, JobNature::ServiceSale);
}

#[test]
fn malformed_codes_fail_to_parse() {
    for code in ["FSP1", "FS-", "FS-X1", "FS-P", "FS-P0", "-P1", "FS-Pabc"] {
        assert!(parse_code(code).is_err(), "{code} should not parse");
    }
}

#[tokio::test]
async fn validate_collects_every_violation() {
    let app = test_app();
    let violations = app.services.registry.validate("ZZ-P1").await.unwrap();
    assert_eq!(violations, vec![CodeViolation::UnknownPrefix("ZZ".into())]);

    let violations = app.services.registry.validate("FS-P7").await.unwrap();
    assert!(violations.is_empty());
}

proptest! {
    #[test]
    fn format_then_parse_roundtrips(
        prefix in "[A-Z]{2,4}",
        nature_idx in 0usize..4,
        number in 1u32..1_000_000,
    ) {
        let nature = JobNature::lex_order()[nature_idx];
        let code = format_code(&prefix, nature, number);
        let parts = parse_code(&code).unwrap();
        prop_assert_eq!(parts.company_prefix, prefix);
        prop_assert_eq!(parts.job_nature, nature);
        prop_assert_eq!(parts.running_number, number);
    }
}
