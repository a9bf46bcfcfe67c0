#![allow(dead_code)]

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use jobcost_api::directory::StaticCompanyDirectory;
use jobcost_api::events::{process_events, EventSender};
use jobcost_api::models::{
    CodeSource, CostCategory, CostInvoice, CostType, CostingEntry, EntrySource, JobCode,
    JobNature, PurchaseOrder,
};
use jobcost_api::services::costing::NewCostingEntry;
use jobcost_api::services::job_codes::NewJobCode;
use jobcost_api::services::AppServices;
use jobcost_api::store::memory::MemoryStore;
use jobcost_api::store::{collections, to_document, DocumentStore};

pub const TEST_PREFIXES: [&str; 3] = ["FS", "HQ", "NE"];

pub struct TestApp {
    pub store: Arc<dyn DocumentStore>,
    pub services: AppServices,
}

/// In-memory application with the event drain running in the background.
pub fn test_app() -> TestApp {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let directory = Arc::new(StaticCompanyDirectory::new(
        TEST_PREFIXES.iter().map(|p| p.to_string()),
    ));
    let (tx, rx) = mpsc::channel(256);
    tokio::spawn(process_events(rx));
    let services = AppServices::new(store.clone(), directory, EventSender::new(tx));
    TestApp { store, services }
}

impl TestApp {
    pub async fn create_job(&self, prefix: &str, nature: JobNature) -> JobCode {
        self.services
            .job_codes
            .create(NewJobCode {
                company_prefix: prefix.to_string(),
                job_nature: nature,
                code: None,
                title: format!("{prefix} test job"),
                description: None,
                client_id: None,
                client_name: Some("Acme Pte Ltd".to_string()),
                currency: "USD".to_string(),
                quoted_value: Decimal::ZERO,
                source: CodeSource::Manual,
            })
            .await
            .unwrap()
    }

    pub async fn create_crm_job(&self, code: &str) -> JobCode {
        let parts = jobcost_api::services::registry::parse_code(code).unwrap();
        self.services
            .job_codes
            .create(NewJobCode {
                company_prefix: parts.company_prefix,
                job_nature: parts.job_nature,
                code: Some(code.to_string()),
                title: "CRM imported job".to_string(),
                description: None,
                client_id: Some("crm-77".to_string()),
                client_name: None,
                currency: "USD".to_string(),
                quoted_value: Decimal::ZERO,
                source: CodeSource::Crm,
            })
            .await
            .unwrap()
    }

    pub async fn draft_entry(&self, job_code: &str, amount: Decimal) -> CostingEntry {
        self.new_entry(job_code, amount, false).await
    }

    pub async fn pending_entry(&self, job_code: &str, amount: Decimal) -> CostingEntry {
        self.new_entry(job_code, amount, true).await
    }

    async fn new_entry(&self, job_code: &str, amount: Decimal, submit: bool) -> CostingEntry {
        self.services
            .costing
            .create(
                NewCostingEntry {
                    job_code: job_code.to_string(),
                    cost_type: CostType::Pre,
                    category: CostCategory::A,
                    description: Some("materials".to_string()),
                    amount,
                    amount_paid: Decimal::ZERO,
                    unit_rate: None,
                    assigned_approver_id: None,
                    remarks: None,
                    created_by: "tester".to_string(),
                    source: EntrySource::Manual,
                    source_origin: None,
                    external_ref: None,
                    resubmission_of: None,
                },
                submit,
            )
            .await
            .unwrap()
    }

    pub async fn seed_purchase_order(&self, job_code: &str, po_number: &str, cents: i64) -> PurchaseOrder {
        let po = PurchaseOrder {
            id: Uuid::new_v4().to_string(),
            po_number: po_number.to_string(),
            job_code: Some(job_code.to_string()),
            supplier_name: Some("Supplier Co".to_string()),
            total_amount: cents,
            status: Some("issued".to_string()),
            created_at: Utc::now(),
        };
        self.store
            .put(
                collections::PURCHASE_ORDERS,
                &po.id,
                to_document(&po).unwrap(),
            )
            .await
            .unwrap();
        po
    }

    pub async fn seed_cost_invoice(&self, job_code: &str, invoice_number: &str, cents: i64) -> CostInvoice {
        let pi = CostInvoice {
            id: Uuid::new_v4().to_string(),
            invoice_number: invoice_number.to_string(),
            job_code: Some(job_code.to_string()),
            supplier_name: Some("Supplier Co".to_string()),
            grand_total: cents,
            status: Some("received".to_string()),
            created_at: Utc::now(),
        };
        self.store
            .put(
                collections::COST_INVOICES,
                &pi.id,
                to_document(&pi).unwrap(),
            )
            .await
            .unwrap();
        pi
    }

    pub async fn reload_job(&self, code: &str) -> JobCode {
        self.services.job_codes.get(code).await.unwrap()
    }
}
