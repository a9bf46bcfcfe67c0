//! Service layer. Each service owns one concern; `AppServices` wires them
//! over a shared document store and event channel so handlers can stay thin.

pub mod approvals;
pub mod costing;
pub mod crossref;
pub mod external_sync;
pub mod job_codes;
pub mod registry;
pub mod rollup;

use std::sync::Arc;

use crate::directory::CompanyDirectory;
use crate::events::EventSender;
use crate::store::DocumentStore;

pub use approvals::ApprovalService;
pub use costing::CostingEntryService;
pub use crossref::CrossRefService;
pub use external_sync::ExternalSyncService;
pub use job_codes::JobCodeService;
pub use registry::CodeRegistry;
pub use rollup::RollupService;

#[derive(Clone)]
pub struct AppServices {
    pub registry: Arc<CodeRegistry>,
    pub job_codes: Arc<JobCodeService>,
    pub costing: Arc<CostingEntryService>,
    pub rollup: Arc<RollupService>,
    pub approvals: Arc<ApprovalService>,
    pub crossref: Arc<CrossRefService>,
    pub external_sync: Arc<ExternalSyncService>,
}

impl AppServices {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        directory: Arc<dyn CompanyDirectory>,
        events: EventSender,
    ) -> Self {
        let registry = Arc::new(CodeRegistry::new(store.clone(), directory));
        let rollup = Arc::new(RollupService::new(store.clone(), events.clone()));
        let costing = Arc::new(CostingEntryService::new(store.clone(), events.clone()));
        let job_codes = Arc::new(JobCodeService::new(
            store.clone(),
            registry.clone(),
            events.clone(),
        ));
        let approvals = Arc::new(ApprovalService::new(
            store.clone(),
            rollup.clone(),
            events.clone(),
        ));
        let crossref = Arc::new(CrossRefService::new(
            store,
            registry.clone(),
            rollup.clone(),
            events.clone(),
        ));
        let external_sync = Arc::new(ExternalSyncService::new(costing.clone(), events));
        Self {
            registry,
            job_codes,
            costing,
            rollup,
            approvals,
            crossref,
            external_sync,
        }
    }
}
