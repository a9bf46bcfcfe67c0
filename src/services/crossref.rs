//! Cross-Reference Synchronizer.
//!
//! The `job_code` field on each PO/invoice is the source of truth; the link
//! arrays cached on a job code are rebuilt wholesale from a query, never
//! patched incrementally, so a rebuild always converges regardless of what
//! drifted. Re-keying a job code is the one multi-document operation here:
//! it repoints referencing documents first (idempotent, resumable) and moves
//! the job document last, in a single transaction.

use chrono::Utc;
use serde_json::{json, Map};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{CostInvoice, JobCode, LinkedDocRef, PurchaseOrder};
use crate::services::registry::{parse_code, CodeRegistry};
use crate::services::rollup::RollupService;
use crate::store::{
    collections, from_document, to_document, DocumentStore, Filter, StoreError, WriteOp,
};

pub struct CrossRefService {
    store: Arc<dyn DocumentStore>,
    registry: Arc<CodeRegistry>,
    rollup: Arc<RollupService>,
    events: EventSender,
}

impl CrossRefService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        registry: Arc<CodeRegistry>,
        rollup: Arc<RollupService>,
        events: EventSender,
    ) -> Self {
        Self {
            store,
            registry,
            rollup,
            events,
        }
    }

    /// Recomputes the link caches from the source-of-truth `job_code` fields
    /// and refreshes the financial rollup.
    #[instrument(skip(self))]
    pub async fn rebuild_links(&self, job_code: &str) -> Result<JobCode, ServiceError> {
        if self
            .store
            .get(collections::JOB_CODES, job_code)
            .await?
            .is_none()
        {
            return Err(ServiceError::NotFound(format!("job code '{job_code}'")));
        }

        let mut pos: Vec<PurchaseOrder> = self
            .collect_referencing(collections::PURCHASE_ORDERS, job_code)
            .await?;
        pos.sort_by(|a, b| a.po_number.cmp(&b.po_number));
        let linked_pos: Vec<LinkedDocRef> = pos.iter().map(PurchaseOrder::link_ref).collect();

        let mut pis: Vec<CostInvoice> = self
            .collect_referencing(collections::COST_INVOICES, job_code)
            .await?;
        pis.sort_by(|a, b| a.invoice_number.cmp(&b.invoice_number));
        let linked_pis: Vec<LinkedDocRef> = pis.iter().map(CostInvoice::link_ref).collect();

        let mut fields = Map::new();
        fields.insert("linked_pos".into(), serde_json::to_value(&linked_pos)?);
        fields.insert("linked_pis".into(), serde_json::to_value(&linked_pis)?);
        self.store
            .update(collections::JOB_CODES, job_code, fields)
            .await?;

        self.events
            .send(Event::CrossReferencesRebuilt {
                job_code: job_code.to_string(),
                po_links: linked_pos.len(),
                pi_links: linked_pis.len(),
            })
            .await;

        self.rollup.recompute(job_code).await
    }

    /// Re-keys a non-CRM job code. Safe to re-run after a partial failure:
    /// repointing is resumable (already-repointed documents drop out of the
    /// query), and the job document itself moves atomically at the end.
    #[instrument(skip(self))]
    pub async fn rekey(&self, old_code: &str, new_code: &str) -> Result<JobCode, ServiceError> {
        if old_code == new_code {
            return Err(ServiceError::validation(
                "new code must differ from the current code",
            ));
        }

        let doc = self
            .store
            .get(collections::JOB_CODES, old_code)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("job code '{old_code}'")))?;
        let mut job: JobCode = from_document(doc)?;
        if !job.is_editable() {
            return Err(ServiceError::conflict(format!(
                "job code '{old_code}' is CRM-sourced and cannot be re-keyed"
            )));
        }

        let violations = self.registry.validate(new_code).await?;
        if !violations.is_empty() {
            let detail: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
            return Err(ServiceError::Validation(detail.join("; ")));
        }
        if self
            .store
            .get(collections::JOB_CODES, new_code)
            .await?
            .is_some()
        {
            return Err(ServiceError::conflict(format!(
                "job code '{new_code}' already exists"
            )));
        }

        // Phase 1: repoint every referencing document. Failures leave the old
        // job intact and are reported, not swallowed; re-running the re-key
        // finishes the remainder.
        let mut failures: Vec<String> = Vec::new();
        for collection in [
            collections::PURCHASE_ORDERS,
            collections::COST_INVOICES,
            collections::COSTING_ENTRIES,
        ] {
            let docs = self
                .store
                .query(collection, &[Filter::eq("job_code", json!(old_code))], None)
                .await?;
            for doc in docs {
                let Some(id) = doc.get("id").and_then(|v| v.as_str()).map(String::from) else {
                    failures.push(format!("{collection}/<missing id>"));
                    continue;
                };
                let mut fields = Map::new();
                fields.insert("job_code".into(), json!(new_code));
                if let Err(err) = self.store.update(collection, &id, fields).await {
                    warn!(collection, %id, %err, "failed to repoint document during re-key");
                    failures.push(format!("{collection}/{id}"));
                }
            }
        }
        if !failures.is_empty() {
            return Err(ServiceError::PartialSync(format!(
                "re-key {old_code} -> {new_code} could not repoint {} document(s) ({}); \
                 re-run the re-key to finish",
                failures.len(),
                failures.join(", ")
            )));
        }

        // Phase 2: move the job document atomically under its new key.
        let parts = parse_code(new_code)?;
        job.code = new_code.to_string();
        job.company_prefix = parts.company_prefix;
        job.job_nature = parts.job_nature;
        job.running_number = parts.running_number;
        job.updated_at = Utc::now();
        self.store
            .run_transaction(vec![
                WriteOp::require_exists(collections::JOB_CODES, old_code),
                WriteOp::require_not_exists(collections::JOB_CODES, new_code),
                WriteOp::put(collections::JOB_CODES, new_code, to_document(&job)?),
                WriteOp::delete(collections::JOB_CODES, old_code),
            ])
            .await
            .map_err(|e| match e {
                StoreError::PreconditionFailed(_) => ServiceError::conflict(format!(
                    "job code '{new_code}' was taken, or '{old_code}' disappeared, \
                     while re-keying"
                )),
                other => other.into(),
            })?;

        info!(%old_code, %new_code, "job code re-keyed");
        self.events
            .send(Event::JobCodeRekeyed {
                old_code: old_code.to_string(),
                new_code: new_code.to_string(),
            })
            .await;

        // Rebuild caches and derived financials under the new key.
        self.rebuild_links(new_code).await
    }

    async fn collect_referencing<T: serde::de::DeserializeOwned>(
        &self,
        collection: &str,
        job_code: &str,
    ) -> Result<Vec<T>, ServiceError> {
        let docs = self
            .store
            .query(collection, &[Filter::eq("job_code", json!(job_code))], None)
            .await?;
        docs.into_iter()
            .map(|doc| from_document(doc).map_err(ServiceError::from))
            .collect()
    }
}
