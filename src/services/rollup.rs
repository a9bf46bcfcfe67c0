//! Financial Rollup Engine.
//!
//! `recompute` rebuilds a job code's derived financials from a fresh full
//! scan of its costing entries and currently-linked documents. It always
//! replaces, never accumulates, so re-running it any number of times is the
//! designed recovery path after a partial failure elsewhere.

use serde_json::{json, Map};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{
    ApprovalStatus, CostInvoice, CostType, CostingEntry, CostingSummary, JobCode, LinkedDocRef,
    PurchaseOrder,
};
use crate::store::{collections, from_document, DocumentStore, Filter};

pub struct RollupService {
    store: Arc<dyn DocumentStore>,
    events: EventSender,
}

impl RollupService {
    pub fn new(store: Arc<dyn DocumentStore>, events: EventSender) -> Self {
        Self { store, events }
    }

    #[instrument(skip(self))]
    pub async fn recompute(&self, job_code: &str) -> Result<JobCode, ServiceError> {
        let doc = self
            .store
            .get(collections::JOB_CODES, job_code)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("job code '{job_code}'")))?;
        let mut job: JobCode = from_document(doc)?;

        let entry_docs = self
            .store
            .query(
                collections::COSTING_ENTRIES,
                &[Filter::eq("job_code", json!(job_code))],
                None,
            )
            .await?;

        let mut summary = CostingSummary::default();
        for doc in entry_docs {
            let entry: CostingEntry = from_document(doc)?;
            match entry.approval_status {
                ApprovalStatus::Approved => {
                    let bucket = match entry.cost_type {
                        CostType::Pre => &mut summary.pre_cost,
                        CostType::Post => &mut summary.post_cost,
                    };
                    bucket.add(entry.category, entry.amount);
                    summary.total_paid += entry.amount_paid;
                    summary.total_payable += entry.balance_payable;
                }
                // The scan also reconciles the denormalized queue counters,
                // which is what makes recompute the recovery path for any
                // interrupted entry write.
                ApprovalStatus::Pending => {
                    summary.pending_approval_count += 1;
                    summary.pending_approval_amount += entry.amount;
                }
                ApprovalStatus::Draft | ApprovalStatus::Rejected => {}
            }
        }

        let total_po_value = self
            .sum_linked::<PurchaseOrder>(collections::PURCHASE_ORDERS, &job.linked_pos, |po| {
                po.total_amount
            })
            .await?;
        let total_pi_value = self
            .sum_linked::<CostInvoice>(collections::COST_INVOICES, &job.linked_pis, |pi| {
                pi.grand_total
            })
            .await?;

        let gross_margin = total_po_value - total_pi_value;
        let gross_margin_percentage = if total_po_value > 0 {
            round2(gross_margin as f64 * 100.0 / total_po_value as f64)
        } else {
            0.0
        };

        let mut fields = Map::new();
        fields.insert("costing_summary".into(), serde_json::to_value(&summary)?);
        fields.insert("total_po_value".into(), json!(total_po_value));
        fields.insert("total_pi_value".into(), json!(total_pi_value));
        fields.insert("gross_margin".into(), json!(gross_margin));
        fields.insert(
            "gross_margin_percentage".into(),
            json!(gross_margin_percentage),
        );
        // updated_at is deliberately untouched: refreshing derived fields is
        // not an edit, and repeated recomputes must produce identical output.
        self.store
            .update(collections::JOB_CODES, job_code, fields)
            .await?;

        job.costing_summary = summary;
        job.total_po_value = total_po_value;
        job.total_pi_value = total_pi_value;
        job.gross_margin = gross_margin;
        job.gross_margin_percentage = gross_margin_percentage;

        info!(
            %job_code,
            total_po_value,
            total_pi_value,
            gross_margin,
            "financials recomputed"
        );
        self.events
            .send(Event::FinancialsRecomputed {
                job_code: job_code.to_string(),
            })
            .await;
        Ok(job)
    }

    /// Sums a money field over linked documents. Duplicate refs count once
    /// and unresolved refs are skipped, so a stale link cache can never
    /// double-count or fail the whole recompute.
    async fn sum_linked<T: serde::de::DeserializeOwned>(
        &self,
        collection: &str,
        links: &[LinkedDocRef],
        field: impl Fn(&T) -> i64,
    ) -> Result<i64, ServiceError> {
        let mut seen = HashSet::new();
        let mut total = 0i64;
        for link in links {
            if !seen.insert(link.id.as_str()) {
                continue;
            }
            match self.store.get(collection, &link.id).await? {
                Some(doc) => {
                    let record: T = from_document(doc)?;
                    total += field(&record);
                }
                None => {
                    warn!(collection, id = %link.id, "skipping unresolved linked document");
                }
            }
        }
        Ok(total)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
