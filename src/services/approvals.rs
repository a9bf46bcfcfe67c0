//! Approval Queue: a read-time projection of pending entries plus the
//! approve/reject decisions. Decisions are guarded by a status precondition
//! so concurrent re-delivery resolves to exactly one transition, with the
//! loser observing idempotent success rather than a duplicate.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{ApprovalStatus, CostingEntry};
use crate::services::rollup::RollupService;
use crate::store::{
    collections, from_document, to_document, DocumentStore, Filter, OrderBy, StoreError, WriteOp,
};

const PENDING_COUNT: &str = "costing_summary.pending_approval_count";
const PENDING_AMOUNT: &str = "costing_summary.pending_approval_amount";

/// Optional scoping for queue reads: by company (code prefix) and/or to the
/// requesting approver (their assignments plus unassigned entries).
#[derive(Debug, Clone, Default)]
pub struct QueueScope {
    pub company_prefix: Option<String>,
    pub approver_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ApprovalQueueItem {
    pub entry: CostingEntry,
    pub days_waiting: i64,
}

pub struct ApprovalService {
    store: Arc<dyn DocumentStore>,
    rollup: Arc<RollupService>,
    events: EventSender,
}

impl ApprovalService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        rollup: Arc<RollupService>,
        events: EventSender,
    ) -> Self {
        Self {
            store,
            rollup,
            events,
        }
    }

    /// Pending entries, oldest submission first (FIFO fairness).
    #[instrument(skip(self))]
    pub async fn list(&self, scope: QueueScope) -> Result<Vec<ApprovalQueueItem>, ServiceError> {
        let docs = self
            .store
            .query(
                collections::COSTING_ENTRIES,
                &[Filter::eq("approval_status", json!(ApprovalStatus::Pending))],
                Some(&OrderBy::asc("submitted_at")),
            )
            .await?;

        let now = Utc::now();
        let mut items = Vec::with_capacity(docs.len());
        for doc in docs {
            let entry: CostingEntry = from_document(doc)?;
            if let Some(prefix) = &scope.company_prefix {
                if !entry.job_code.starts_with(&format!("{prefix}-")) {
                    continue;
                }
            }
            if let Some(approver) = &scope.approver_id {
                match &entry.assigned_approver_id {
                    Some(assigned) if assigned != approver => continue,
                    _ => {}
                }
            }
            let days_waiting = entry
                .submitted_at
                .map(|at| (now - at).num_days())
                .unwrap_or(0);
            items.push(ApprovalQueueItem {
                entry,
                days_waiting,
            });
        }
        Ok(items)
    }

    #[instrument(skip(self, remarks))]
    pub async fn approve(
        &self,
        entry_id: Uuid,
        approver_id: &str,
        remarks: Option<String>,
    ) -> Result<CostingEntry, ServiceError> {
        if approver_id.trim().is_empty() {
            return Err(ServiceError::validation("approver id is required"));
        }
        let entry = self.load(entry_id).await?;
        match entry.approval_status {
            // Tolerates at-least-once delivery of UI retries.
            ApprovalStatus::Approved => {
                info!(%entry_id, "entry already approved, treating as idempotent success");
                return Ok(entry);
            }
            ApprovalStatus::Draft | ApprovalStatus::Rejected => {
                return Err(ServiceError::conflict(format!(
                    "cannot approve entry {entry_id} in state {}",
                    entry.approval_status
                )))
            }
            ApprovalStatus::Pending => {}
        }

        let now = Utc::now();
        let mut updated = entry.clone();
        updated.approval_status = ApprovalStatus::Approved;
        updated.approved_at = Some(now);
        updated.decided_by = Some(approver_id.to_string());
        if remarks.is_some() {
            updated.remarks = remarks;
        }
        updated.updated_at = now;

        match self.commit_decision(&entry, &updated).await {
            Ok(()) => {}
            Err(ServiceError::Store(StoreError::PreconditionFailed(_))) => {
                // Lost the race. If the winner applied the same transition
                // this is a success, otherwise a real conflict.
                let latest = self.load(entry_id).await?;
                return if latest.approval_status == ApprovalStatus::Approved {
                    Ok(latest)
                } else {
                    Err(ServiceError::conflict(format!(
                        "entry {entry_id} is now {}, approval no longer applies",
                        latest.approval_status
                    )))
                };
            }
            Err(other) => return Err(other),
        }

        self.rollup.recompute(&updated.job_code).await?;
        self.events
            .send(Event::CostingEntryApproved {
                entry_id,
                job_code: updated.job_code.clone(),
                approver_id: approver_id.to_string(),
            })
            .await;
        Ok(updated)
    }

    #[instrument(skip(self, reason))]
    pub async fn reject(
        &self,
        entry_id: Uuid,
        approver_id: &str,
        reason: &str,
    ) -> Result<CostingEntry, ServiceError> {
        // Reason is mandatory; checked before any state is touched.
        if reason.trim().is_empty() {
            return Err(ServiceError::validation("rejection reason is required"));
        }
        if approver_id.trim().is_empty() {
            return Err(ServiceError::validation("approver id is required"));
        }

        let entry = self.load(entry_id).await?;
        match entry.approval_status {
            ApprovalStatus::Rejected => {
                info!(%entry_id, "entry already rejected, treating as idempotent success");
                return Ok(entry);
            }
            ApprovalStatus::Draft | ApprovalStatus::Approved => {
                return Err(ServiceError::conflict(format!(
                    "cannot reject entry {entry_id} in state {}",
                    entry.approval_status
                )))
            }
            ApprovalStatus::Pending => {}
        }

        let now = Utc::now();
        let mut updated = entry.clone();
        updated.approval_status = ApprovalStatus::Rejected;
        updated.rejected_at = Some(now);
        updated.decided_by = Some(approver_id.to_string());
        updated.rejection_reason = Some(reason.trim().to_string());
        updated.updated_at = now;

        match self.commit_decision(&entry, &updated).await {
            Ok(()) => {}
            Err(ServiceError::Store(StoreError::PreconditionFailed(_))) => {
                let latest = self.load(entry_id).await?;
                return if latest.approval_status == ApprovalStatus::Rejected {
                    Ok(latest)
                } else {
                    Err(ServiceError::conflict(format!(
                        "entry {entry_id} is now {}, rejection no longer applies",
                        latest.approval_status
                    )))
                };
            }
            Err(other) => return Err(other),
        }

        // Rejected entries never count into totals, but the decision still
        // clears the pending badge and refreshes the summary.
        self.rollup.recompute(&updated.job_code).await?;
        self.events
            .send(Event::CostingEntryRejected {
                entry_id,
                job_code: updated.job_code.clone(),
                reason: reason.trim().to_string(),
            })
            .await;
        Ok(updated)
    }

    async fn load(&self, entry_id: Uuid) -> Result<CostingEntry, ServiceError> {
        let doc = self
            .store
            .get(collections::COSTING_ENTRIES, &entry_id.to_string())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("costing entry {entry_id}")))?;
        Ok(from_document(doc)?)
    }

    /// Applies a pending -> terminal transition and the matching queue-badge
    /// decrement in one guarded transaction.
    async fn commit_decision(
        &self,
        before: &CostingEntry,
        after: &CostingEntry,
    ) -> Result<(), ServiceError> {
        let entry_id = after.id.to_string();
        self.store
            .run_transaction(vec![
                WriteOp::require_field(
                    collections::COSTING_ENTRIES,
                    &entry_id,
                    "approval_status",
                    json!(ApprovalStatus::Pending),
                ),
                WriteOp::put(
                    collections::COSTING_ENTRIES,
                    &entry_id,
                    to_document(after)?,
                ),
                WriteOp::increment(collections::JOB_CODES, &after.job_code, PENDING_COUNT, -1),
                WriteOp::increment(
                    collections::JOB_CODES,
                    &after.job_code,
                    PENDING_AMOUNT,
                    -before.amount,
                ),
            ])
            .await?;
        Ok(())
    }
}
