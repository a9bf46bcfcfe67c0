//! Costing Entry Store: CRUD and lifecycle transitions for individual cost
//! rows, keeping the owning job code's pending-approval counters in step
//! within the same transaction as every entry write.

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{
    money, ApprovalStatus, CostCategory, CostType, CostingEntry, EntrySource,
};
use crate::store::{
    collections, from_document, to_document, DocumentStore, Filter, OrderBy, StoreError, WriteOp,
};

const PENDING_COUNT: &str = "costing_summary.pending_approval_count";
const PENDING_AMOUNT: &str = "costing_summary.pending_approval_amount";

#[derive(Debug, Clone)]
pub struct NewCostingEntry {
    pub job_code: String,
    pub cost_type: CostType,
    pub category: CostCategory,
    pub description: Option<String>,
    pub amount: Decimal,
    pub amount_paid: Decimal,
    pub unit_rate: Option<Decimal>,
    pub assigned_approver_id: Option<String>,
    pub remarks: Option<String>,
    pub created_by: String,
    pub source: EntrySource,
    pub source_origin: Option<String>,
    pub external_ref: Option<String>,
    pub resubmission_of: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct CostingEntryPatch {
    // Structural fields, frozen once the entry leaves draft.
    pub job_code: Option<String>,
    pub cost_type: Option<CostType>,
    // Freely editable while draft or pending.
    pub category: Option<CostCategory>,
    pub description: Option<String>,
    pub amount: Option<Decimal>,
    pub amount_paid: Option<Decimal>,
    pub unit_rate: Option<Decimal>,
    pub assigned_approver_id: Option<String>,
    pub remarks: Option<String>,
}

pub struct CostingEntryService {
    store: Arc<dyn DocumentStore>,
    events: EventSender,
}

impl CostingEntryService {
    pub fn new(store: Arc<dyn DocumentStore>, events: EventSender) -> Self {
        Self { store, events }
    }

    fn normalized_amounts(
        amount: Decimal,
        amount_paid: Decimal,
        unit_rate: Option<Decimal>,
    ) -> Result<(i64, i64, Option<i64>), ServiceError> {
        let amount = money::to_minor_units(amount)?;
        let amount_paid = money::to_minor_units(amount_paid)?;
        if amount_paid > amount {
            return Err(ServiceError::validation(
                "amount_paid cannot exceed amount",
            ));
        }
        let unit_rate = unit_rate.map(money::to_minor_units).transpose()?;
        Ok((amount, amount_paid, unit_rate))
    }

    #[instrument(skip(self, input), fields(job_code = %input.job_code))]
    pub async fn create(
        &self,
        input: NewCostingEntry,
        submit_immediately: bool,
    ) -> Result<CostingEntry, ServiceError> {
        let (amount, amount_paid, unit_rate) =
            Self::normalized_amounts(input.amount, input.amount_paid, input.unit_rate)?;

        if self
            .store
            .get(collections::JOB_CODES, &input.job_code)
            .await?
            .is_none()
        {
            return Err(ServiceError::NotFound(format!(
                "job code '{}'",
                input.job_code
            )));
        }

        let now = Utc::now();
        let entry = CostingEntry {
            id: Uuid::new_v4(),
            job_code: input.job_code,
            cost_type: input.cost_type,
            category: input.category,
            description: input.description,
            amount,
            amount_paid,
            balance_payable: amount - amount_paid,
            unit_rate,
            approval_status: if submit_immediately {
                ApprovalStatus::Pending
            } else {
                ApprovalStatus::Draft
            },
            assigned_approver_id: input.assigned_approver_id,
            remarks: input.remarks,
            rejection_reason: None,
            decided_by: None,
            created_by: input.created_by,
            created_at: now,
            updated_at: now,
            submitted_at: submit_immediately.then_some(now),
            approved_at: None,
            rejected_at: None,
            source: input.source,
            source_origin: input.source_origin,
            external_ref: input.external_ref,
            resubmission_of: input.resubmission_of,
        };

        let entry_id = entry.id.to_string();
        let mut ops = vec![
            WriteOp::require_exists(collections::JOB_CODES, &entry.job_code),
            WriteOp::put(collections::COSTING_ENTRIES, &entry_id, to_document(&entry)?),
        ];
        if entry.approval_status == ApprovalStatus::Pending {
            ops.push(WriteOp::increment(
                collections::JOB_CODES,
                &entry.job_code,
                PENDING_COUNT,
                1,
            ));
            ops.push(WriteOp::increment(
                collections::JOB_CODES,
                &entry.job_code,
                PENDING_AMOUNT,
                entry.amount,
            ));
        }
        self.store.run_transaction(ops).await.map_err(|e| match e {
            StoreError::PreconditionFailed(_) => {
                ServiceError::NotFound(format!("job code '{}'", entry.job_code))
            }
            other => other.into(),
        })?;

        info!(entry_id = %entry.id, status = %entry.approval_status, "costing entry created");
        self.events
            .send(Event::CostingEntryCreated {
                entry_id: entry.id,
                job_code: entry.job_code.clone(),
            })
            .await;
        if entry.approval_status == ApprovalStatus::Pending {
            self.events
                .send(Event::CostingEntrySubmitted {
                    entry_id: entry.id,
                    job_code: entry.job_code.clone(),
                })
                .await;
        }
        Ok(entry)
    }

    pub async fn get(&self, id: Uuid) -> Result<CostingEntry, ServiceError> {
        let doc = self
            .store
            .get(collections::COSTING_ENTRIES, &id.to_string())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("costing entry {id}")))?;
        Ok(from_document(doc)?)
    }

    pub async fn list_for_job(&self, job_code: &str) -> Result<Vec<CostingEntry>, ServiceError> {
        let docs = self
            .store
            .query(
                collections::COSTING_ENTRIES,
                &[Filter::eq("job_code", json!(job_code))],
                Some(&OrderBy::asc("created_at")),
            )
            .await?;
        docs.into_iter()
            .map(|doc| from_document(doc).map_err(ServiceError::from))
            .collect()
    }

    pub async fn find_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<CostingEntry>, ServiceError> {
        let mut docs = self
            .store
            .query(
                collections::COSTING_ENTRIES,
                &[Filter::eq("external_ref", json!(external_ref))],
                None,
            )
            .await?;
        match docs.pop() {
            Some(doc) => Ok(Some(from_document(doc)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, patch))]
    pub async fn update(
        &self,
        id: Uuid,
        patch: CostingEntryPatch,
    ) -> Result<CostingEntry, ServiceError> {
        let current = self.get(id).await?;
        if current.approval_status.is_terminal() {
            return Err(ServiceError::conflict(format!(
                "costing entry {id} is {} and can no longer change",
                current.approval_status
            )));
        }

        let changes_job_code = patch
            .job_code
            .as_ref()
            .is_some_and(|jc| *jc != current.job_code);
        let changes_cost_type = patch
            .cost_type
            .is_some_and(|ct| ct != current.cost_type);
        if current.approval_status != ApprovalStatus::Draft
            && (changes_job_code || changes_cost_type)
        {
            return Err(ServiceError::conflict(
                "job_code and cost_type are frozen once an entry has been submitted",
            ));
        }

        let mut updated = current.clone();
        if let Some(job_code) = patch.job_code {
            if changes_job_code
                && self
                    .store
                    .get(collections::JOB_CODES, &job_code)
                    .await?
                    .is_none()
            {
                return Err(ServiceError::NotFound(format!("job code '{job_code}'")));
            }
            updated.job_code = job_code;
        }
        if let Some(cost_type) = patch.cost_type {
            updated.cost_type = cost_type;
        }
        if let Some(category) = patch.category {
            updated.category = category;
        }
        if let Some(description) = patch.description {
            updated.description = Some(description);
        }
        if let Some(approver) = patch.assigned_approver_id {
            updated.assigned_approver_id = Some(approver);
        }
        if let Some(remarks) = patch.remarks {
            updated.remarks = Some(remarks);
        }
        let (amount, amount_paid, unit_rate) = Self::normalized_amounts(
            patch
                .amount
                .unwrap_or_else(|| money::from_minor_units(current.amount)),
            patch
                .amount_paid
                .unwrap_or_else(|| money::from_minor_units(current.amount_paid)),
            patch
                .unit_rate
                .or_else(|| current.unit_rate.map(money::from_minor_units)),
        )?;
        updated.amount = amount;
        updated.amount_paid = amount_paid;
        updated.balance_payable = amount - amount_paid;
        updated.unit_rate = unit_rate;
        updated.updated_at = Utc::now();

        let entry_id = id.to_string();
        let mut ops = vec![
            WriteOp::require_field(
                collections::COSTING_ENTRIES,
                &entry_id,
                "approval_status",
                json!(current.approval_status),
            ),
            WriteOp::put(
                collections::COSTING_ENTRIES,
                &entry_id,
                to_document(&updated)?,
            ),
        ];
        // A pending entry's amount feeds the job's queue badge; keep the
        // denormalized amount in the same transaction as the edit.
        if current.approval_status == ApprovalStatus::Pending {
            let delta = updated.amount - current.amount;
            if delta != 0 {
                ops.push(WriteOp::increment(
                    collections::JOB_CODES,
                    &updated.job_code,
                    PENDING_AMOUNT,
                    delta,
                ));
            }
        }
        self.store.run_transaction(ops).await.map_err(|e| match e {
            StoreError::PreconditionFailed(_) => ServiceError::conflict(format!(
                "costing entry {id} was modified concurrently; reload and retry"
            )),
            other => other.into(),
        })?;

        Ok(updated)
    }

    /// Deletion is permitted only while draft; anything later must go through
    /// the approval decision instead.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let current = self.get(id).await?;
        if current.approval_status != ApprovalStatus::Draft {
            return Err(ServiceError::conflict(format!(
                "only draft entries can be deleted; {id} is {}",
                current.approval_status
            )));
        }

        let entry_id = id.to_string();
        self.store
            .run_transaction(vec![
                WriteOp::require_field(
                    collections::COSTING_ENTRIES,
                    &entry_id,
                    "approval_status",
                    json!(ApprovalStatus::Draft),
                ),
                WriteOp::delete(collections::COSTING_ENTRIES, &entry_id),
            ])
            .await
            .map_err(|e| match e {
                StoreError::PreconditionFailed(_) => ServiceError::conflict(format!(
                    "costing entry {id} left draft before it could be deleted"
                )),
                other => other.into(),
            })?;

        self.events
            .send(Event::CostingEntryDeleted {
                entry_id: id,
                job_code: current.job_code,
            })
            .await;
        Ok(())
    }

    /// `draft -> pending`. Already-pending entries are an idempotent no-op so
    /// UI retries are harmless; terminal entries are a conflict.
    #[instrument(skip(self))]
    pub async fn submit_for_approval(
        &self,
        id: Uuid,
        approver_id: Option<String>,
    ) -> Result<CostingEntry, ServiceError> {
        let current = self.get(id).await?;
        match current.approval_status {
            ApprovalStatus::Pending => return Ok(current),
            ApprovalStatus::Approved | ApprovalStatus::Rejected => {
                return Err(ServiceError::conflict(format!(
                    "costing entry {id} is already {}",
                    current.approval_status
                )))
            }
            ApprovalStatus::Draft => {}
        }

        let mut updated = current.clone();
        let now = Utc::now();
        updated.approval_status = ApprovalStatus::Pending;
        updated.submitted_at = Some(now);
        updated.updated_at = now;
        if approver_id.is_some() {
            updated.assigned_approver_id = approver_id;
        }

        let entry_id = id.to_string();
        let result = self
            .store
            .run_transaction(vec![
                WriteOp::require_field(
                    collections::COSTING_ENTRIES,
                    &entry_id,
                    "approval_status",
                    json!(ApprovalStatus::Draft),
                ),
                WriteOp::put(
                    collections::COSTING_ENTRIES,
                    &entry_id,
                    to_document(&updated)?,
                ),
                WriteOp::increment(
                    collections::JOB_CODES,
                    &updated.job_code,
                    PENDING_COUNT,
                    1,
                ),
                WriteOp::increment(
                    collections::JOB_CODES,
                    &updated.job_code,
                    PENDING_AMOUNT,
                    updated.amount,
                ),
            ])
            .await;
        match result {
            Ok(()) => {}
            Err(StoreError::PreconditionFailed(_)) => {
                // Lost a race. If the other writer made the same transition
                // the submission already happened; report success with the
                // stored entry so retries stay idempotent.
                let latest = self.get(id).await?;
                return if latest.approval_status == ApprovalStatus::Pending {
                    info!(entry_id = %id, "entry submitted concurrently, returning stored state");
                    Ok(latest)
                } else {
                    Err(ServiceError::conflict(format!(
                        "costing entry {id} is now {}; submission no longer applies",
                        latest.approval_status
                    )))
                };
            }
            Err(other) => return Err(other.into()),
        }

        info!(entry_id = %id, "costing entry submitted for approval");
        self.events
            .send(Event::CostingEntrySubmitted {
                entry_id: id,
                job_code: updated.job_code.clone(),
            })
            .await;
        Ok(updated)
    }
}
