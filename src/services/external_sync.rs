//! External Entry Adapter.
//!
//! Normalizes costing records arriving from a third-party workspace into the
//! entry store's schema: decimal amounts become integer minor units
//! (round-half-up), unknown category/cost-type values are rejected rather
//! than silently defaulted, and every entry is tagged with its origin and the
//! source's stable identifier. Re-presenting the same identifier updates the
//! existing entry instead of duplicating it, so periodic polls are safe.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{CostCategory, CostType, EntrySource};
use crate::services::costing::{CostingEntryPatch, CostingEntryService, NewCostingEntry};

/// Entry-like record as pulled from the external workspace feed. Amounts are
/// decimal currency units; `external_id` is the upsert key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalCostingRecord {
    pub external_id: String,
    pub origin: String,
    pub job_code: String,
    pub cost_type: String,
    pub category: String,
    pub description: Option<String>,
    pub amount: Decimal,
    pub amount_paid: Option<Decimal>,
    pub unit_rate: Option<Decimal>,
    /// Submit straight into the approval queue instead of landing as draft.
    #[serde(default)]
    pub submit: bool,
    pub approver_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Created { entry_id: Uuid },
    Updated { entry_id: Uuid },
    /// Terminal entries are left alone; the decision already happened here.
    Skipped { entry_id: Uuid, reason: String },
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

pub struct ExternalSyncService {
    costing: Arc<CostingEntryService>,
    events: EventSender,
}

impl ExternalSyncService {
    pub fn new(costing: Arc<CostingEntryService>, events: EventSender) -> Self {
        Self { costing, events }
    }

    #[instrument(skip(self, record), fields(external_id = %record.external_id))]
    pub async fn sync_record(
        &self,
        record: ExternalCostingRecord,
    ) -> Result<SyncOutcome, ServiceError> {
        if record.external_id.trim().is_empty() {
            return Err(ServiceError::validation("external_id is required"));
        }
        let cost_type = CostType::from_str(&record.cost_type).map_err(|_| {
            ServiceError::validation(format!(
                "unknown cost type '{}' (expected pre or post)",
                record.cost_type
            ))
        })?;
        let category = CostCategory::from_str(&record.category).map_err(|_| {
            ServiceError::validation(format!(
                "unknown cost category '{}' (expected A-H)",
                record.category
            ))
        })?;

        let existing = self
            .costing
            .find_by_external_ref(&record.external_id)
            .await?;

        let outcome = match existing {
            Some(entry) if entry.approval_status.is_terminal() => {
                warn!(entry_id = %entry.id, status = %entry.approval_status,
                    "external record re-presented after terminal decision, skipping");
                SyncOutcome::Skipped {
                    entry_id: entry.id,
                    reason: format!("entry is already {}", entry.approval_status),
                }
            }
            Some(entry) => {
                // Structural fields travel through the patch too; a changed
                // job_code or cost_type on a non-draft entry surfaces the
                // entry store's freeze conflict instead of half-applying.
                let updated = self
                    .costing
                    .update(
                        entry.id,
                        CostingEntryPatch {
                            job_code: Some(record.job_code),
                            cost_type: Some(cost_type),
                            category: Some(category),
                            description: record.description,
                            amount: Some(record.amount),
                            amount_paid: record.amount_paid,
                            unit_rate: record.unit_rate,
                            ..Default::default()
                        },
                    )
                    .await?;
                SyncOutcome::Updated {
                    entry_id: updated.id,
                }
            }
            None => {
                let created = self
                    .costing
                    .create(
                        NewCostingEntry {
                            job_code: record.job_code,
                            cost_type,
                            category,
                            description: record.description,
                            amount: record.amount,
                            amount_paid: record.amount_paid.unwrap_or(Decimal::ZERO),
                            unit_rate: record.unit_rate,
                            assigned_approver_id: record.approver_id,
                            remarks: None,
                            created_by: format!("sync:{}", record.origin),
                            source: EntrySource::External,
                            source_origin: Some(record.origin),
                            external_ref: Some(record.external_id.clone()),
                            resubmission_of: None,
                        },
                        record.submit,
                    )
                    .await?;
                SyncOutcome::Created {
                    entry_id: created.id,
                }
            }
        };

        let created = matches!(&outcome, SyncOutcome::Created { .. });
        if let SyncOutcome::Created { entry_id } | SyncOutcome::Updated { entry_id } = &outcome {
            info!(%entry_id, "external costing record synced");
            self.events
                .send(Event::ExternalEntrySynced {
                    external_id: record.external_id,
                    entry_id: *entry_id,
                    created,
                })
                .await;
        }
        Ok(outcome)
    }

    /// Applies each record independently; one bad record never aborts the
    /// poll. The report carries counts plus collected per-record errors.
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub async fn sync_batch(
        &self,
        records: Vec<ExternalCostingRecord>,
    ) -> Result<SyncReport, ServiceError> {
        let mut report = SyncReport::default();
        for record in records {
            let external_id = record.external_id.clone();
            match self.sync_record(record).await {
                Ok(SyncOutcome::Created { .. }) => report.created += 1,
                Ok(SyncOutcome::Updated { .. }) => report.updated += 1,
                Ok(SyncOutcome::Skipped { .. }) => report.skipped += 1,
                Err(err) => report.errors.push(format!("{external_id}: {err}")),
            }
        }
        Ok(report)
    }
}
