//! Job code record management: creation (with code minting), lookups, and
//! interactive edits. CRM-sourced codes reject edits here; the CRM is the
//! authority for them.

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{money, CodeSource, CostingSummary, JobCode, JobNature, JobStatus};
use crate::services::registry::{parse_code, CodeRegistry};
use crate::store::{
    collections, from_document, to_document, DocumentStore, Filter, OrderBy, StoreError, WriteOp,
};

/// Upper bound on minting retries when generated numbers land on codes
/// already occupied by explicit (CRM) creations or re-keys.
const MINT_ATTEMPTS: u32 = 32;

#[derive(Debug, Clone)]
pub struct NewJobCode {
    pub company_prefix: String,
    pub job_nature: JobNature,
    /// Explicit code, used by CRM imports. Manual creation leaves this unset
    /// and lets the registry mint the next number.
    pub code: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    pub currency: String,
    pub quoted_value: Decimal,
    pub source: CodeSource,
}

#[derive(Debug, Clone, Default)]
pub struct JobCodePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    pub status: Option<JobStatus>,
    pub currency: Option<String>,
    pub quoted_value: Option<Decimal>,
}

#[derive(Debug, Clone, Default)]
pub struct JobCodeListFilter {
    pub company_prefix: Option<String>,
    pub status: Option<JobStatus>,
}

pub struct JobCodeService {
    store: Arc<dyn DocumentStore>,
    registry: Arc<CodeRegistry>,
    events: EventSender,
}

impl JobCodeService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        registry: Arc<CodeRegistry>,
        events: EventSender,
    ) -> Self {
        Self {
            store,
            registry,
            events,
        }
    }

    #[instrument(skip(self, input), fields(prefix = %input.company_prefix))]
    pub async fn create(&self, input: NewJobCode) -> Result<JobCode, ServiceError> {
        if input.title.trim().is_empty() {
            return Err(ServiceError::validation("title is required"));
        }
        let quoted_value = money::to_minor_units(input.quoted_value)?;

        let explicit = input.code.clone();
        let now = Utc::now();
        let mut job = JobCode {
            code: String::new(),
            company_prefix: input.company_prefix,
            job_nature: input.job_nature,
            running_number: 0,
            title: input.title,
            description: input.description,
            client_id: input.client_id,
            client_name: input.client_name,
            status: JobStatus::Active,
            currency: input.currency,
            quoted_value,
            costing_summary: CostingSummary::default(),
            linked_pos: Vec::new(),
            linked_pis: Vec::new(),
            total_po_value: 0,
            total_pi_value: 0,
            gross_margin: 0,
            gross_margin_percentage: 0.0,
            source: input.source,
            created_at: now,
            updated_at: now,
        };

        match explicit {
            Some(code) => {
                let violations = self.registry.validate(&code).await?;
                if !violations.is_empty() {
                    let detail: Vec<String> =
                        violations.iter().map(|v| v.to_string()).collect();
                    return Err(ServiceError::Validation(detail.join("; ")));
                }
                let parts = parse_code(&code)?;
                if parts.company_prefix != job.company_prefix
                    || parts.job_nature != job.job_nature
                {
                    return Err(ServiceError::validation(format!(
                        "code '{code}' does not match the requested prefix/nature"
                    )));
                }
                job.running_number = parts.running_number;
                job.code = code;
                if !self.insert_new(&job).await? {
                    return Err(ServiceError::conflict(format!(
                        "job code '{}' already exists",
                        job.code
                    )));
                }
            }
            None => {
                // A minted number can land on a code occupied by an explicit
                // creation or an earlier re-key; each retry advances the
                // counter past it.
                let mut stored = false;
                for _ in 0..MINT_ATTEMPTS {
                    let code = self
                        .registry
                        .generate(&job.company_prefix, job.job_nature)
                        .await?;
                    let parts = parse_code(&code)?;
                    job.running_number = parts.running_number;
                    job.code = code;
                    if self.insert_new(&job).await? {
                        stored = true;
                        break;
                    }
                }
                if !stored {
                    return Err(ServiceError::Internal(format!(
                        "no free running number found for {}-{} after {MINT_ATTEMPTS} attempts",
                        job.company_prefix,
                        job.job_nature.code()
                    )));
                }
            }
        }

        info!(code = %job.code, "job code created");
        self.events
            .send(Event::JobCodeCreated {
                code: job.code.clone(),
            })
            .await;
        Ok(job)
    }

    /// Stores a brand-new job document, refusing to clobber an existing one.
    /// Returns `false` when the code is already taken.
    async fn insert_new(&self, job: &JobCode) -> Result<bool, ServiceError> {
        match self
            .store
            .run_transaction(vec![
                WriteOp::require_not_exists(collections::JOB_CODES, &job.code),
                WriteOp::put(collections::JOB_CODES, &job.code, to_document(job)?),
            ])
            .await
        {
            Ok(()) => Ok(true),
            Err(StoreError::PreconditionFailed(_)) => Ok(false),
            Err(other) => Err(other.into()),
        }
    }

    pub async fn get(&self, code: &str) -> Result<JobCode, ServiceError> {
        let doc = self
            .store
            .get(collections::JOB_CODES, code)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("job code '{code}'")))?;
        Ok(from_document(doc)?)
    }

    pub async fn list(&self, filter: JobCodeListFilter) -> Result<Vec<JobCode>, ServiceError> {
        let mut filters = Vec::new();
        if let Some(prefix) = &filter.company_prefix {
            filters.push(Filter::eq("company_prefix", json!(prefix)));
        }
        if let Some(status) = &filter.status {
            filters.push(Filter::eq("status", json!(status)));
        }
        let docs = self
            .store
            .query(
                collections::JOB_CODES,
                &filters,
                Some(&OrderBy::asc("created_at")),
            )
            .await?;
        docs.into_iter()
            .map(|doc| from_document(doc).map_err(ServiceError::from))
            .collect()
    }

    /// Interactive edit of non-derived fields. Derived financials are owned
    /// by the rollup engine and cannot be hand-edited through any surface.
    #[instrument(skip(self, patch))]
    pub async fn edit(&self, code: &str, patch: JobCodePatch) -> Result<JobCode, ServiceError> {
        let mut job = self.get(code).await?;
        if !job.is_editable() {
            return Err(ServiceError::conflict(format!(
                "job code '{code}' is CRM-sourced and immutable to interactive edits"
            )));
        }

        if let Some(title) = patch.title {
            if title.trim().is_empty() {
                return Err(ServiceError::validation("title is required"));
            }
            job.title = title;
        }
        if let Some(description) = patch.description {
            job.description = Some(description);
        }
        if let Some(client_id) = patch.client_id {
            job.client_id = Some(client_id);
        }
        if let Some(client_name) = patch.client_name {
            job.client_name = Some(client_name);
        }
        if let Some(status) = patch.status {
            job.status = status;
        }
        if let Some(currency) = patch.currency {
            job.currency = currency;
        }
        if let Some(quoted) = patch.quoted_value {
            job.quoted_value = money::to_minor_units(quoted)?;
        }
        job.updated_at = Utc::now();

        // Guard against the document having been re-keyed underneath us.
        self.store
            .run_transaction(vec![
                WriteOp::require_exists(collections::JOB_CODES, code),
                WriteOp::put(collections::JOB_CODES, code, to_document(&job)?),
            ])
            .await
            .map_err(|e| match e {
                StoreError::PreconditionFailed(_) => {
                    ServiceError::NotFound(format!("job code '{code}'"))
                }
                other => other.into(),
            })?;

        self.events
            .send(Event::JobCodeUpdated {
                code: code.to_string(),
            })
            .await;
        Ok(job)
    }
}
