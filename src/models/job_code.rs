use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::EnumIter;
use utoipa::ToSchema;

use super::costing_entry::CostCategory;
use super::linked_docs::LinkedDocRef;

/// Fixed enumeration of job natures. The short code is the middle segment of
/// a job code string.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum JobNature {
    Product,
    ServiceSale,
    ServiceWork,
    Research,
}

impl JobNature {
    pub const fn code(&self) -> &'static str {
        match self {
            JobNature::Product => "P",
            JobNature::ServiceSale => "S",
            JobNature::ServiceWork => "SW",
            JobNature::Research => "R",
        }
    }

    pub const fn description(&self) -> &'static str {
        match self {
            JobNature::Product => "Product supply",
            JobNature::ServiceSale => "Service sale",
            JobNature::ServiceWork => "Service work order",
            JobNature::Research => "Research & development",
        }
    }

    /// Badge color used by dashboard clients.
    pub const fn display_color(&self) -> &'static str {
        match self {
            JobNature::Product => "#2f81f7",
            JobNature::ServiceSale => "#3fb950",
            JobNature::ServiceWork => "#d29922",
            JobNature::Research => "#a371f7",
        }
    }

    /// Natures in lexing order: longest code first, so `SW` is matched before
    /// `S` when parsing a code string.
    pub const fn lex_order() -> [JobNature; 4] {
        [
            JobNature::ServiceWork,
            JobNature::Product,
            JobNature::ServiceSale,
            JobNature::Research,
        ]
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::lex_order().into_iter().find(|n| n.code() == code)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Draft,
    Active,
    Completed,
    Cancelled,
}

/// Where a job code came from. CRM-sourced codes are owned by the external
/// CRM and are immutable to interactive edits.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CodeSource {
    Manual,
    Crm,
}

impl CodeSource {
    pub fn is_editable(&self) -> bool {
        matches!(self, CodeSource::Manual)
    }
}

/// Per-cost-type aggregation bucket. Amounts are integer minor units; the
/// by-category map is a BTreeMap so recomputed documents serialize
/// deterministically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBucket {
    pub total: i64,
    #[serde(default)]
    pub by_category: BTreeMap<CostCategory, i64>,
}

impl CostBucket {
    pub fn add(&mut self, category: CostCategory, amount: i64) {
        self.total += amount;
        *self.by_category.entry(category).or_insert(0) += amount;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostingSummary {
    pub pre_cost: CostBucket,
    pub post_cost: CostBucket,
    pub total_paid: i64,
    pub total_payable: i64,
    pub pending_approval_count: i64,
    pub pending_approval_amount: i64,
}

/// A unit of work, identified by its code string (`{prefix}-{nature}{n}`),
/// which is also its primary key in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCode {
    pub code: String,
    pub company_prefix: String,
    pub job_nature: JobNature,
    pub running_number: u32,
    pub title: String,
    pub description: Option<String>,
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    pub status: JobStatus,
    pub currency: String,
    /// Quoted value in minor units.
    pub quoted_value: i64,
    pub costing_summary: CostingSummary,
    /// Denormalized caches of "who points at me"; the source of truth is the
    /// `job_code` field on each PO/invoice document.
    pub linked_pos: Vec<LinkedDocRef>,
    pub linked_pis: Vec<LinkedDocRef>,
    // Derived fields, written only by the rollup engine.
    pub total_po_value: i64,
    pub total_pi_value: i64,
    pub gross_margin: i64,
    pub gross_margin_percentage: f64,
    pub source: CodeSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobCode {
    pub fn is_editable(&self) -> bool {
        self.source.is_editable()
    }
}
