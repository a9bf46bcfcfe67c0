use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

/// Pre-cost entries are estimated/committed costs; post-cost entries are
/// actuals recorded after the fact.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CostType {
    Pre,
    Post,
}

/// Fixed cost category letters. Their business meaning is configured at the
/// presentation layer; the engine only groups by them.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    ToSchema,
)]
pub enum CostCategory {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ApprovalStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    /// Approved and rejected are terminal; an entry transitions into one of
    /// them exactly once.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ApprovalStatus::Approved | ApprovalStatus::Rejected)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntrySource {
    Manual,
    External,
}

/// One recorded cost or payment event against a job code. All amount fields
/// are non-negative integer minor units; `balance_payable` is maintained at
/// write time, never derived lazily from a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostingEntry {
    pub id: Uuid,
    pub job_code: String,
    pub cost_type: CostType,
    pub category: CostCategory,
    pub description: Option<String>,
    pub amount: i64,
    pub amount_paid: i64,
    pub balance_payable: i64,
    pub unit_rate: Option<i64>,
    pub approval_status: ApprovalStatus,
    pub assigned_approver_id: Option<String>,
    pub remarks: Option<String>,
    pub rejection_reason: Option<String>,
    /// Approver (or rejector) who made the terminal decision.
    pub decided_by: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub source: EntrySource,
    /// Origin system name for externally-synced entries.
    pub source_origin: Option<String>,
    /// Stable identifier supplied by the external source; upsert key for
    /// repeated presentations of the same record.
    pub external_ref: Option<String>,
    /// Set when this entry re-submits the work of a rejected entry.
    pub resubmission_of: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn terminal_states() {
        assert!(!ApprovalStatus::Draft.is_terminal());
        assert!(!ApprovalStatus::Pending.is_terminal());
        assert!(ApprovalStatus::Approved.is_terminal());
        assert!(ApprovalStatus::Rejected.is_terminal());
    }

    #[test]
    fn cost_type_parses_wire_values() {
        assert_eq!(CostType::from_str("pre").unwrap(), CostType::Pre);
        assert_eq!(CostType::from_str("POST").unwrap(), CostType::Post);
        assert!(CostType::from_str("mid").is_err());
    }

    #[test]
    fn category_parses_single_letters_only() {
        assert_eq!(CostCategory::from_str("A").unwrap(), CostCategory::A);
        assert_eq!(CostCategory::from_str("H").unwrap(), CostCategory::H);
        assert!(CostCategory::from_str("I").is_err());
        assert!(CostCategory::from_str("").is_err());
    }

    #[test]
    fn statuses_serialize_snake_case() {
        assert_eq!(
            serde_json::to_value(ApprovalStatus::Pending).unwrap(),
            serde_json::json!("pending")
        );
        assert_eq!(ApprovalStatus::Pending.to_string(), "pending");
    }
}
