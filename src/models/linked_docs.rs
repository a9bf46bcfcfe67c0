use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimal display fields cached on a job code for one linked PO or invoice.
/// These are denormalized pointers, not ownership; the synchronizer rebuilds
/// them from the `job_code` field on the documents themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedDocRef {
    pub id: String,
    pub number: String,
    pub counterparty: Option<String>,
    /// Document total in minor units.
    pub amount: i64,
}

/// Purchase order as seen by this engine: read-only except for the
/// `job_code` field rewrite during a re-key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: String,
    pub po_number: String,
    pub job_code: Option<String>,
    pub supplier_name: Option<String>,
    /// Order total in minor units.
    pub total_amount: i64,
    pub status: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PurchaseOrder {
    pub fn link_ref(&self) -> LinkedDocRef {
        LinkedDocRef {
            id: self.id.clone(),
            number: self.po_number.clone(),
            counterparty: self.supplier_name.clone(),
            amount: self.total_amount,
        }
    }
}

/// Cost invoice as seen by this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostInvoice {
    pub id: String,
    pub invoice_number: String,
    pub job_code: Option<String>,
    pub supplier_name: Option<String>,
    /// Invoice total in minor units.
    pub grand_total: i64,
    pub status: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CostInvoice {
    pub fn link_ref(&self) -> LinkedDocRef {
        LinkedDocRef {
            id: self.id.clone(),
            number: self.invoice_number.clone(),
            counterparty: self.supplier_name.clone(),
            amount: self.grand_total,
        }
    }
}
