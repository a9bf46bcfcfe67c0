//! Document store abstraction.
//!
//! The engine treats its database as an external collaborator: a transactional
//! document store with query, atomic-increment, and change-subscription
//! capability. Every service in this crate depends on the [`DocumentStore`]
//! trait exclusively; nothing embeds backend-specific query syntax beyond the
//! filter/order primitives below.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use tokio::sync::broadcast;

pub mod memory;

pub use memory::MemoryStore;

/// Collection names used by the costing engine.
pub mod collections {
    pub const JOB_CODES: &str = "job_codes";
    pub const COSTING_ENTRIES: &str = "costing_entries";
    pub const PURCHASE_ORDERS: &str = "purchase_orders";
    pub const COST_INVOICES: &str = "cost_invoices";
    pub const COUNTERS: &str = "counters";
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("document {1} not found in {0}")]
    NotFound(String, String),

    #[error("transaction precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("document serialization error: {0}")]
    Serde(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// A single field predicate. Field names may be dotted paths into nested
/// objects (e.g. `costing_summary.pending_approval_count`).
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }
}

#[derive(Debug, Clone)]
pub struct OrderBy {
    pub field: String,
    pub ascending: bool,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: true,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: false,
        }
    }
}

/// Guard checked before a transaction applies any write.
#[derive(Debug, Clone)]
pub enum Guard {
    Exists,
    NotExists,
    FieldEquals { field: String, value: Value },
}

/// One write inside a transaction. Increments create the target document
/// when it does not exist yet, matching the standalone increment primitive.
#[derive(Debug, Clone)]
pub enum WriteOp {
    Put {
        collection: String,
        id: String,
        doc: Value,
    },
    Update {
        collection: String,
        id: String,
        fields: serde_json::Map<String, Value>,
    },
    Delete {
        collection: String,
        id: String,
    },
    Increment {
        collection: String,
        id: String,
        field: String,
        by: i64,
    },
    Precondition {
        collection: String,
        id: String,
        guard: Guard,
    },
}

impl WriteOp {
    pub fn put(collection: &str, id: &str, doc: Value) -> Self {
        WriteOp::Put {
            collection: collection.into(),
            id: id.into(),
            doc,
        }
    }

    pub fn update(collection: &str, id: &str, fields: serde_json::Map<String, Value>) -> Self {
        WriteOp::Update {
            collection: collection.into(),
            id: id.into(),
            fields,
        }
    }

    pub fn delete(collection: &str, id: &str) -> Self {
        WriteOp::Delete {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn increment(collection: &str, id: &str, field: &str, by: i64) -> Self {
        WriteOp::Increment {
            collection: collection.into(),
            id: id.into(),
            field: field.into(),
            by,
        }
    }

    pub fn require_exists(collection: &str, id: &str) -> Self {
        WriteOp::Precondition {
            collection: collection.into(),
            id: id.into(),
            guard: Guard::Exists,
        }
    }

    pub fn require_not_exists(collection: &str, id: &str) -> Self {
        WriteOp::Precondition {
            collection: collection.into(),
            id: id.into(),
            guard: Guard::NotExists,
        }
    }

    pub fn require_field(collection: &str, id: &str, field: &str, value: Value) -> Self {
        WriteOp::Precondition {
            collection: collection.into(),
            id: id.into(),
            guard: Guard::FieldEquals {
                field: field.into(),
                value,
            },
        }
    }
}

/// Change feed item published on every committed write.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub collection: String,
    pub id: String,
    /// Post-image of the document, or `None` for a delete.
    pub doc: Option<Value>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    async fn query(
        &self,
        collection: &str,
        filters: &[Filter],
        order: Option<&OrderBy>,
    ) -> Result<Vec<Value>, StoreError>;

    async fn put(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError>;

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: serde_json::Map<String, Value>,
    ) -> Result<(), StoreError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Strictly serialized per document; creates the counter document when
    /// absent. Returns the post-increment value. This is the only way shared
    /// counters are ever mutated.
    async fn atomic_increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        by: i64,
    ) -> Result<i64, StoreError>;

    /// All-or-nothing application of `ops`. Preconditions are checked before
    /// any write lands; a failed guard surfaces as
    /// [`StoreError::PreconditionFailed`] with no partial state. Atomicity is
    /// with respect to other writers; unsynchronized readers may observe a
    /// batch mid-application.
    async fn run_transaction(&self, ops: Vec<WriteOp>) -> Result<(), StoreError>;

    /// Real-time change feed for one collection.
    fn subscribe(&self, collection: &str) -> broadcast::Receiver<ChangeEvent>;
}

pub fn to_document<T: Serialize>(value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Serde(e.to_string()))
}

pub fn from_document<T: DeserializeOwned>(doc: Value) -> Result<T, StoreError> {
    serde_json::from_value(doc).map_err(|e| StoreError::Serde(e.to_string()))
}

/// Resolves a dotted field path inside a document.
pub(crate) fn field_value<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |acc, segment| acc.get(segment))
}

/// Ordering comparator used by filters and sorts. RFC 3339 strings compare as
/// timestamps so variable-precision fractional seconds order correctly.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => {
            match (
                DateTime::parse_from_rfc3339(x),
                DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(dx), Ok(dy)) => {
                    let (dx, dy): (DateTime<Utc>, DateTime<Utc>) = (dx.into(), dy.into());
                    Some(dx.cmp(&dy))
                }
                _ => Some(x.cmp(y)),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

impl Filter {
    pub(crate) fn matches(&self, doc: &Value) -> bool {
        let actual = field_value(doc, &self.field).unwrap_or(&Value::Null);
        match self.op {
            FilterOp::Eq => *actual == self.value,
            FilterOp::Ne => *actual != self.value,
            FilterOp::Gt => {
                matches!(compare_values(actual, &self.value), Some(Ordering::Greater))
            }
            FilterOp::Gte => matches!(
                compare_values(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lt => matches!(compare_values(actual, &self.value), Some(Ordering::Less)),
            FilterOp::Lte => matches!(
                compare_values(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_matches_nested_path() {
        let doc = json!({"costing_summary": {"pending_approval_count": 3}});
        let filter = Filter::eq("costing_summary.pending_approval_count", json!(3));
        assert!(filter.matches(&doc));

        let filter = Filter::new(
            "costing_summary.pending_approval_count",
            FilterOp::Gt,
            json!(5),
        );
        assert!(!filter.matches(&doc));
    }

    #[test]
    fn timestamps_compare_as_instants_not_strings() {
        // Lexicographic comparison would put the whole second after the
        // fractional one; timestamp comparison must not.
        let a = json!("2026-01-01T12:00:00Z");
        let b = json!("2026-01-01T12:00:00.100Z");
        assert_eq!(compare_values(&a, &b), Some(Ordering::Less));
    }

    #[test]
    fn missing_field_compares_as_null() {
        let doc = json!({"status": "draft"});
        assert!(!Filter::eq("approval_status", json!("pending")).matches(&doc));
        assert!(Filter::new("approval_status", FilterOp::Ne, json!("pending")).matches(&doc));
    }
}
