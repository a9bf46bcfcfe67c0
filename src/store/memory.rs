//! In-memory [`DocumentStore`] implementation.
//!
//! Backs the default server profile and the test suite. Collections are
//! dashmap shards; a single async write lock serializes every mutation so
//! transactions and increments observe a consistent snapshot, and a broadcast
//! channel per collection carries the change feed.

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};

use super::{
    compare_values, field_value, ChangeEvent, DocumentStore, Filter, Guard, OrderBy, StoreError,
    WriteOp,
};
use async_trait::async_trait;

const CHANGE_FEED_CAPACITY: usize = 256;

pub struct MemoryStore {
    collections: DashMap<String, DashMap<String, Value>>,
    channels: DashMap<String, broadcast::Sender<ChangeEvent>>,
    write_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
            channels: DashMap::new(),
            write_lock: Mutex::new(()),
        }
    }

    fn sender(&self, collection: &str) -> broadcast::Sender<ChangeEvent> {
        self.channels
            .entry(collection.to_string())
            .or_insert_with(|| broadcast::channel(CHANGE_FEED_CAPACITY).0)
            .clone()
    }

    fn publish(&self, collection: &str, id: &str, doc: Option<Value>) {
        if let Some(sender) = self.channels.get(collection) {
            // No receivers is fine; the feed is best-effort.
            let _ = sender.send(ChangeEvent {
                collection: collection.to_string(),
                id: id.to_string(),
                doc,
            });
        }
    }

    fn read_doc(&self, collection: &str, id: &str) -> Option<Value> {
        self.collections
            .get(collection)
            .and_then(|col| col.get(id).map(|doc| doc.clone()))
    }

    fn write_doc(&self, collection: &str, id: &str, doc: Value) {
        self.collections
            .entry(collection.to_string())
            .or_insert_with(DashMap::new)
            .insert(id.to_string(), doc);
    }

    fn check_guard(&self, collection: &str, id: &str, guard: &Guard) -> Result<(), StoreError> {
        let doc = self.read_doc(collection, id);
        match guard {
            Guard::Exists => {
                if doc.is_none() {
                    return Err(StoreError::PreconditionFailed(format!(
                        "{collection}/{id} does not exist"
                    )));
                }
            }
            Guard::NotExists => {
                if doc.is_some() {
                    return Err(StoreError::PreconditionFailed(format!(
                        "{collection}/{id} already exists"
                    )));
                }
            }
            Guard::FieldEquals { field, value } => {
                let doc = doc.ok_or_else(|| {
                    StoreError::PreconditionFailed(format!("{collection}/{id} does not exist"))
                })?;
                let actual = field_value(&doc, field).cloned().unwrap_or(Value::Null);
                if actual != *value {
                    return Err(StoreError::PreconditionFailed(format!(
                        "{collection}/{id}.{field} is {actual}, expected {value}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn apply_increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        by: i64,
    ) -> Result<(i64, Value), StoreError> {
        let mut doc = self
            .read_doc(collection, id)
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        let current = field_value(&doc, field).and_then(Value::as_i64).unwrap_or(0);
        let next = current.checked_add(by).ok_or_else(|| {
            StoreError::Backend(format!("counter overflow on {collection}/{id}.{field}"))
        })?;
        set_path(&mut doc, field, Value::from(next))?;
        self.write_doc(collection, id, doc.clone());
        Ok((next, doc))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes `value` at a dotted path, creating intermediate objects as needed.
fn set_path(doc: &mut Value, path: &str, value: Value) -> Result<(), StoreError> {
    let mut current = doc;
    let segments: Vec<&str> = path.split('.').collect();
    for (i, segment) in segments.iter().enumerate() {
        let obj = current
            .as_object_mut()
            .ok_or_else(|| StoreError::Serde(format!("field path {path} crosses a non-object")))?;
        if i == segments.len() - 1 {
            obj.insert(segment.to_string(), value);
            return Ok(());
        }
        current = obj
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read_doc(collection, id))
    }

    async fn query(
        &self,
        collection: &str,
        filters: &[Filter],
        order: Option<&OrderBy>,
    ) -> Result<Vec<Value>, StoreError> {
        let mut results: Vec<Value> = match self.collections.get(collection) {
            Some(col) => col
                .iter()
                .filter(|entry| filters.iter().all(|f| f.matches(entry.value())))
                .map(|entry| entry.value().clone())
                .collect(),
            None => Vec::new(),
        };

        if let Some(order) = order {
            results.sort_by(|a, b| {
                let av = field_value(a, &order.field).unwrap_or(&Value::Null);
                let bv = field_value(b, &order.field).unwrap_or(&Value::Null);
                let ord = compare_values(av, bv).unwrap_or(std::cmp::Ordering::Equal);
                if order.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }

        Ok(results)
    }

    async fn put(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError> {
        if !doc.is_object() {
            return Err(StoreError::Serde(format!(
                "document {collection}/{id} must be a JSON object"
            )));
        }
        let _guard = self.write_lock.lock().await;
        self.write_doc(collection, id, doc.clone());
        self.publish(collection, id, Some(doc));
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: serde_json::Map<String, Value>,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self
            .read_doc(collection, id)
            .ok_or_else(|| StoreError::NotFound(collection.to_string(), id.to_string()))?;
        for (path, value) in fields {
            set_path(&mut doc, &path, value)?;
        }
        self.write_doc(collection, id, doc.clone());
        self.publish(collection, id, Some(doc));
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let removed = self
            .collections
            .get(collection)
            .and_then(|col| col.remove(id));
        if removed.is_some() {
            self.publish(collection, id, None);
        }
        Ok(())
    }

    async fn atomic_increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        by: i64,
    ) -> Result<i64, StoreError> {
        let _guard = self.write_lock.lock().await;
        let (next, doc) = self.apply_increment(collection, id, field, by)?;
        self.publish(collection, id, Some(doc));
        Ok(next)
    }

    async fn run_transaction(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        // Validation phase: nothing is written until every guard holds and
        // every targeted document is writable.
        for op in &ops {
            match op {
                WriteOp::Precondition {
                    collection,
                    id,
                    guard,
                } => self.check_guard(collection, id, guard)?,
                WriteOp::Update { collection, id, .. } => {
                    if self.read_doc(collection, id).is_none() {
                        return Err(StoreError::NotFound(collection.clone(), id.clone()));
                    }
                }
                WriteOp::Put { collection, id, doc } => {
                    if !doc.is_object() {
                        return Err(StoreError::Serde(format!(
                            "document {collection}/{id} must be a JSON object"
                        )));
                    }
                }
                WriteOp::Delete { .. } | WriteOp::Increment { .. } => {}
            }
        }

        // Apply phase. The write lock is held throughout, so other writers
        // never interleave with the batch. Reads take no lock and may observe
        // a batch mid-application.
        let mut changes: Vec<(String, String, Option<Value>)> = Vec::new();
        for op in ops {
            match op {
                WriteOp::Precondition { .. } => {}
                WriteOp::Put { collection, id, doc } => {
                    self.write_doc(&collection, &id, doc.clone());
                    changes.push((collection, id, Some(doc)));
                }
                WriteOp::Update {
                    collection,
                    id,
                    fields,
                } => {
                    let mut doc = self
                        .read_doc(&collection, &id)
                        .ok_or_else(|| StoreError::NotFound(collection.clone(), id.clone()))?;
                    for (path, value) in fields {
                        set_path(&mut doc, &path, value)?;
                    }
                    self.write_doc(&collection, &id, doc.clone());
                    changes.push((collection, id, Some(doc)));
                }
                WriteOp::Delete { collection, id } => {
                    let removed = self
                        .collections
                        .get(&collection)
                        .and_then(|col| col.remove(&id));
                    if removed.is_some() {
                        changes.push((collection, id, None));
                    }
                }
                WriteOp::Increment {
                    collection,
                    id,
                    field,
                    by,
                } => {
                    let (_, doc) = self.apply_increment(&collection, &id, &field, by)?;
                    changes.push((collection, id, Some(doc)));
                }
            }
        }

        for (collection, id, doc) in changes {
            self.publish(&collection, &id, doc);
        }
        Ok(())
    }

    fn subscribe(&self, collection: &str) -> broadcast::Receiver<ChangeEvent> {
        self.sender(collection).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FilterOp;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn put_get_roundtrip() {
        let store = MemoryStore::new();
        store
            .put("job_codes", "FS-S1", json!({"code": "FS-S1", "title": "Fitout"}))
            .await
            .unwrap();
        let doc = store.get("job_codes", "FS-S1").await.unwrap().unwrap();
        assert_eq!(doc["title"], "Fitout");
        assert!(store.get("job_codes", "FS-S2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn query_filters_and_orders() {
        let store = MemoryStore::new();
        for (id, status, at) in [
            ("a", "pending", "2026-01-02T00:00:00Z"),
            ("b", "approved", "2026-01-01T00:00:00Z"),
            ("c", "pending", "2026-01-01T00:00:00Z"),
        ] {
            store
                .put(
                    "costing_entries",
                    id,
                    json!({"id": id, "approval_status": status, "submitted_at": at}),
                )
                .await
                .unwrap();
        }

        let pending = store
            .query(
                "costing_entries",
                &[Filter::eq("approval_status", json!("pending"))],
                Some(&OrderBy::asc("submitted_at")),
            )
            .await
            .unwrap();
        let ids: Vec<&str> = pending.iter().map(|d| d["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[tokio::test]
    async fn concurrent_increments_never_collide() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.atomic_increment("counters", "FS:S", "next", 1).await
            }));
        }
        let mut seen = std::collections::HashSet::new();
        for handle in handles {
            let value = handle.await.unwrap().unwrap();
            assert!(seen.insert(value), "duplicate counter value {value}");
        }
        assert_eq!(seen.len(), 64);
        assert_eq!(
            store.get("counters", "FS:S").await.unwrap().unwrap()["next"],
            json!(64)
        );
    }

    #[tokio::test]
    async fn failed_precondition_applies_nothing() {
        let store = MemoryStore::new();
        store
            .put("costing_entries", "e1", json!({"approval_status": "approved"}))
            .await
            .unwrap();

        let err = store
            .run_transaction(vec![
                WriteOp::require_field("costing_entries", "e1", "approval_status", json!("pending")),
                WriteOp::update(
                    "costing_entries",
                    "e1",
                    json!({"approval_status": "rejected"})
                        .as_object()
                        .unwrap()
                        .clone(),
                ),
                WriteOp::increment("job_codes", "FS-S1", "pending", -1),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PreconditionFailed(_)));

        let doc = store.get("costing_entries", "e1").await.unwrap().unwrap();
        assert_eq!(doc["approval_status"], "approved");
        assert!(store.get("job_codes", "FS-S1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn not_exists_guard_blocks_overwrite() {
        let store = MemoryStore::new();
        store
            .put("job_codes", "FS-P2", json!({"code": "FS-P2", "source": "crm"}))
            .await
            .unwrap();

        let err = store
            .run_transaction(vec![
                WriteOp::require_not_exists("job_codes", "FS-P2"),
                WriteOp::put("job_codes", "FS-P2", json!({"code": "FS-P2", "source": "manual"})),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PreconditionFailed(_)));

        let doc = store.get("job_codes", "FS-P2").await.unwrap().unwrap();
        assert_eq!(doc["source"], "crm");

        store
            .run_transaction(vec![
                WriteOp::require_not_exists("job_codes", "FS-P3"),
                WriteOp::put("job_codes", "FS-P3", json!({"code": "FS-P3"})),
            ])
            .await
            .unwrap();
        assert!(store.get("job_codes", "FS-P3").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn transaction_increments_nested_fields() {
        let store = MemoryStore::new();
        store
            .put("job_codes", "FS-S1", json!({"costing_summary": {"pending_approval_count": 2}}))
            .await
            .unwrap();
        store
            .run_transaction(vec![WriteOp::increment(
                "job_codes",
                "FS-S1",
                "costing_summary.pending_approval_count",
                -1,
            )])
            .await
            .unwrap();
        let doc = store.get("job_codes", "FS-S1").await.unwrap().unwrap();
        assert_eq!(doc["costing_summary"]["pending_approval_count"], json!(1));
    }

    #[tokio::test]
    async fn subscription_sees_committed_writes() {
        let store = MemoryStore::new();
        let mut feed = store.subscribe("job_codes");
        store
            .put("job_codes", "FS-S1", json!({"code": "FS-S1"}))
            .await
            .unwrap();
        store.delete("job_codes", "FS-S1").await.unwrap();

        let created = feed.recv().await.unwrap();
        assert_eq!(created.id, "FS-S1");
        assert!(created.doc.is_some());
        let deleted = feed.recv().await.unwrap();
        assert!(deleted.doc.is_none());
    }

    #[tokio::test]
    async fn range_filters_compare_numbers() {
        let store = MemoryStore::new();
        store
            .put("purchase_orders", "p1", json!({"total_amount": 100_000}))
            .await
            .unwrap();
        let hits = store
            .query(
                "purchase_orders",
                &[Filter::new("total_amount", FilterOp::Gte, json!(50_000))],
                None,
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }
}
