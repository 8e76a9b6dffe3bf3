//! # In-Memory Document Store
//!
//! The reference [`DocumentStore`] implementation: a process-local store
//! with the exact semantics hosted backends must match. The test suites of
//! every crate in the workspace run against this.
//!
//! ## Internals
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         MemoryStore                                     │
//! │                                                                         │
//! │  RwLock<HashMap<collection, BTreeMap<id, (version, body)>>>            │
//! │       │                                                                 │
//! │       │ every successful write                                         │
//! │       ▼                                                                 │
//! │  broadcast::Sender<collection>  ──►  subscription tasks                │
//! │                                      │                                  │
//! │                                      ▼                                  │
//! │                             re-run query, push full snapshot           │
//! │                                                                         │
//! │  • BTreeMap keeps iteration deterministic                              │
//! │  • readers never block readers; writers hold the lock briefly          │
//! │  • subscribers that fall behind resync from current state              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, warn};

use crate::document::{Direction, DocumentStore, Filter, Op, Query, RecordStream, StoredRecord};
use crate::error::{StoreError, StoreResult};

/// Capacity of the per-subscription snapshot channel.
const SNAPSHOT_CHANNEL_CAPACITY: usize = 16;

/// Capacity of the internal change-signal channel.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// Storage
// =============================================================================

#[derive(Debug, Clone)]
struct VersionedRecord {
    version: u64,
    body: Value,
}

#[derive(Debug)]
struct StoreInner {
    collections: RwLock<HashMap<String, BTreeMap<String, VersionedRecord>>>,
    changes: broadcast::Sender<String>,
}

/// Process-local document store.
///
/// Cloning is cheap and shares the same underlying data, so a test (or an
/// engine plus its background tasks) can hold as many handles as it needs.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        MemoryStore {
            inner: Arc::new(StoreInner {
                collections: RwLock::new(HashMap::new()),
                changes,
            }),
        }
    }

    /// Number of records currently in a collection (for diagnostics).
    pub async fn count(&self, collection: &str) -> usize {
        let collections = self.inner.collections.read().await;
        collections.get(collection).map_or(0, |c| c.len())
    }

    /// Signals subscribers that a collection changed.
    fn notify(&self, collection: &str) {
        // No subscribers is fine; the send result is irrelevant then
        let _ = self.inner.changes.send(collection.to_string());
    }

    async fn snapshot(inner: &StoreInner, collection: &str, query: &Query) -> Vec<StoredRecord> {
        let collections = inner.collections.read().await;
        let records = match collections.get(collection) {
            Some(records) => records,
            None => return Vec::new(),
        };

        let mut results: Vec<StoredRecord> = records
            .iter()
            .filter(|(_, rec)| query.filters.iter().all(|f| matches_filter(&rec.body, f)))
            .map(|(id, rec)| StoredRecord {
                id: id.clone(),
                version: rec.version,
                body: rec.body.clone(),
            })
            .collect();

        if let Some(order) = &query.order_by {
            results.sort_by(|a, b| {
                let va = a.body.get(&order.field).unwrap_or(&Value::Null);
                let vb = b.body.get(&order.field).unwrap_or(&Value::Null);
                let ord = compare_values(va, vb);
                match order.direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit {
            results.truncate(limit);
        }

        results
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new()
    }
}

// =============================================================================
// Value Comparison
// =============================================================================

/// Total ordering over JSON values for filters and sorting.
///
/// Strings that both parse as RFC 3339 timestamps compare chronologically;
/// serialized timestamps vary in fractional-second precision, so a plain
/// lexical compare would mis-order them.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(sa), Value::String(sb)) => {
            match (
                DateTime::parse_from_rfc3339(sa),
                DateTime::parse_from_rfc3339(sb),
            ) {
                (Ok(ta), Ok(tb)) => ta.cmp(&tb),
                _ => sa.cmp(sb),
            }
        }
        (Value::Number(na), Value::Number(nb)) => {
            if let (Some(ia), Some(ib)) = (na.as_i64(), nb.as_i64()) {
                ia.cmp(&ib)
            } else {
                let fa = na.as_f64().unwrap_or(f64::NEG_INFINITY);
                let fb = nb.as_f64().unwrap_or(f64::NEG_INFINITY);
                fa.partial_cmp(&fb).unwrap_or(Ordering::Equal)
            }
        }
        (Value::Bool(ba), Value::Bool(bb)) => ba.cmp(bb),
        (Value::Null, Value::Null) => Ordering::Equal,
        // Mixed types: rank them so sorting stays total and deterministic
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn matches_filter(body: &Value, filter: &Filter) -> bool {
    let field_value = match body.get(&filter.field) {
        Some(v) => v,
        None => return false,
    };

    // Cross-type comparisons never match except through type ranking;
    // records written through the typed repositories keep types stable
    let ord = compare_values(field_value, &filter.value);
    match filter.op {
        Op::Eq => ord == Ordering::Equal,
        Op::Gt => ord == Ordering::Greater,
        Op::Gte => ord != Ordering::Less,
        Op::Lt => ord == Ordering::Less,
        Op::Lte => ord != Ordering::Greater,
    }
}

fn require_object(value: &Value) -> StoreResult<()> {
    if value.is_object() {
        Ok(())
    } else {
        Err(StoreError::NotAnObject)
    }
}

// =============================================================================
// DocumentStore Implementation
// =============================================================================

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, collection: &str, id: &str, body: Value) -> StoreResult<StoredRecord> {
        require_object(&body)?;

        {
            let mut collections = self.inner.collections.write().await;
            let records = collections.entry(collection.to_string()).or_default();
            if records.contains_key(id) {
                return Err(StoreError::already_exists(collection, id));
            }
            records.insert(
                id.to_string(),
                VersionedRecord {
                    version: 1,
                    body: body.clone(),
                },
            );
        }

        debug!(collection = %collection, id = %id, "Created record");
        self.notify(collection);

        Ok(StoredRecord {
            id: id.to_string(),
            version: 1,
            body,
        })
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<StoredRecord>> {
        let collections = self.inner.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|records| records.get(id))
            .map(|rec| StoredRecord {
                id: id.to_string(),
                version: rec.version,
                body: rec.body.clone(),
            }))
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> StoreResult<StoredRecord> {
        require_object(&patch)?;

        let result = {
            let mut collections = self.inner.collections.write().await;
            let record = collections
                .get_mut(collection)
                .and_then(|records| records.get_mut(id))
                .ok_or_else(|| StoreError::not_found(collection, id))?;

            if let (Some(body), Some(patch)) = (record.body.as_object_mut(), patch.as_object()) {
                for (key, value) in patch {
                    body.insert(key.clone(), value.clone());
                }
            }
            record.version += 1;

            StoredRecord {
                id: id.to_string(),
                version: record.version,
                body: record.body.clone(),
            }
        };

        debug!(collection = %collection, id = %id, version = result.version, "Merged record");
        self.notify(collection);
        Ok(result)
    }

    async fn update_checked(
        &self,
        collection: &str,
        id: &str,
        expected_version: u64,
        body: Value,
    ) -> StoreResult<StoredRecord> {
        require_object(&body)?;

        let result = {
            let mut collections = self.inner.collections.write().await;
            let record = collections
                .get_mut(collection)
                .and_then(|records| records.get_mut(id))
                .ok_or_else(|| StoreError::not_found(collection, id))?;

            if record.version != expected_version {
                return Err(StoreError::VersionConflict {
                    collection: collection.to_string(),
                    id: id.to_string(),
                    expected: expected_version,
                });
            }

            record.body = body;
            record.version += 1;

            StoredRecord {
                id: id.to_string(),
                version: record.version,
                body: record.body.clone(),
            }
        };

        debug!(collection = %collection, id = %id, version = result.version, "Replaced record");
        self.notify(collection);
        Ok(result)
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        let removed = {
            let mut collections = self.inner.collections.write().await;
            collections
                .get_mut(collection)
                .map_or(false, |records| records.remove(id).is_some())
        };

        if removed {
            debug!(collection = %collection, id = %id, "Deleted record");
            self.notify(collection);
        }

        Ok(())
    }

    async fn query(&self, collection: &str, query: Query) -> StoreResult<Vec<StoredRecord>> {
        Ok(Self::snapshot(&self.inner, collection, &query).await)
    }

    async fn subscribe(&self, collection: &str, query: Query) -> StoreResult<RecordStream> {
        let (tx, rx) = mpsc::channel(SNAPSHOT_CHANNEL_CAPACITY);
        let inner = self.inner.clone();
        let collection = collection.to_string();
        let mut changes = self.inner.changes.subscribe();

        tokio::spawn(async move {
            // Subscriptions fire immediately with current data
            let initial = MemoryStore::snapshot(&inner, &collection, &query).await;
            if tx.send(initial).await.is_err() {
                return;
            }

            loop {
                match changes.recv().await {
                    Ok(changed) if changed == collection => {
                        let snapshot = MemoryStore::snapshot(&inner, &collection, &query).await;
                        if tx.send(snapshot).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            collection = %collection,
                            skipped,
                            "Subscription lagged; resyncing from current state"
                        );
                        let snapshot = MemoryStore::snapshot(&inner, &collection, &query).await;
                        if tx.send(snapshot).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            debug!(collection = %collection, "Subscription ended");
        });

        Ok(RecordStream::new(rx))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    const COLL: &str = "users/u1/items";

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryStore::new();
        let created = store
            .create(COLL, "a", json!({"name": "Cola", "price": 299}))
            .await
            .unwrap();
        assert_eq!(created.version, 1);

        let fetched = store.get(COLL, "a").await.unwrap().unwrap();
        assert_eq!(fetched.body["name"], "Cola");
        assert_eq!(fetched.version, 1);

        assert!(store.get(COLL, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_duplicate_fails() {
        let store = MemoryStore::new();
        store.create(COLL, "a", json!({"v": 1})).await.unwrap();

        let err = store.create(COLL, "a", json!({"v": 2})).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_create_rejects_non_object() {
        let store = MemoryStore::new();
        let err = store.create(COLL, "a", json!([1, 2, 3])).await.unwrap_err();
        assert!(matches!(err, StoreError::NotAnObject));
    }

    #[tokio::test]
    async fn test_update_merges_top_level() {
        let store = MemoryStore::new();
        store
            .create(COLL, "a", json!({"name": "Cola", "read": false, "price": 299}))
            .await
            .unwrap();

        let updated = store.update(COLL, "a", json!({"read": true})).await.unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.body["read"], true);
        // Untouched keys survive the merge
        assert_eq!(updated.body["name"], "Cola");
        assert_eq!(updated.body["price"], 299);

        let err = store
            .update(COLL, "missing", json!({"read": true}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_checked_detects_stale_version() {
        let store = MemoryStore::new();
        store.create(COLL, "a", json!({"qty": 5})).await.unwrap();

        let replaced = store
            .update_checked(COLL, "a", 1, json!({"qty": 4}))
            .await
            .unwrap();
        assert_eq!(replaced.version, 2);
        assert_eq!(replaced.body["qty"], 4);

        // A writer holding the old version loses
        let err = store
            .update_checked(COLL, "a", 1, json!({"qty": 3}))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        // State reflects only the winning write
        let current = store.get(COLL, "a").await.unwrap().unwrap();
        assert_eq!(current.body["qty"], 4);
        assert_eq!(current.version, 2);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        store.create(COLL, "a", json!({"v": 1})).await.unwrap();

        store.delete(COLL, "a").await.unwrap();
        assert!(store.get(COLL, "a").await.unwrap().is_none());

        // Second delete succeeds silently
        store.delete(COLL, "a").await.unwrap();
        store.delete(COLL, "never-existed").await.unwrap();
    }

    #[tokio::test]
    async fn test_query_filters_orders_and_limits() {
        let store = MemoryStore::new();
        for (id, status, total) in [
            ("o1", "pending", 500),
            ("o2", "completed", 1500),
            ("o3", "pending", 2500),
            ("o4", "pending", 1000),
        ] {
            store
                .create(COLL, id, json!({"status": status, "total_cents": total}))
                .await
                .unwrap();
        }

        let results = store
            .query(
                COLL,
                Query::new()
                    .filter("status", Op::Eq, json!("pending"))
                    .order_by("total_cents", Direction::Descending)
                    .limit(2),
            )
            .await
            .unwrap();

        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["o3", "o4"]);
    }

    #[tokio::test]
    async fn test_query_range_filters() {
        let store = MemoryStore::new();
        for (id, total) in [("a", 100), ("b", 200), ("c", 300)] {
            store
                .create(COLL, id, json!({"total_cents": total}))
                .await
                .unwrap();
        }

        let results = store
            .query(
                COLL,
                Query::new()
                    .filter("total_cents", Op::Gte, json!(200))
                    .filter("total_cents", Op::Lt, json!(300)),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "b");
    }

    #[tokio::test]
    async fn test_timestamp_ordering_handles_mixed_precision() {
        let store = MemoryStore::new();
        // Same instant family, different fractional precision: lexical
        // comparison would put "...T09:59:59.900Z" after "...T10:00:00Z"
        store
            .create(COLL, "early", json!({"at": "2026-03-01T09:59:59.900Z"}))
            .await
            .unwrap();
        store
            .create(COLL, "late", json!({"at": "2026-03-01T10:00:00Z"}))
            .await
            .unwrap();
        store
            .create(COLL, "middle", json!({"at": "2026-03-01T09:59:59.950+00:00"}))
            .await
            .unwrap();

        let results = store
            .query(COLL, Query::new().order_by("at", Direction::Ascending))
            .await
            .unwrap();

        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "middle", "late"]);
    }

    #[tokio::test]
    async fn test_subscribe_delivers_initial_and_updates() {
        let store = MemoryStore::new();
        store.create(COLL, "a", json!({"n": 1})).await.unwrap();

        let mut stream = store.subscribe(COLL, Query::new()).await.unwrap();

        let initial = timeout(Duration::from_secs(1), stream.recv())
            .await
            .expect("initial snapshot should arrive")
            .unwrap();
        assert_eq!(initial.len(), 1);

        store.create(COLL, "b", json!({"n": 2})).await.unwrap();

        let next = timeout(Duration::from_secs(1), stream.recv())
            .await
            .expect("change snapshot should arrive")
            .unwrap();
        assert_eq!(next.len(), 2);
    }

    #[tokio::test]
    async fn test_subscribe_ignores_other_collections() {
        let store = MemoryStore::new();
        let mut stream = store.subscribe(COLL, Query::new()).await.unwrap();

        // Drain the (empty) initial snapshot
        let initial = stream.recv().await.unwrap();
        assert!(initial.is_empty());

        store
            .create("users/u1/sales", "s1", json!({"n": 1}))
            .await
            .unwrap();
        store.create(COLL, "a", json!({"n": 1})).await.unwrap();

        // The only follow-up snapshot is for our collection's change
        let next = timeout(Duration::from_secs(1), stream.recv())
            .await
            .expect("snapshot should arrive")
            .unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].id, "a");
    }
}
