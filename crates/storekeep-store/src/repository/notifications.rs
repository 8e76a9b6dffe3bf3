//! # Notification Repository
//!
//! Store operations for the live alert set.
//!
//! ## The Keyed Dedup Lookup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │            How the Deriver Finds an Existing Alert                      │
//! │                                                                         │
//! │  Stock changed for item "3f2c..." → class is LowStock                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  find_stock_alert("3f2c...", LowStock)                                 │
//! │       │                                                                 │
//! │       ├── Some(alert) → refresh message in place (no new record)       │
//! │       │                                                                 │
//! │       └── None → insert a new alert                                    │
//! │                                                                         │
//! │  The collection itself is the dedup set: one live record per           │
//! │  (subject_item_id, kind). No derived state to drift out of sync.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use super::{scoped, TypedCollection, TypedStream, Versioned};
use crate::document::{Direction, DocumentStore, Op, Query};
use crate::error::StoreResult;
use storekeep_core::{Notification, NotificationKind};

/// Repository for notification records.
#[derive(Clone)]
pub struct NotificationRepository {
    collection: TypedCollection<Notification>,
}

impl NotificationRepository {
    /// Creates a repository bound to one owner's notifications.
    pub fn new(store: Arc<dyn DocumentStore>, owner: &str) -> Self {
        NotificationRepository {
            collection: TypedCollection::new(store, scoped(owner, "notifications")),
        }
    }

    /// Inserts a new notification.
    pub async fn insert(&self, notification: &Notification) -> StoreResult<()> {
        debug!(
            id = %notification.id,
            kind = ?notification.kind,
            "Inserting notification"
        );
        self.collection.create(&notification.id, notification).await?;
        Ok(())
    }

    /// Gets a notification by id.
    pub async fn get(&self, id: &str) -> StoreResult<Option<Versioned<Notification>>> {
        self.collection.get(id).await
    }

    /// All notifications, newest first.
    pub async fn list(&self) -> StoreResult<Vec<Notification>> {
        self.collection
            .query(Query::new().order_by("emitted_at", Direction::Descending))
            .await
    }

    /// Unread notifications, newest first.
    pub async fn unread(&self) -> StoreResult<Vec<Notification>> {
        self.collection
            .query(
                Query::new()
                    .filter("read", Op::Eq, json!(false))
                    .order_by("emitted_at", Direction::Descending),
            )
            .await
    }

    /// Number of unread notifications.
    pub async fn unread_count(&self) -> StoreResult<usize> {
        Ok(self.unread().await?.len())
    }

    /// The live stock alert for (item, kind), if one exists.
    ///
    /// This is the dedup lookup: at most one record matches by invariant.
    pub async fn find_stock_alert(
        &self,
        item_id: &str,
        kind: NotificationKind,
    ) -> StoreResult<Option<Notification>> {
        let mut matches = self
            .collection
            .query(
                Query::new()
                    .filter("subject_item_id", Op::Eq, json!(item_id))
                    .filter("kind", Op::Eq, json!(kind))
                    .limit(1),
            )
            .await?;
        Ok(matches.pop())
    }

    /// All live stock alerts about an item (both LowStock and OutOfStock).
    ///
    /// Used when an item recovers or is removed and its alerts retire.
    pub async fn stock_alerts_for_item(&self, item_id: &str) -> StoreResult<Vec<Notification>> {
        let all = self
            .collection
            .query(Query::new().filter("subject_item_id", Op::Eq, json!(item_id)))
            .await?;
        // Success/info toasts may reference the same item; only alerts retire
        Ok(all.into_iter().filter(|n| n.kind.is_stock_alert()).collect())
    }

    /// Refreshes an alert's message and timestamp in place.
    ///
    /// A merge, not a replace: the read flag survives, so an operator who
    /// saw "3 remaining" isn't re-notified when it becomes "2 remaining".
    pub async fn refresh(
        &self,
        id: &str,
        message: &str,
        emitted_at: chrono::DateTime<chrono::Utc>,
    ) -> StoreResult<()> {
        debug!(id = %id, "Refreshing notification message");
        self.collection
            .merge(id, json!({ "message": message, "emitted_at": emitted_at }))
            .await
    }

    /// Marks one notification read.
    pub async fn mark_read(&self, id: &str) -> StoreResult<()> {
        self.collection.merge(id, json!({ "read": true })).await
    }

    /// Marks every unread notification read. Returns how many changed.
    pub async fn mark_all_read(&self) -> StoreResult<usize> {
        let unread = self.unread().await?;
        let count = unread.len();
        for notification in unread {
            self.collection
                .merge(&notification.id, json!({ "read": true }))
                .await?;
        }
        Ok(count)
    }

    /// Deletes a notification (idempotent).
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        self.collection.delete(id).await
    }

    /// Deletes every notification. Returns how many were removed.
    pub async fn clear_all(&self) -> StoreResult<usize> {
        let all = self.collection.query(Query::new()).await?;
        let count = all.len();
        for notification in all {
            self.collection.delete(&notification.id).await?;
        }
        Ok(count)
    }

    /// Subscribes to the notification set, newest first.
    pub async fn watch(&self) -> StoreResult<TypedStream<Notification>> {
        self.collection
            .subscribe(Query::new().order_by("emitted_at", Direction::Descending))
            .await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use chrono::{TimeZone, Utc};

    fn alert(id: &str, kind: NotificationKind, item_id: &str, hour: u32) -> Notification {
        Notification {
            id: id.to_string(),
            kind,
            subject_item_id: Some(item_id.to_string()),
            title: "Low Stock Alert".to_string(),
            message: "running low".to_string(),
            emitted_at: Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap(),
            read: false,
        }
    }

    #[tokio::test]
    async fn test_find_stock_alert_by_key() {
        let store = Arc::new(MemoryStore::new());
        let repo = NotificationRepository::new(store, "u1");
        repo.insert(&alert("n1", NotificationKind::LowStock, "itm-1", 9))
            .await
            .unwrap();
        repo.insert(&alert("n2", NotificationKind::OutOfStock, "itm-2", 9))
            .await
            .unwrap();

        let found = repo
            .find_stock_alert("itm-1", NotificationKind::LowStock)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "n1");

        // Same item, other kind: no match
        assert!(repo
            .find_stock_alert("itm-1", NotificationKind::OutOfStock)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_stock_alerts_for_item_excludes_toasts() {
        let store = Arc::new(MemoryStore::new());
        let repo = NotificationRepository::new(store, "u1");
        repo.insert(&alert("n1", NotificationKind::LowStock, "itm-1", 9))
            .await
            .unwrap();
        // A success toast about the same item must not retire with alerts
        repo.insert(&alert("n2", NotificationKind::Success, "itm-1", 10))
            .await
            .unwrap();

        let alerts = repo.stock_alerts_for_item("itm-1").await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].id, "n1");
    }

    #[tokio::test]
    async fn test_refresh_preserves_read_flag() {
        let store = Arc::new(MemoryStore::new());
        let repo = NotificationRepository::new(store, "u1");
        repo.insert(&alert("n1", NotificationKind::LowStock, "itm-1", 9))
            .await
            .unwrap();
        repo.mark_read("n1").await.unwrap();

        let later = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        repo.refresh("n1", "2 remaining", later).await.unwrap();

        let refreshed = repo.get("n1").await.unwrap().unwrap().value;
        assert_eq!(refreshed.message, "2 remaining");
        assert_eq!(refreshed.emitted_at, later);
        assert!(refreshed.read);
    }

    #[tokio::test]
    async fn test_unread_count_and_mark_all_read() {
        let store = Arc::new(MemoryStore::new());
        let repo = NotificationRepository::new(store, "u1");
        repo.insert(&alert("n1", NotificationKind::LowStock, "itm-1", 9))
            .await
            .unwrap();
        repo.insert(&alert("n2", NotificationKind::OutOfStock, "itm-2", 10))
            .await
            .unwrap();
        repo.mark_read("n1").await.unwrap();

        assert_eq!(repo.unread_count().await.unwrap(), 1);

        let changed = repo.mark_all_read().await.unwrap();
        assert_eq!(changed, 1);
        assert_eq!(repo.unread_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_newest_first_and_clear_all() {
        let store = Arc::new(MemoryStore::new());
        let repo = NotificationRepository::new(store, "u1");
        repo.insert(&alert("n1", NotificationKind::LowStock, "itm-1", 9))
            .await
            .unwrap();
        repo.insert(&alert("n2", NotificationKind::OutOfStock, "itm-2", 11))
            .await
            .unwrap();
        repo.insert(&alert("n3", NotificationKind::LowStock, "itm-3", 10))
            .await
            .unwrap();

        let ids: Vec<String> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec!["n2", "n3", "n1"]);

        assert_eq!(repo.clear_all().await.unwrap(), 3);
        assert!(repo.list().await.unwrap().is_empty());
    }
}
