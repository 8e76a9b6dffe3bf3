//! # Item Repository
//!
//! Store operations for catalog items.
//!
//! ## Key Operations
//! - CRUD through checked full-record replace
//! - Name-ordered listing
//! - Live catalog subscription
//!
//! ## Why No Merge Writes Here
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 Item Writes Are Always Checked                          │
//! │                                                                         │
//! │  quantity lives inside the kind variant. A top-level merge of          │
//! │  {"kind": ...} would replace the whole variant anyway, and a merge     │
//! │  of name/price while the ledger replaces the kind would race.          │
//! │                                                                         │
//! │  So every item write goes through replace_checked:                     │
//! │                                                                         │
//! │    read (item, version)                                                 │
//! │         │                                                               │
//! │    mutate the fields you own                                            │
//! │         │                                                               │
//! │    replace_checked(id, version, item) ──► VersionConflict? re-read     │
//! │                                                                         │
//! │  One write path, one conflict story, no partially-merged items.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use tracing::debug;

use super::{scoped, TypedCollection, TypedStream, Versioned};
use crate::document::{Direction, DocumentStore, Query};
use crate::error::StoreResult;
use storekeep_core::Item;

/// Repository for catalog item records.
///
/// ## Usage
/// ```rust,ignore
/// let repo = ItemRepository::new(store, "u1");
///
/// repo.insert(&item).await?;
/// let current = repo.get(&item.id).await?;
/// ```
#[derive(Clone)]
pub struct ItemRepository {
    collection: TypedCollection<Item>,
}

impl ItemRepository {
    /// Creates a repository bound to one owner's catalog.
    pub fn new(store: Arc<dyn DocumentStore>, owner: &str) -> Self {
        ItemRepository {
            collection: TypedCollection::new(store, scoped(owner, "items")),
        }
    }

    /// Inserts a new item record.
    pub async fn insert(&self, item: &Item) -> StoreResult<()> {
        debug!(id = %item.id, sku = %item.sku, "Inserting item");
        self.collection.create(&item.id, item).await?;
        Ok(())
    }

    /// Gets an item with the version needed for a checked write.
    ///
    /// ## Returns
    /// * `Ok(Some(Versioned<Item>))` - Item found
    /// * `Ok(None)` - Item not found
    pub async fn get(&self, id: &str) -> StoreResult<Option<Versioned<Item>>> {
        self.collection.get(id).await
    }

    /// Replaces an item under its version guard.
    ///
    /// ## Returns
    /// The new version; `VersionConflict` if the item changed since the
    /// caller's read.
    pub async fn replace_checked(
        &self,
        id: &str,
        expected_version: u64,
        item: &Item,
    ) -> StoreResult<u64> {
        debug!(id = %id, expected_version, "Replacing item");
        self.collection.replace_checked(id, expected_version, item).await
    }

    /// Removes an item record (idempotent).
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        debug!(id = %id, "Deleting item");
        self.collection.delete(id).await
    }

    /// Lists the whole catalog ordered by name.
    pub async fn list(&self) -> StoreResult<Vec<Item>> {
        self.collection
            .query(Query::new().order_by("name", Direction::Ascending))
            .await
    }

    /// Subscribes to the catalog: full name-ordered snapshot on every change.
    pub async fn watch(&self) -> StoreResult<TypedStream<Item>> {
        self.collection
            .subscribe(Query::new().order_by("name", Direction::Ascending))
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
    use chrono::Utc;
    use storekeep_core::ItemKind;

    fn item(id: &str, name: &str, quantity: i64) -> Item {
        Item {
            id: id.to_string(),
            name: name.to_string(),
            kind: ItemKind::Product {
                quantity,
                low_stock_threshold: 5,
            },
            category: "Drinks".to_string(),
            price_cents: 299,
            cost_cents: 120,
            sku: format!("SKU-{}", id),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_get_roundtrip() {
        let store = Arc::new(MemoryStore::new());
        let repo = ItemRepository::new(store, "u1");

        repo.insert(&item("a", "Cola", 10)).await.unwrap();

        let fetched = repo.get("a").await.unwrap().unwrap();
        assert_eq!(fetched.value.name, "Cola");
        assert_eq!(fetched.value.kind.quantity(), Some(10));
        assert_eq!(fetched.version, 1);
    }

    #[tokio::test]
    async fn test_replace_checked_conflict() {
        let store = Arc::new(MemoryStore::new());
        let repo = ItemRepository::new(store, "u1");
        repo.insert(&item("a", "Cola", 10)).await.unwrap();

        let current = repo.get("a").await.unwrap().unwrap();
        let mut updated = current.value.clone();
        updated.name = "Cola Zero".to_string();
        let new_version = repo
            .replace_checked("a", current.version, &updated)
            .await
            .unwrap();
        assert_eq!(new_version, 2);

        // Stale write loses
        let err = repo
            .replace_checked("a", current.version, &updated)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_list_orders_by_name() {
        let store = Arc::new(MemoryStore::new());
        let repo = ItemRepository::new(store, "u1");
        repo.insert(&item("a", "Tea", 1)).await.unwrap();
        repo.insert(&item("b", "Cola", 1)).await.unwrap();
        repo.insert(&item("c", "Soda", 1)).await.unwrap();

        let names: Vec<String> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["Cola", "Soda", "Tea"]);
    }

    #[tokio::test]
    async fn test_owner_scoping_isolates_catalogs() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let alpha = ItemRepository::new(Arc::clone(&store), "alpha");
        let beta = ItemRepository::new(store, "beta");

        alpha.insert(&item("a", "Cola", 10)).await.unwrap();

        assert!(alpha.get("a").await.unwrap().is_some());
        assert!(beta.get("a").await.unwrap().is_none());
        assert!(beta.list().await.unwrap().is_empty());
    }
}
