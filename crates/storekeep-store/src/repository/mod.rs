//! # Repository Module
//!
//! Typed, owner-scoped repositories over the document store.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  Repositories abstract store access behind a clean, typed API.          │
//! │                                                                         │
//! │  Engine operation                                                       │
//! │       │                                                                 │
//! │       │  repos.items().get("3f2c...")                                   │
//! │       │  ↓                                                              │
//! │       ▼                                                                 │
//! │  ItemRepository                                                         │
//! │  ├── insert(&self, item)                                                │
//! │  ├── get(&self, id) → Versioned<Item>                                   │
//! │  ├── replace_checked(&self, id, version, item)                          │
//! │  └── list(&self)                                                        │
//! │       │                                                                 │
//! │       │  JSON records in "users/{owner}/items"                          │
//! │       ▼                                                                 │
//! │  DocumentStore (memory, or a hosted backend)                            │
//! │                                                                         │
//! │  Benefits:                                                              │
//! │  • Collection paths and JSON codecs live in one place                  │
//! │  • Version plumbing for optimistic writes is explicit                  │
//! │  • Engine code never touches raw records                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`items::ItemRepository`] - Catalog records and stock fields
//! - [`sales::SaleRepository`] - Settled sales history
//! - [`orders::OrderRepository`] - Orders and their status writes
//! - [`notifications::NotificationRepository`] - Alert set and read flags
//! - [`counters::CounterRepository`] - Atomic order-number sequence

pub mod counters;
pub mod items;
pub mod notifications;
pub mod orders;
pub mod sales;

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::document::{DocumentStore, Query, RecordStream, StoredRecord};
use crate::error::StoreResult;

// =============================================================================
// Collection Scoping
// =============================================================================

/// Builds the owner-scoped collection path: `users/{owner}/{name}`.
///
/// Every record in the system lives under the authenticated owner; two
/// owners never see each other's collections.
pub fn scoped(owner: &str, name: &str) -> String {
    format!("users/{}/{}", owner, name)
}

// =============================================================================
// Versioned Values
// =============================================================================

/// A decoded record together with its store version.
///
/// The version is the token for `replace_checked`: read, mutate the value,
/// write back under the version you read.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

// =============================================================================
// Typed Collection
// =============================================================================

/// Serialization plumbing shared by all repositories: one domain type per
/// collection, JSON codec at the boundary, versions passed through.
pub struct TypedCollection<T> {
    store: Arc<dyn DocumentStore>,
    path: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedCollection<T> {
    fn clone(&self) -> Self {
        TypedCollection {
            store: Arc::clone(&self.store),
            path: self.path.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> TypedCollection<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Binds a domain type to a collection path.
    pub fn new(store: Arc<dyn DocumentStore>, path: String) -> Self {
        TypedCollection {
            store,
            path,
            _marker: PhantomData,
        }
    }

    /// The collection path this repository reads and writes.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Creates a record; fails if the id already exists.
    pub async fn create(&self, id: &str, value: &T) -> StoreResult<u64> {
        let body = serde_json::to_value(value)?;
        let record = self.store.create(&self.path, id, body).await?;
        Ok(record.version)
    }

    /// Reads one record with its version.
    pub async fn get(&self, id: &str) -> StoreResult<Option<Versioned<T>>> {
        match self.store.get(&self.path, id).await? {
            Some(record) => {
                let value = serde_json::from_value(record.body)?;
                Ok(Some(Versioned {
                    value,
                    version: record.version,
                }))
            }
            None => Ok(None),
        }
    }

    /// Full-record replace guarded by the version read earlier.
    ///
    /// ## Returns
    /// The new version on success; `VersionConflict` if another writer
    /// got there first.
    pub async fn replace_checked(
        &self,
        id: &str,
        expected_version: u64,
        value: &T,
    ) -> StoreResult<u64> {
        let body = serde_json::to_value(value)?;
        let record = self
            .store
            .update_checked(&self.path, id, expected_version, body)
            .await?;
        Ok(record.version)
    }

    /// Top-level merge of a partial JSON object into the record.
    ///
    /// Used only for fields no invariant depends on (read flags, message
    /// text); anything the ledger guards goes through `replace_checked`.
    pub async fn merge(&self, id: &str, patch: Value) -> StoreResult<()> {
        self.store.update(&self.path, id, patch).await?;
        Ok(())
    }

    /// Deletes a record (idempotent).
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        self.store.delete(&self.path, id).await
    }

    /// Runs a query, decoding each record.
    ///
    /// Records that fail to decode are logged and skipped so one corrupt
    /// record cannot take down every list in the app.
    pub async fn query(&self, query: Query) -> StoreResult<Vec<T>> {
        let records = self.store.query(&self.path, query).await?;
        Ok(decode_records(&self.path, records))
    }

    /// Subscribes to a query as a stream of decoded snapshots.
    pub async fn subscribe(&self, query: Query) -> StoreResult<TypedStream<T>> {
        let inner = self.store.subscribe(&self.path, query).await?;
        Ok(TypedStream {
            inner,
            path: self.path.clone(),
            _marker: PhantomData,
        })
    }
}

fn decode_records<T: DeserializeOwned>(path: &str, records: Vec<StoredRecord>) -> Vec<T> {
    records
        .into_iter()
        .filter_map(|record| match serde_json::from_value(record.body) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(
                    collection = %path,
                    id = %record.id,
                    error = %err,
                    "Skipping undecodable record"
                );
                None
            }
        })
        .collect()
}

// =============================================================================
// Typed Subscription Stream
// =============================================================================

/// A [`RecordStream`] that decodes every snapshot into domain values.
pub struct TypedStream<T> {
    inner: RecordStream,
    path: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> TypedStream<T> {
    /// Waits for the next decoded snapshot. None once the store closes.
    pub async fn recv(&mut self) -> Option<Vec<T>> {
        let records = self.inner.recv().await?;
        Some(decode_records(&self.path, records))
    }
}

// =============================================================================
// Repositories Facade
// =============================================================================

/// One owner's complete repository set.
///
/// ## Usage
/// ```rust,ignore
/// let repos = Repositories::new(store, "u1");
///
/// repos.items().insert(&item).await?;
/// let history = repos.sales().recent(50).await?;
/// ```
#[derive(Clone)]
pub struct Repositories {
    store: Arc<dyn DocumentStore>,
    owner: String,
}

impl Repositories {
    /// Binds a store to an owner id.
    pub fn new(store: Arc<dyn DocumentStore>, owner: impl Into<String>) -> Self {
        Repositories {
            store,
            owner: owner.into(),
        }
    }

    /// The owner every collection path is scoped to.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Catalog item records.
    pub fn items(&self) -> items::ItemRepository {
        items::ItemRepository::new(Arc::clone(&self.store), &self.owner)
    }

    /// Settled sales history.
    pub fn sales(&self) -> sales::SaleRepository {
        sales::SaleRepository::new(Arc::clone(&self.store), &self.owner)
    }

    /// Orders and their status writes.
    pub fn orders(&self) -> orders::OrderRepository {
        orders::OrderRepository::new(Arc::clone(&self.store), &self.owner)
    }

    /// Alert set and read flags.
    pub fn notifications(&self) -> notifications::NotificationRepository {
        notifications::NotificationRepository::new(Arc::clone(&self.store), &self.owner)
    }

    /// Atomic sequences (order numbers).
    pub fn counters(&self) -> counters::CounterRepository {
        counters::CounterRepository::new(Arc::clone(&self.store), &self.owner)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_paths() {
        assert_eq!(scoped("u1", "items"), "users/u1/items");
        assert_eq!(scoped("other", "orders"), "users/other/orders");
    }

    #[tokio::test]
    async fn test_facade_hands_out_scoped_repositories() {
        let store = Arc::new(crate::MemoryStore::new());
        let repos = Repositories::new(store, "u1");

        assert_eq!(repos.owner(), "u1");
        assert_eq!(repos.items().list().await.unwrap().len(), 0);
        assert_eq!(repos.notifications().unread_count().await.unwrap(), 0);
    }
}
