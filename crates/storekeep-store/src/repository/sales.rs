//! # Sale Repository
//!
//! Store operations for settled sales.
//!
//! Sales are append-only: the settlement saga writes each sale exactly once
//! and nothing ever mutates it afterwards. That is why this repository has
//! no update method at all.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::debug;

use super::{scoped, TypedCollection};
use crate::document::{Direction, DocumentStore, Op, Query};
use crate::error::StoreResult;
use storekeep_core::Sale;

/// Default page size for the sales history view.
pub const DEFAULT_SALES_LIMIT: usize = 50;

/// Repository for settled sale records.
#[derive(Clone)]
pub struct SaleRepository {
    collection: TypedCollection<Sale>,
}

impl SaleRepository {
    /// Creates a repository bound to one owner's sales history.
    pub fn new(store: Arc<dyn DocumentStore>, owner: &str) -> Self {
        SaleRepository {
            collection: TypedCollection::new(store, scoped(owner, "sales")),
        }
    }

    /// Records a settled sale. Called exactly once per sale, by settlement.
    pub async fn record(&self, sale: &Sale) -> StoreResult<()> {
        debug!(id = %sale.id, total_cents = sale.total_cents, "Recording sale");
        self.collection.create(&sale.id, sale).await?;
        Ok(())
    }

    /// Gets a sale by id.
    pub async fn get(&self, id: &str) -> StoreResult<Option<Sale>> {
        Ok(self.collection.get(id).await?.map(|v| v.value))
    }

    /// Most recent sales, newest first.
    pub async fn recent(&self, limit: usize) -> StoreResult<Vec<Sale>> {
        self.collection
            .query(
                Query::new()
                    .order_by("settled_at", Direction::Descending)
                    .limit(limit),
            )
            .await
    }

    /// Sales with `settled_at` in `[start, end)`, oldest first.
    ///
    /// The half-open range means consecutive windows never double-count a
    /// sale settled exactly on a boundary.
    pub async fn in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Sale>> {
        self.collection
            .query(
                Query::new()
                    .filter("settled_at", Op::Gte, json!(start))
                    .filter("settled_at", Op::Lt, json!(end))
                    .order_by("settled_at", Direction::Ascending),
            )
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
    use chrono::TimeZone;
    use storekeep_core::PaymentMethod;

    fn sale(id: &str, total_cents: i64, settled_at: DateTime<Utc>) -> Sale {
        Sale {
            id: id.to_string(),
            lines: Vec::new(),
            subtotal_cents: total_cents,
            tax_cents: 0,
            total_cents,
            payment_method: PaymentMethod::Cash,
            customer_name: None,
            settled_at,
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_record_and_get() {
        let store = Arc::new(MemoryStore::new());
        let repo = SaleRepository::new(store, "u1");

        repo.record(&sale("s1", 1080, at(10))).await.unwrap();

        let fetched = repo.get("s1").await.unwrap().unwrap();
        assert_eq!(fetched.total_cents, 1080);
        assert!(repo.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recent_is_newest_first_and_limited() {
        let store = Arc::new(MemoryStore::new());
        let repo = SaleRepository::new(store, "u1");
        for (id, hour) in [("s1", 9), ("s2", 11), ("s3", 10)] {
            repo.record(&sale(id, 100, at(hour))).await.unwrap();
        }

        let ids: Vec<String> = repo
            .recent(2)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["s2", "s3"]);
    }

    #[tokio::test]
    async fn test_in_range_is_half_open() {
        let store = Arc::new(MemoryStore::new());
        let repo = SaleRepository::new(store, "u1");
        repo.record(&sale("before", 100, at(9))).await.unwrap();
        repo.record(&sale("inside", 100, at(10))).await.unwrap();
        repo.record(&sale("boundary", 100, at(12))).await.unwrap();

        let ids: Vec<String> = repo
            .in_range(at(10), at(12))
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();

        // Start is inclusive, end is exclusive
        assert_eq!(ids, vec!["inside"]);
    }
}
