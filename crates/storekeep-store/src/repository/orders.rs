//! # Order Repository
//!
//! Store operations for customer orders.
//!
//! Status changes go through `replace_checked`: the settlement layer reads
//! an order with its version, validates the transition, and writes the new
//! status under that version. Two cashiers racing to complete the same
//! order produce exactly one winner here.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::debug;

use super::{scoped, TypedCollection, Versioned};
use crate::document::{Direction, DocumentStore, Op, Query};
use crate::error::StoreResult;
use storekeep_core::{Order, OrderStatus};

/// Default page size for the orders view.
pub const DEFAULT_ORDERS_LIMIT: usize = 100;

/// Repository for order records.
#[derive(Clone)]
pub struct OrderRepository {
    collection: TypedCollection<Order>,
}

impl OrderRepository {
    /// Creates a repository bound to one owner's orders.
    pub fn new(store: Arc<dyn DocumentStore>, owner: &str) -> Self {
        OrderRepository {
            collection: TypedCollection::new(store, scoped(owner, "orders")),
        }
    }

    /// Inserts a freshly created order.
    pub async fn insert(&self, order: &Order) -> StoreResult<()> {
        debug!(id = %order.id, order_number = %order.order_number, "Inserting order");
        self.collection.create(&order.id, order).await?;
        Ok(())
    }

    /// Gets an order with the version needed for a status write.
    pub async fn get(&self, id: &str) -> StoreResult<Option<Versioned<Order>>> {
        self.collection.get(id).await
    }

    /// Replaces an order under its version guard.
    pub async fn replace_checked(
        &self,
        id: &str,
        expected_version: u64,
        order: &Order,
    ) -> StoreResult<u64> {
        debug!(id = %id, status = %order.status, expected_version, "Replacing order");
        self.collection.replace_checked(id, expected_version, order).await
    }

    /// Most recent orders, newest first.
    pub async fn recent(&self, limit: usize) -> StoreResult<Vec<Order>> {
        self.collection
            .query(
                Query::new()
                    .order_by("created_at", Direction::Descending)
                    .limit(limit),
            )
            .await
    }

    /// Orders currently in `status`, newest first.
    pub async fn by_status(&self, status: OrderStatus) -> StoreResult<Vec<Order>> {
        self.collection
            .query(
                Query::new()
                    .filter("status", Op::Eq, json!(status))
                    .order_by("created_at", Direction::Descending),
            )
            .await
    }

    /// Orders with `created_at` in `[start, end)`, oldest first.
    pub async fn in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Order>> {
        self.collection
            .query(
                Query::new()
                    .filter("created_at", Op::Gte, json!(start))
                    .filter("created_at", Op::Lt, json!(end))
                    .order_by("created_at", Direction::Ascending),
            )
            .await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
