//! # Document Store Contract
//!
//! The persistence seam for the whole workspace: one trait, many backends.
//!
//! ## Record Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Collections and Records                              │
//! │                                                                         │
//! │  Collection: "users/u1/items"                                          │
//! │  ┌────────────────────────────────────────────────────────────┐        │
//! │  │ id: "3f2c..."   version: 7   body: { "name": "Cola", ... } │        │
//! │  │ id: "9a41..."   version: 2   body: { "name": "Tea",  ... } │        │
//! │  └────────────────────────────────────────────────────────────┘        │
//! │                                                                         │
//! │  • body is always a JSON object (top-level merge is well defined)      │
//! │  • version increments on every write (optimistic concurrency)          │
//! │  • collections spring into existence on first create                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Write Primitives
//! - `create` - fails if the id exists (counter initialization relies on it)
//! - `update` - top-level merge of a partial object into the body
//! - `update_checked` - full body replace guarded by an expected version
//! - `delete` - idempotent removal
//!
//! Hosted backends implement this trait out of tree; [`crate::MemoryStore`]
//! is the in-process reference implementation the test suite runs against.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::StoreResult;

// =============================================================================
// Stored Record
// =============================================================================

/// A record as the store returns it: id, body, and the version guard.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Record id, unique within its collection.
    pub id: String,
    /// Monotonically increasing write counter. Starts at 1 on create.
    pub version: u64,
    /// The JSON object payload.
    pub body: Value,
}

// =============================================================================
// Query Model
// =============================================================================

/// Comparison operator for a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// A single field comparison. Fields are top-level keys of the body.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: Op,
    pub value: Value,
}

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A field to sort on, paired with its direction.
#[derive(Debug, Clone)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// A collection query: filters (AND-combined), optional ordering, optional
/// result cap.
///
/// ## Usage
/// ```rust
/// use serde_json::json;
/// use storekeep_store::{Direction, Op, Query};
///
/// let query = Query::new()
///     .filter("status", Op::Eq, json!("pending"))
///     .order_by("created_at", Direction::Descending)
///     .limit(100);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    /// An unfiltered query returning the whole collection.
    pub fn new() -> Self {
        Query::default()
    }

    /// Adds a field comparison. Multiple filters are AND-combined.
    pub fn filter(mut self, field: impl Into<String>, op: Op, value: Value) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value,
        });
        self
    }

    /// Sets the sort field and direction. At most one; last call wins.
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    /// Caps the number of results, applied after filtering and ordering.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

// =============================================================================
// Subscription Stream
// =============================================================================

/// A live stream of full query-result snapshots.
///
/// The first item arrives immediately with the current results; every
/// subsequent collection change delivers a fresh, complete snapshot (never
/// a delta). Dropping the stream ends the subscription.
#[derive(Debug)]
pub struct RecordStream {
    rx: mpsc::Receiver<Vec<StoredRecord>>,
}

impl RecordStream {
    /// Wraps a snapshot channel produced by a backend.
    pub fn new(rx: mpsc::Receiver<Vec<StoredRecord>>) -> Self {
        RecordStream { rx }
    }

    /// Waits for the next snapshot. Returns None once the store side closes.
    pub async fn recv(&mut self) -> Option<Vec<StoredRecord>> {
        self.rx.recv().await
    }
}

// =============================================================================
// Document Store Trait
// =============================================================================

/// The persistence collaborator contract.
///
/// All methods are owner-agnostic: scoping happens in the collection path
/// (see [`crate::repository::scoped`]). Implementations must be safe to
/// share across tasks (`Send + Sync`); every method takes `&self`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Creates a record. Fails with `AlreadyExists` if the id is taken.
    ///
    /// ## Returns
    /// The stored record at version 1.
    async fn create(&self, collection: &str, id: &str, body: Value) -> StoreResult<StoredRecord>;

    /// Reads a single record by id.
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<StoredRecord>>;

    /// Merges `patch` into the record body at the top level.
    ///
    /// Only the keys present in `patch` change; everything else is kept.
    /// Fails with `NotFound` if the record doesn't exist. Bumps the version.
    async fn update(&self, collection: &str, id: &str, patch: Value) -> StoreResult<StoredRecord>;

    /// Replaces the record body, but only if its version still matches.
    ///
    /// ## Why
    /// This is the optimistic check-and-set every ledger mutation builds
    /// on: read (id, version, body), compute the new body, write it back
    /// conditioned on the version being unchanged. A concurrent writer
    /// makes this fail with `VersionConflict`; the caller re-reads and
    /// retries.
    async fn update_checked(
        &self,
        collection: &str,
        id: &str,
        expected_version: u64,
        body: Value,
    ) -> StoreResult<StoredRecord>;

    /// Deletes a record. Deleting a missing record is a no-op, not an error.
    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()>;

    /// Runs a query against a collection.
    async fn query(&self, collection: &str, query: Query) -> StoreResult<Vec<StoredRecord>>;

    /// Subscribes to a query: current results now, fresh snapshot on every
    /// collection change.
    async fn subscribe(&self, collection: &str, query: Query) -> StoreResult<RecordStream>;
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_builder() {
        let query = Query::new()
            .filter("status", Op::Eq, json!("pending"))
            .filter("total_cents", Op::Gte, json!(1000))
            .order_by("created_at", Direction::Descending)
            .limit(50);

        assert_eq!(query.filters.len(), 2);
        assert_eq!(query.filters[0].field, "status");
        assert_eq!(query.filters[1].op, Op::Gte);

        let order = query.order_by.as_ref().unwrap();
        assert_eq!(order.field, "created_at");
        assert_eq!(order.direction, Direction::Descending);
        assert_eq!(query.limit, Some(50));
    }

    #[test]
    fn test_empty_query_defaults() {
        let query = Query::new();
        assert!(query.filters.is_empty());
        assert!(query.order_by.is_none());
        assert!(query.limit.is_none());
    }
}
