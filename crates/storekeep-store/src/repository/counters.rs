//! # Counter Repository
//!
//! Atomic sequence numbers backed by a counter document.
//!
//! ## Why a Counter Document?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Order Numbers Must Never Collide                       │
//! │                                                                         │
//! │  ❌ WRONG: derive from collection size                                  │
//! │     next = orders.len() + 1                                             │
//! │     Two concurrent creators both read len=41 → two "ORD-042"           │
//! │     Deleting an order reuses its number                                 │
//! │                                                                         │
//! │  ✅ CORRECT: dedicated counter with check-and-set increment             │
//! │     read {value: 41, version: v}                                        │
//! │     write {value: 42} checked against v                                 │
//! │     Loser gets VersionConflict, re-reads 42, writes 43                 │
//! │                                                                         │
//! │  Numbers are strictly increasing and unique, forever.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{scoped, TypedCollection};
use crate::document::DocumentStore;
use crate::error::{StoreError, StoreResult};

/// Record id of the order-number sequence.
const ORDER_NUMBER_COUNTER: &str = "order_number";

/// Increment attempts before surfacing the conflict to the engine.
const MAX_COUNTER_ATTEMPTS: u32 = 10;

#[derive(Debug, Serialize, Deserialize)]
struct CounterDoc {
    value: i64,
}

/// Repository for atomic counters.
#[derive(Clone)]
pub struct CounterRepository {
    collection: TypedCollection<CounterDoc>,
}

impl CounterRepository {
    /// Creates a repository bound to one owner's counters.
    pub fn new(store: Arc<dyn DocumentStore>, owner: &str) -> Self {
        CounterRepository {
            collection: TypedCollection::new(store, scoped(owner, "counters")),
        }
    }

    /// Claims the next order number.
    ///
    /// First call initializes the counter at 1. Lost races (both on
    /// initialization and on increment) re-read and retry up to
    /// MAX_COUNTER_ATTEMPTS, then surface the conflict.
    pub async fn next_order_number(&self) -> StoreResult<i64> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            match self.collection.get(ORDER_NUMBER_COUNTER).await? {
                None => {
                    match self
                        .collection
                        .create(ORDER_NUMBER_COUNTER, &CounterDoc { value: 1 })
                        .await
                    {
                        Ok(_) => {
                            debug!("Initialized order number counter at 1");
                            return Ok(1);
                        }
                        // Lost the init race; re-read and increment instead
                        Err(StoreError::AlreadyExists { .. }) if attempt < MAX_COUNTER_ATTEMPTS => {
                            continue;
                        }
                        Err(err) => return Err(err),
                    }
                }
                Some(current) => {
                    let next = current.value.value + 1;
                    match self
                        .collection
                        .replace_checked(
                            ORDER_NUMBER_COUNTER,
                            current.version,
                            &CounterDoc { value: next },
                        )
                        .await
                    {
                        Ok(_) => {
                            debug!(order_number = next, "Claimed order number");
                            return Ok(next);
                        }
                        Err(err) if err.is_conflict() && attempt < MAX_COUNTER_ATTEMPTS => {
                            continue;
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
        }
    }

    /// Current counter value without claiming (0 before first claim).
    pub async fn peek_order_number(&self) -> StoreResult<i64> {
        Ok(self
            .collection
            .get(ORDER_NUMBER_COUNTER)
            .await?
            .map_or(0, |v| v.value.value))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    #[tokio::test]
    async fn test_sequence_starts_at_one_and_increments() {
        let store = Arc::new(MemoryStore::new());
        let repo = CounterRepository::new(store, "u1");

        assert_eq!(repo.peek_order_number().await.unwrap(), 0);
        assert_eq!(repo.next_order_number().await.unwrap(), 1);
        assert_eq!(repo.next_order_number().await.unwrap(), 2);
        assert_eq!(repo.next_order_number().await.unwrap(), 3);
        assert_eq!(repo.peek_order_number().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_claims_never_collide() {
        let store = Arc::new(MemoryStore::new());
        let repo = CounterRepository::new(store, "u1");

        let (a, b, c, d) = tokio::join!(
            repo.next_order_number(),
            repo.next_order_number(),
            repo.next_order_number(),
            repo.next_order_number(),
        );

        let mut numbers = vec![a.unwrap(), b.unwrap(), c.unwrap(), d.unwrap()];
        numbers.sort_unstable();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_counters_are_owner_scoped() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let alpha = CounterRepository::new(Arc::clone(&store), "alpha");
        let beta = CounterRepository::new(store, "beta");

        assert_eq!(alpha.next_order_number().await.unwrap(), 1);
        assert_eq!(alpha.next_order_number().await.unwrap(), 2);
        // A different owner has an independent sequence
        assert_eq!(beta.next_order_number().await.unwrap(), 1);
    }
}
