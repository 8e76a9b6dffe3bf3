//! # Stock Ledger
//!
//! The sole writer of product quantities.
//!
//! ## Write Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    One Writer, One Invariant                            │
//! │                                                                         │
//! │  Every quantity change flows through adjust_quantity:                   │
//! │                                                                         │
//! │    manual receive/remove ──┐                                            │
//! │    manual recount (set) ───┼──► adjust_quantity ──► quantity >= 0       │
//! │    sale settlement ────────┤        (checked CAS)       ALWAYS          │
//! │    order completion ───────┤                                            │
//! │    saga compensation ──────┘                                            │
//! │                                                                         │
//! │  The check runs against the FRESHLY READ quantity inside the retry     │
//! │  loop, so a decrement validated against stale state can still be       │
//! │  rejected once the loop sees the truth.                                 │
//! │                                                                         │
//! │  Failure leaves the record untouched: the candidate is rejected        │
//! │  before the write, never clamped after it.                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use storekeep_core::{validation, CoreError, Item, ItemKind};
use storekeep_store::{Repositories, Versioned};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::events::{EngineEvent, EventBus, StockChangeReason};
use crate::retry::with_retries;

// =============================================================================
// Adjustment Mode
// =============================================================================

/// How a quantity change is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AdjustMode {
    /// Add the delta to the current quantity (negative removes).
    Relative { delta: i64 },

    /// Replace the quantity outright (recounts, corrections).
    Absolute { value: i64 },
}

// =============================================================================
// Adjustment Result
// =============================================================================

/// A committed quantity change.
#[derive(Debug, Clone)]
pub struct StockAdjustment {
    /// The item as written, with the new quantity inside its kind.
    pub item: Item,

    /// Quantity before the adjustment.
    pub previous_quantity: i64,

    /// Quantity after the adjustment.
    pub new_quantity: i64,
}

// =============================================================================
// Stock Ledger
// =============================================================================

/// Atomic per-item quantity adjustments.
///
/// Concurrent adjustments to the same item serialize through the version
/// check; adjustments to different items never contend.
#[derive(Clone)]
pub struct StockLedger {
    repos: Repositories,
    events: EventBus,
    config: Arc<EngineConfig>,
}

impl StockLedger {
    /// Creates a ledger over one owner's catalog.
    pub fn new(repos: Repositories, events: EventBus, config: Arc<EngineConfig>) -> Self {
        StockLedger {
            repos,
            events,
            config,
        }
    }

    /// Applies one quantity change to a product.
    ///
    /// ## Arguments
    /// * `item_id` - The product to adjust
    /// * `mode` - Relative delta or absolute replacement
    /// * `reason` - Why the quantity moved (carried on the emitted event)
    ///
    /// ## Returns
    /// The old and new quantities with the written item.
    ///
    /// ## Errors
    /// * `ItemNotFound` - No such item
    /// * `StockNotTracked` - The item is a service
    /// * `InsufficientStock` - The candidate quantity would be negative;
    ///   nothing is written
    /// * `ConcurrencyConflict` - Contention outlasted the retry budget
    pub async fn adjust_quantity(
        &self,
        item_id: &str,
        mode: AdjustMode,
        reason: StockChangeReason,
    ) -> EngineResult<StockAdjustment> {
        let key = format!("items/{}", item_id);

        let adjustment = with_retries(&self.config.retry, &key, || {
            let items = self.repos.items();
            let item_id = item_id.to_string();
            async move {
                let Some(Versioned {
                    value: item,
                    version,
                }) = items.get(&item_id).await?
                else {
                    return Err(CoreError::ItemNotFound(item_id).into());
                };

                let (quantity, threshold) = match item.kind {
                    ItemKind::Product {
                        quantity,
                        low_stock_threshold,
                    } => (quantity, low_stock_threshold),
                    ItemKind::Service => {
                        return Err(CoreError::StockNotTracked { item_id }.into());
                    }
                };

                let candidate = match mode {
                    AdjustMode::Relative { delta } => quantity.saturating_add(delta),
                    AdjustMode::Absolute { value } => value,
                };

                if candidate < 0 {
                    return Err(CoreError::InsufficientStock {
                        item_id,
                        available: quantity,
                        // In both modes this is the number of units the
                        // caller tried to take beyond what the shelf holds.
                        requested: quantity - candidate,
                    }
                    .into());
                }

                let mut updated = item;
                updated.kind = ItemKind::Product {
                    quantity: candidate,
                    low_stock_threshold: threshold,
                };
                updated.updated_at = Utc::now();

                items.replace_checked(&item_id, version, &updated).await?;

                Ok(StockAdjustment {
                    item: updated,
                    previous_quantity: quantity,
                    new_quantity: candidate,
                })
            }
        })
        .await?;

        info!(
            item_id = %item_id,
            previous = adjustment.previous_quantity,
            new = adjustment.new_quantity,
            reason = %reason,
            "Stock adjusted"
        );

        self.events.emit(EngineEvent::StockAdjusted {
            item: adjustment.item.clone(),
            previous_quantity: adjustment.previous_quantity,
            new_quantity: adjustment.new_quantity,
            reason,
        });

        Ok(adjustment)
    }

    // =========================================================================
    // Manual Adjustments
    // =========================================================================

    /// Adds received units to a product's quantity.
    ///
    /// The amount must be a positive integer.
    pub async fn receive_stock(&self, item_id: &str, amount: i64) -> EngineResult<StockAdjustment> {
        validation::validate_adjustment_amount(amount)?;
        self.adjust_quantity(
            item_id,
            AdjustMode::Relative { delta: amount },
            StockChangeReason::Manual,
        )
        .await
    }

    /// Removes units from a product's quantity (damage, shrinkage).
    ///
    /// The amount must be a positive integer. Removing more than the shelf
    /// holds fails with `InsufficientStock` rather than clamping at zero;
    /// a removal the ledger cannot honor is a recount, not a removal.
    pub async fn remove_stock(&self, item_id: &str, amount: i64) -> EngineResult<StockAdjustment> {
        validation::validate_adjustment_amount(amount)?;
        self.adjust_quantity(
            item_id,
            AdjustMode::Relative { delta: -amount },
            StockChangeReason::Manual,
        )
        .await
    }

    /// Sets a product's quantity outright after a physical recount.
    pub async fn set_stock(&self, item_id: &str, value: i64) -> EngineResult<StockAdjustment> {
        self.adjust_quantity(
            item_id,
            AdjustMode::Absolute { value },
            StockChangeReason::Manual,
        )
        .await
    }

    // =========================================================================
    // Saga Support
    // =========================================================================

    /// Returns previously taken units during a saga rollback.
    ///
    /// Best-effort by contract: the caller logs failures and keeps
    /// compensating the remaining lines.
    pub(crate) async fn compensate(&self, item_id: &str, amount: i64) -> EngineResult<()> {
        warn!(item_id = %item_id, amount, "Compensating stock decrement");
        self.adjust_quantity(
            item_id,
            AdjustMode::Relative { delta: amount },
            StockChangeReason::Compensation,
        )
        .await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use storekeep_core::ValidationError;
    use storekeep_store::MemoryStore;

    fn fixture() -> (StockLedger, Repositories, EventBus) {
        let store = Arc::new(MemoryStore::new());
        let repos = Repositories::new(store, "u1");
        let events = EventBus::new(32);

        let mut config = EngineConfig::default();
        config.retry.initial_backoff_ms = 1;
        config.retry.max_backoff_ms = 2;

        let ledger = StockLedger::new(repos.clone(), events.clone(), Arc::new(config));
        (ledger, repos, events)
    }

    async fn seed_product(repos: &Repositories, id: &str, quantity: i64) {
        let now = Utc::now();
        repos
            .items()
            .insert(&Item {
                id: id.to_string(),
                name: format!("Item {}", id),
                kind: ItemKind::Product {
                    quantity,
                    low_stock_threshold: 5,
                },
                category: "General".to_string(),
                price_cents: 1000,
                cost_cents: 400,
                sku: format!("SKU-{}", id),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
    }

    async fn seed_service(repos: &Repositories, id: &str) {
        let now = Utc::now();
        repos
            .items()
            .insert(&Item {
                id: id.to_string(),
                name: "Repair".to_string(),
                kind: ItemKind::Service,
                category: "Services".to_string(),
                price_cents: 5000,
                cost_cents: 0,
                sku: format!("SKU-{}", id),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_receive_and_remove_stock() {
        let (ledger, repos, _events) = fixture();
        seed_product(&repos, "a", 10).await;

        let received = ledger.receive_stock("a", 5).await.unwrap();
        assert_eq!(received.previous_quantity, 10);
        assert_eq!(received.new_quantity, 15);

        let removed = ledger.remove_stock("a", 7).await.unwrap();
        assert_eq!(removed.previous_quantity, 15);
        assert_eq!(removed.new_quantity, 8);

        let stored = repos.items().get("a").await.unwrap().unwrap();
        assert_eq!(stored.value.kind.quantity(), Some(8));
    }

    #[tokio::test]
    async fn test_remove_below_zero_fails_without_write() {
        let (ledger, repos, _events) = fixture();
        seed_product(&repos, "a", 3).await;

        let err = ledger.remove_stock("a", 4).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Domain(CoreError::InsufficientStock {
                available: 3,
                requested: 4,
                ..
            })
        ));

        // Nothing changed
        let stored = repos.items().get("a").await.unwrap().unwrap();
        assert_eq!(stored.value.kind.quantity(), Some(3));
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_set_stock_absolute() {
        let (ledger, repos, _events) = fixture();
        seed_product(&repos, "a", 3).await;

        let set = ledger.set_stock("a", 40).await.unwrap();
        assert_eq!(set.previous_quantity, 3);
        assert_eq!(set.new_quantity, 40);

        // A negative recount is rejected, not clamped
        let err = ledger.set_stock("a", -1).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Domain(CoreError::InsufficientStock { available: 40, .. })
        ));
        let stored = repos.items().get("a").await.unwrap().unwrap();
        assert_eq!(stored.value.kind.quantity(), Some(40));
    }

    #[tokio::test]
    async fn test_service_rejects_adjustment() {
        let (ledger, repos, _events) = fixture();
        seed_service(&repos, "svc").await;

        let err = ledger.receive_stock("svc", 1).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Domain(CoreError::StockNotTracked { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_item() {
        let (ledger, _repos, _events) = fixture();
        let err = ledger.receive_stock("ghost", 1).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Domain(CoreError::ItemNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_non_positive_amounts_are_validation_errors() {
        let (ledger, repos, _events) = fixture();
        seed_product(&repos, "a", 10).await;

        let err = ledger.receive_stock("a", 0).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Domain(CoreError::Validation(ValidationError::MustBePositive { .. }))
        ));

        let err = ledger.remove_stock("a", -2).await.unwrap_err();
        assert!(matches!(err, EngineError::Domain(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_adjustment_emits_event() {
        let (ledger, repos, events) = fixture();
        seed_product(&repos, "a", 10).await;
        let mut sub = events.subscribe();

        ledger.remove_stock("a", 2).await.unwrap();

        let event = sub.recv().await.unwrap();
        match event {
            EngineEvent::StockAdjusted {
                item,
                previous_quantity,
                new_quantity,
                reason,
            } => {
                assert_eq!(item.id, "a");
                assert_eq!(previous_quantity, 10);
                assert_eq!(new_quantity, 8);
                assert_eq!(reason, StockChangeReason::Manual);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_adjustment_emits_nothing() {
        let (ledger, repos, events) = fixture();
        seed_product(&repos, "a", 1).await;
        let mut sub = events.subscribe();

        ledger.remove_stock("a", 5).await.unwrap_err();
        drop(ledger);

        // Bus still alive via `events`; emit a sentinel to prove nothing
        // else was queued before it.
        events.emit(EngineEvent::ItemRemoved {
            item_id: "sentinel".into(),
        });
        let event = sub.recv().await.unwrap();
        assert!(matches!(event, EngineEvent::ItemRemoved { item_id } if item_id == "sentinel"));
    }

    #[tokio::test]
    async fn test_last_unit_race_one_winner() {
        let (ledger, repos, _events) = fixture();
        seed_product(&repos, "a", 1).await;

        let (first, second) = tokio::join!(ledger.remove_stock("a", 1), ledger.remove_stock("a", 1));

        let outcomes = [first.is_ok(), second.is_ok()];
        assert_eq!(
            outcomes.iter().filter(|ok| **ok).count(),
            1,
            "exactly one writer takes the last unit"
        );

        let loser = if outcomes[0] { second } else { first };
        assert!(matches!(
            loser,
            Err(EngineError::Domain(CoreError::InsufficientStock {
                available: 0,
                ..
            }))
        ));

        let stored = repos.items().get("a").await.unwrap().unwrap();
        assert_eq!(stored.value.kind.quantity(), Some(0));
    }

    #[tokio::test]
    async fn test_disjoint_items_both_commit() {
        let (ledger, repos, _events) = fixture();
        seed_product(&repos, "a", 5).await;
        seed_product(&repos, "b", 5).await;

        let (ra, rb) = tokio::join!(ledger.remove_stock("a", 2), ledger.remove_stock("b", 3));
        assert_eq!(ra.unwrap().new_quantity, 3);
        assert_eq!(rb.unwrap().new_quantity, 2);
    }
}
