//! # Settlement
//!
//! Sale settlement and the order lifecycle.
//!
//! ## The Settlement Saga
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Multi-Line Settlement                                │
//! │                                                                         │
//! │  Each product line decrements the ledger on its own; there is no       │
//! │  cross-record transaction to lean on. Settlement therefore runs as     │
//! │  a saga:                                                                │
//! │                                                                         │
//! │   line 1: -2  ──ok──► line 2: -1 ──ok──► line 3: -4                    │
//! │                                              │                          │
//! │                                         short by 2                      │
//! │                                              │                          │
//! │   line 1: +2  ◄──────  line 2: +1  ◄────────┘                          │
//! │        (compensate applied lines, reverse order)                        │
//! │                                                                         │
//! │  The caller sees the original shortfall, and the shelves read as if    │
//! │  the sale never started. Compensation is best effort: a failed         │
//! │  restore is logged loudly and the unwind moves on to the next line.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Sales vs Orders
//! A sale settles stock immediately. An order defers settlement to the
//! `Processing -> Completed` transition; creating or cancelling an order
//! never touches the ledger.

use std::sync::Arc;

use backoff::backoff::Backoff;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use storekeep_core::{
    validation, CoreError, CustomerDetails, LineItem, LineKind, Money, Order, OrderStatus,
    PaymentMethod, Sale, ValidationError,
};
use storekeep_store::{Repositories, Versioned};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventBus, StockChangeReason};
use crate::ledger::{AdjustMode, StockLedger};
use crate::retry::{create_backoff, with_retries};

// =============================================================================
// Drafts
// =============================================================================

/// One requested line of a sale or order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineDraft {
    pub item_id: String,
    pub quantity: i64,
}

/// A cart ready to settle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleDraft {
    pub lines: Vec<LineDraft>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub customer_name: Option<String>,
}

/// A customer order ready to create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDraft {
    pub customer: CustomerDetails,
    pub lines: Vec<LineDraft>,
    #[serde(default)]
    pub notes: Option<String>,
}

// =============================================================================
// Transaction Processor
// =============================================================================

/// Settles sales and drives orders through their lifecycle.
#[derive(Clone)]
pub struct TransactionProcessor {
    repos: Repositories,
    ledger: StockLedger,
    events: EventBus,
    config: Arc<EngineConfig>,
}

// Manual impl: `Repositories` holds a `dyn DocumentStore` without a `Debug`
// bound, so the derive does not apply.
impl std::fmt::Debug for TransactionProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionProcessor").finish_non_exhaustive()
    }
}

impl TransactionProcessor {
    /// Creates a processor (and the ledger it settles through).
    pub fn new(repos: Repositories, events: EventBus, config: Arc<EngineConfig>) -> Self {
        let ledger = StockLedger::new(repos.clone(), events.clone(), Arc::clone(&config));
        TransactionProcessor {
            repos,
            ledger,
            events,
            config,
        }
    }

    // =========================================================================
    // Sales
    // =========================================================================

    /// Settles a sale: decrements stock line by line, then records the sale.
    ///
    /// ## Failure Behavior
    /// * A line that cannot be fulfilled stops the saga; already-applied
    ///   lines are compensated in reverse and the shortfall surfaces.
    /// * A persist failure after all lines applied compensates every
    ///   product line; the shelves never hold a decrement without a sale
    ///   record to explain it.
    pub async fn settle_sale(&self, draft: SaleDraft) -> EngineResult<Sale> {
        let lines = self.resolve_lines(&draft.lines).await?;

        let customer_name = draft
            .customer_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string);

        // Forward phase: apply product decrements in cart order
        let mut applied: Vec<(String, i64)> = Vec::new();
        for line in &lines {
            if line.kind != LineKind::Product {
                continue;
            }
            match self
                .ledger
                .adjust_quantity(
                    &line.item_id,
                    AdjustMode::Relative {
                        delta: -line.quantity,
                    },
                    StockChangeReason::Sale,
                )
                .await
            {
                Ok(_) => applied.push((line.item_id.clone(), line.quantity)),
                Err(err) => {
                    warn!(
                        item_id = %line.item_id,
                        applied = applied.len(),
                        "Sale line failed; unwinding applied lines"
                    );
                    self.unwind(&applied).await;
                    return Err(err);
                }
            }
        }

        let subtotal_cents: i64 = lines.iter().map(|l| l.line_total_cents).sum();
        let tax_cents = Money::from_cents(subtotal_cents)
            .calculate_tax(self.config.tax_rate())
            .cents();

        let sale = Sale {
            id: Uuid::new_v4().to_string(),
            lines,
            subtotal_cents,
            tax_cents,
            total_cents: subtotal_cents + tax_cents,
            payment_method: draft.payment_method,
            customer_name,
            settled_at: Utc::now(),
        };

        // Persist with the transient-failure budget. If the record never
        // lands, the decrements must not stand either.
        let persisted = with_retries(&self.config.retry, &format!("sales/{}", sale.id), || {
            let sales = self.repos.sales();
            let sale = sale.clone();
            async move {
                sales.record(&sale).await?;
                Ok(())
            }
        })
        .await;

        if let Err(err) = persisted {
            error!(sale_id = %sale.id, error = %err, "Sale persist failed; unwinding all lines");
            self.unwind(&applied).await;
            return Err(err);
        }

        info!(
            sale_id = %sale.id,
            total_cents = sale.total_cents,
            lines = sale.lines.len(),
            "Sale settled"
        );
        self.events.emit(EngineEvent::SaleSettled { sale: sale.clone() });

        Ok(sale)
    }

    /// Fetches one settled sale.
    pub async fn get_sale(&self, sale_id: &str) -> EngineResult<Sale> {
        self.repos
            .sales()
            .get(sale_id)
            .await?
            .ok_or_else(|| CoreError::SaleNotFound(sale_id.to_string()).into())
    }

    /// Lists recent sales, newest first. `None` uses the configured page size.
    pub async fn list_sales(&self, limit: Option<usize>) -> EngineResult<Vec<Sale>> {
        let limit = limit.unwrap_or(self.config.query.sales_limit);
        Ok(self.repos.sales().recent(limit).await?)
    }

    /// Sales settled in `[start, end)`, oldest first.
    pub async fn sales_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> EngineResult<Vec<Sale>> {
        Ok(self.repos.sales().in_range(start, end).await?)
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Creates a pending order. Stock is untouched until completion.
    pub async fn create_order(&self, draft: OrderDraft) -> EngineResult<Order> {
        validation::validate_customer_name(&draft.customer.name)?;
        validation::validate_email(&draft.customer.email)?;

        let lines = self.resolve_lines(&draft.lines).await?;

        let number = self.repos.counters().next_order_number().await?;
        let order_number = format!("ORD-{:03}", number);

        let subtotal_cents: i64 = lines.iter().map(|l| l.line_total_cents).sum();
        let tax_cents = Money::from_cents(subtotal_cents)
            .calculate_tax(self.config.tax_rate())
            .cents();

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4().to_string(),
            order_number,
            customer: CustomerDetails {
                name: draft.customer.name.trim().to_string(),
                email: draft.customer.email.trim().to_string(),
                phone: draft.customer.phone,
            },
            status: OrderStatus::Pending,
            lines,
            subtotal_cents,
            tax_cents,
            total_cents: subtotal_cents + tax_cents,
            notes: draft.notes,
            created_at: now,
            updated_at: now,
        };

        self.repos.orders().insert(&order).await?;

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total_cents = order.total_cents,
            "Order created"
        );
        self.events.emit(EngineEvent::OrderCreated {
            order: order.clone(),
        });

        Ok(order)
    }

    /// Moves an order to `next`, settling stock on `Processing -> Completed`.
    ///
    /// ## Concurrency
    /// The status write is checked against the version read at the top of
    /// the attempt. When two transitions race, the loser compensates any
    /// stock it settled, re-reads, and re-evaluates; usually the fresh
    /// status no longer allows its transition and it reports
    /// `InvalidTransition` instead of a double settlement.
    pub async fn transition_order(
        &self,
        order_id: &str,
        next: OrderStatus,
    ) -> EngineResult<Order> {
        let mut backoff = create_backoff(&self.config.retry);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let Some(Versioned {
                value: order,
                version,
            }) = self.repos.orders().get(order_id).await?
            else {
                return Err(CoreError::OrderNotFound(order_id.to_string()).into());
            };

            if !order.can_transition_to(next) {
                return Err(CoreError::InvalidTransition {
                    from: order.status.to_string(),
                    to: next.to_string(),
                }
                .into());
            }

            // Stock settles on exactly one edge of the state machine
            let settles =
                order.status == OrderStatus::Processing && next == OrderStatus::Completed;

            let mut applied: Vec<(String, i64)> = Vec::new();
            if settles {
                for line in order.lines.iter().filter(|l| l.kind == LineKind::Product) {
                    match self
                        .ledger
                        .adjust_quantity(
                            &line.item_id,
                            AdjustMode::Relative {
                                delta: -line.quantity,
                            },
                            StockChangeReason::Order,
                        )
                        .await
                    {
                        Ok(_) => applied.push((line.item_id.clone(), line.quantity)),
                        Err(err) => {
                            warn!(
                                order_id = %order_id,
                                item_id = %line.item_id,
                                "Order completion line failed; unwinding"
                            );
                            self.unwind(&applied).await;
                            return Err(err);
                        }
                    }
                }
            }

            let old = order.status;
            let mut updated = order;
            updated.status = next;
            updated.updated_at = Utc::now();

            match self
                .repos
                .orders()
                .replace_checked(order_id, version, &updated)
                .await
            {
                Ok(_) => {
                    info!(
                        order_id = %order_id,
                        order_number = %updated.order_number,
                        from = %old,
                        to = %next,
                        "Order transitioned"
                    );
                    self.events.emit(EngineEvent::OrderStatusChanged {
                        order: updated.clone(),
                        old,
                        new: next,
                    });
                    return Ok(updated);
                }
                Err(err) if err.is_conflict() || err.is_transient() => {
                    // Lost the status race (or hit a transient fault): any
                    // stock settled under the stale read must come back
                    // before re-evaluating against the fresh record.
                    self.unwind(&applied).await;

                    if attempt >= self.config.retry.max_attempts {
                        warn!(order_id = %order_id, attempt, "Order transition budget spent");
                        return Err(EngineError::ConcurrencyConflict {
                            key: format!("orders/{}", order_id),
                            attempts: attempt,
                        });
                    }
                    let delay = backoff
                        .next_backoff()
                        .unwrap_or_else(|| self.config.retry.max_backoff());
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    self.unwind(&applied).await;
                    return Err(err.into());
                }
            }
        }
    }

    /// Fetches one order.
    pub async fn get_order(&self, order_id: &str) -> EngineResult<Order> {
        self.repos
            .orders()
            .get(order_id)
            .await?
            .map(|v| v.value)
            .ok_or_else(|| CoreError::OrderNotFound(order_id.to_string()).into())
    }

    /// Lists recent orders, newest first. `None` uses the configured page size.
    pub async fn list_orders(&self, limit: Option<usize>) -> EngineResult<Vec<Order>> {
        let limit = limit.unwrap_or(self.config.query.orders_limit);
        Ok(self.repos.orders().recent(limit).await?)
    }

    /// Orders currently in `status`, newest first.
    pub async fn orders_by_status(&self, status: OrderStatus) -> EngineResult<Vec<Order>> {
        Ok(self.repos.orders().by_status(status).await?)
    }

    /// Orders created in `[start, end)`, oldest first.
    pub async fn orders_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> EngineResult<Vec<Order>> {
        Ok(self.repos.orders().in_range(start, end).await?)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Validates draft lines and snapshots each item into a priced line.
    ///
    /// Prices, names, and kinds are frozen here; later catalog edits do not
    /// re-price the transaction.
    async fn resolve_lines(&self, drafts: &[LineDraft]) -> EngineResult<Vec<LineItem>> {
        validation::validate_line_count(drafts.len())?;
        for draft in drafts {
            validation::validate_quantity(draft.quantity)?;
        }

        let items = self.repos.items();
        let mut lines = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let Some(versioned) = items.get(&draft.item_id).await? else {
                return Err(ValidationError::UnknownItem {
                    item_id: draft.item_id.clone(),
                }
                .into());
            };
            let item = versioned.value;

            let kind = if item.tracks_stock() {
                LineKind::Product
            } else {
                LineKind::Service
            };
            let line_total_cents = item.price().multiply_quantity(draft.quantity).cents();

            lines.push(LineItem {
                item_id: item.id,
                name: item.name,
                kind,
                unit_price_cents: item.price_cents,
                quantity: draft.quantity,
                line_total_cents,
            });
        }

        Ok(lines)
    }

    /// Restores applied decrements in reverse order, best effort.
    ///
    /// A compensation that fails leaves the ledger short; that is logged
    /// at error level with enough context for a manual recount, and the
    /// unwind continues to the remaining lines.
    async fn unwind(&self, applied: &[(String, i64)]) {
        for (item_id, quantity) in applied.iter().rev() {
            if let Err(err) = self.ledger.compensate(item_id, *quantity).await {
                error!(
                    item_id = %item_id,
                    quantity,
                    error = %err,
                    "Compensation failed; stock needs manual recount"
                );
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use storekeep_core::{Item, ItemKind};
    use storekeep_store::MemoryStore;

    fn fixture() -> (TransactionProcessor, Repositories, EventBus) {
        let store = Arc::new(MemoryStore::new());
        let repos = Repositories::new(store, "u1");
        let events = EventBus::new(64);
        let mut config = EngineConfig::default();
        config.retry.initial_backoff_ms = 1;
        config.retry.max_backoff_ms = 2;
        let processor = TransactionProcessor::new(repos.clone(), events.clone(), Arc::new(config));
        (processor, repos, events)
    }

    async fn seed_product(repos: &Repositories, id: &str, price_cents: i64, quantity: i64) {
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
                price_cents,
                cost_cents: price_cents / 2,
                sku: format!("SKU-{}", id),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
    }

    async fn seed_service(repos: &Repositories, id: &str, price_cents: i64) {
        let now = Utc::now();
        repos
            .items()
            .insert(&Item {
                id: id.to_string(),
                name: format!("Service {}", id),
                kind: ItemKind::Service,
                category: "Services".to_string(),
                price_cents,
                cost_cents: 0,
                sku: format!("SVC-{}", id),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
    }

    async fn quantity_of(repos: &Repositories, id: &str) -> i64 {
        repos
            .items()
            .get(id)
            .await
            .unwrap()
            .unwrap()
            .value
            .kind
            .quantity()
            .unwrap()
    }

    fn line(item_id: &str, quantity: i64) -> LineDraft {
        LineDraft {
            item_id: item_id.to_string(),
            quantity,
        }
    }

    fn customer() -> CustomerDetails {
        CustomerDetails {
            name: "Jo Cashier".to_string(),
            email: "jo@example.com".to_string(),
            phone: None,
        }
    }

    // =========================================================================
    // Sales
    // =========================================================================

    #[tokio::test]
    async fn test_settle_sale_totals_and_stock() {
        let (processor, repos, _events) = fixture();
        seed_product(&repos, "a", 1000, 5).await;
        seed_product(&repos, "b", 2000, 5).await;

        let sale = processor
            .settle_sale(SaleDraft {
                lines: vec![line("a", 1), line("b", 1)],
                payment_method: PaymentMethod::Card,
                customer_name: Some("Dana".to_string()),
            })
            .await
            .unwrap();

        // $10 + $20 at 8% tax
        assert_eq!(sale.subtotal_cents, 3000);
        assert_eq!(sale.tax_cents, 240);
        assert_eq!(sale.total_cents, 3240);
        assert_eq!(sale.customer_name.as_deref(), Some("Dana"));

        assert_eq!(quantity_of(&repos, "a").await, 4);
        assert_eq!(quantity_of(&repos, "b").await, 4);

        // The record landed
        let stored = repos.sales().get(&sale.id).await.unwrap().unwrap();
        assert_eq!(stored.total_cents, 3240);
    }

    #[tokio::test]
    async fn test_settle_sale_freezes_line_snapshots() {
        let (processor, repos, _events) = fixture();
        seed_product(&repos, "a", 299, 10).await;
        seed_service(&repos, "svc", 4999).await;

        let sale = processor
            .settle_sale(SaleDraft {
                lines: vec![line("a", 3), line("svc", 1)],
                payment_method: PaymentMethod::Cash,
                customer_name: None,
            })
            .await
            .unwrap();

        assert_eq!(sale.lines.len(), 2);
        assert_eq!(sale.lines[0].kind, LineKind::Product);
        assert_eq!(sale.lines[0].unit_price_cents, 299);
        assert_eq!(sale.lines[0].line_total_cents, 897);
        assert_eq!(sale.lines[1].kind, LineKind::Service);
        assert_eq!(sale.lines[1].line_total_cents, 4999);

        // Only the product line touched the ledger
        assert_eq!(quantity_of(&repos, "a").await, 7);
    }

    #[tokio::test]
    async fn test_shortfall_unwinds_applied_lines() {
        let (processor, repos, _events) = fixture();
        seed_product(&repos, "a", 100, 5).await;
        seed_product(&repos, "b", 100, 3).await;
        seed_product(&repos, "c", 100, 2).await;

        let err = processor
            .settle_sale(SaleDraft {
                lines: vec![line("a", 5), line("b", 3), line("c", 10)],
                payment_method: PaymentMethod::Cash,
                customer_name: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EngineError::Domain(CoreError::InsufficientStock {
                available: 2,
                requested: 10,
                ..
            })
        ));

        // Lines a and b were applied, then restored
        assert_eq!(quantity_of(&repos, "a").await, 5);
        assert_eq!(quantity_of(&repos, "b").await, 3);
        assert_eq!(quantity_of(&repos, "c").await, 2);

        // No sale record exists
        assert!(repos.sales().recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_settle_rejects_bad_carts() {
        let (processor, repos, _events) = fixture();
        seed_product(&repos, "a", 100, 5).await;

        let empty = processor
            .settle_sale(SaleDraft {
                lines: Vec::new(),
                payment_method: PaymentMethod::Cash,
                customer_name: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            empty,
            EngineError::Domain(CoreError::Validation(ValidationError::EmptyCart))
        ));

        let unknown = processor
            .settle_sale(SaleDraft {
                lines: vec![line("ghost", 1)],
                payment_method: PaymentMethod::Cash,
                customer_name: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            unknown,
            EngineError::Domain(CoreError::Validation(ValidationError::UnknownItem { .. }))
        ));

        let zero_quantity = processor
            .settle_sale(SaleDraft {
                lines: vec![line("a", 0)],
                payment_method: PaymentMethod::Cash,
                customer_name: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            zero_quantity,
            EngineError::Domain(CoreError::Validation(ValidationError::MustBePositive { .. }))
        ));

        // Nothing moved
        assert_eq!(quantity_of(&repos, "a").await, 5);
    }

    #[tokio::test]
    async fn test_settle_emits_event() {
        let (processor, repos, events) = fixture();
        seed_product(&repos, "a", 1000, 5).await;
        let mut sub = events.subscribe();

        let sale = processor
            .settle_sale(SaleDraft {
                lines: vec![line("a", 1)],
                payment_method: PaymentMethod::Digital,
                customer_name: None,
            })
            .await
            .unwrap();

        // First the ledger announces the decrement, then the sale itself
        let first = sub.recv().await.unwrap();
        assert!(matches!(first, EngineEvent::StockAdjusted { .. }));
        let second = sub.recv().await.unwrap();
        assert!(matches!(
            second,
            EngineEvent::SaleSettled { sale: settled } if settled.id == sale.id
        ));
    }

    // =========================================================================
    // Orders
    // =========================================================================

    #[tokio::test]
    async fn test_create_order_numbers_and_leaves_stock() {
        let (processor, repos, _events) = fixture();
        seed_product(&repos, "a", 1000, 5).await;

        let first = processor
            .create_order(OrderDraft {
                customer: customer(),
                lines: vec![line("a", 2)],
                notes: Some("gift wrap".to_string()),
            })
            .await
            .unwrap();
        let second = processor
            .create_order(OrderDraft {
                customer: customer(),
                lines: vec![line("a", 1)],
                notes: None,
            })
            .await
            .unwrap();

        assert_eq!(first.order_number, "ORD-001");
        assert_eq!(second.order_number, "ORD-002");
        assert_eq!(first.status, OrderStatus::Pending);
        assert_eq!(first.subtotal_cents, 2000);
        assert_eq!(first.tax_cents, 160);
        assert_eq!(first.total_cents, 2160);

        // Creation never touches the shelves
        assert_eq!(quantity_of(&repos, "a").await, 5);
    }

    #[tokio::test]
    async fn test_create_order_validates_customer() {
        let (processor, repos, _events) = fixture();
        seed_product(&repos, "a", 1000, 5).await;

        let bad_name = processor
            .create_order(OrderDraft {
                customer: CustomerDetails {
                    name: "  ".to_string(),
                    email: "jo@example.com".to_string(),
                    phone: None,
                },
                lines: vec![line("a", 1)],
                notes: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            bad_name,
            EngineError::Domain(CoreError::Validation(ValidationError::Required { .. }))
        ));

        let bad_email = processor
            .create_order(OrderDraft {
                customer: CustomerDetails {
                    name: "Jo".to_string(),
                    email: "not-an-email".to_string(),
                    phone: None,
                },
                lines: vec![line("a", 1)],
                notes: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            bad_email,
            EngineError::Domain(CoreError::Validation(ValidationError::InvalidFormat { .. }))
        ));
    }

    #[tokio::test]
    async fn test_order_lifecycle_settles_exactly_once() {
        let (processor, repos, _events) = fixture();
        seed_product(&repos, "a", 1000, 5).await;

        let order = processor
            .create_order(OrderDraft {
                customer: customer(),
                lines: vec![line("a", 2)],
                notes: None,
            })
            .await
            .unwrap();

        // Completion straight from Pending is not a thing
        let err = processor
            .transition_order(&order.id, OrderStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Domain(CoreError::InvalidTransition { .. })
        ));
        assert_eq!(quantity_of(&repos, "a").await, 5);

        // Pending -> Processing moves no stock
        let processing = processor
            .transition_order(&order.id, OrderStatus::Processing)
            .await
            .unwrap();
        assert_eq!(processing.status, OrderStatus::Processing);
        assert_eq!(quantity_of(&repos, "a").await, 5);

        // Processing -> Completed settles
        let completed = processor
            .transition_order(&order.id, OrderStatus::Completed)
            .await
            .unwrap();
        assert_eq!(completed.status, OrderStatus::Completed);
        assert_eq!(quantity_of(&repos, "a").await, 3);

        // Terminal: nothing further
        let err = processor
            .transition_order(&order.id, OrderStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Domain(CoreError::InvalidTransition { .. })
        ));
        assert_eq!(quantity_of(&repos, "a").await, 3);
    }

    #[tokio::test]
    async fn test_cancellation_never_touches_stock() {
        let (processor, repos, _events) = fixture();
        seed_product(&repos, "a", 1000, 5).await;

        let from_pending = processor
            .create_order(OrderDraft {
                customer: customer(),
                lines: vec![line("a", 2)],
                notes: None,
            })
            .await
            .unwrap();
        processor
            .transition_order(&from_pending.id, OrderStatus::Cancelled)
            .await
            .unwrap();

        let from_processing = processor
            .create_order(OrderDraft {
                customer: customer(),
                lines: vec![line("a", 3)],
                notes: None,
            })
            .await
            .unwrap();
        processor
            .transition_order(&from_processing.id, OrderStatus::Processing)
            .await
            .unwrap();
        processor
            .transition_order(&from_processing.id, OrderStatus::Cancelled)
            .await
            .unwrap();

        assert_eq!(quantity_of(&repos, "a").await, 5);
    }

    #[tokio::test]
    async fn test_completion_shortfall_restores_applied_lines() {
        let (processor, repos, _events) = fixture();
        seed_product(&repos, "a", 1000, 5).await;
        seed_product(&repos, "b", 1000, 3).await;

        let order = processor
            .create_order(OrderDraft {
                customer: customer(),
                lines: vec![line("a", 2), line("b", 5)],
                notes: None,
            })
            .await
            .unwrap();
        processor
            .transition_order(&order.id, OrderStatus::Processing)
            .await
            .unwrap();

        let err = processor
            .transition_order(&order.id, OrderStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Domain(CoreError::InsufficientStock { .. })
        ));

        // Line a was restored; the order is still completable after restock
        assert_eq!(quantity_of(&repos, "a").await, 5);
        assert_eq!(quantity_of(&repos, "b").await, 3);
        let current = processor.get_order(&order.id).await.unwrap();
        assert_eq!(current.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn test_racing_completions_settle_once() {
        let (processor, repos, _events) = fixture();
        seed_product(&repos, "a", 1000, 10).await;

        let order = processor
            .create_order(OrderDraft {
                customer: customer(),
                lines: vec![line("a", 2)],
                notes: None,
            })
            .await
            .unwrap();
        processor
            .transition_order(&order.id, OrderStatus::Processing)
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            processor.transition_order(&order.id, OrderStatus::Completed),
            processor.transition_order(&order.id, OrderStatus::Completed),
        );

        // Exactly one transition wins; the loser compensates its decrement
        assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1);
        assert_eq!(quantity_of(&repos, "a").await, 8);
        let current = processor.get_order(&order.id).await.unwrap();
        assert_eq!(current.status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn test_order_queries() {
        let (processor, repos, _events) = fixture();
        seed_product(&repos, "a", 1000, 50).await;

        let first = processor
            .create_order(OrderDraft {
                customer: customer(),
                lines: vec![line("a", 1)],
                notes: None,
            })
            .await
            .unwrap();
        let second = processor
            .create_order(OrderDraft {
                customer: customer(),
                lines: vec![line("a", 1)],
                notes: None,
            })
            .await
            .unwrap();
        processor
            .transition_order(&second.id, OrderStatus::Cancelled)
            .await
            .unwrap();

        let pending = processor
            .orders_by_status(OrderStatus::Pending)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, first.id);

        let all = processor.list_orders(None).await.unwrap();
        assert_eq!(all.len(), 2);

        let missing = processor.get_order("ghost").await.unwrap_err();
        assert!(matches!(
            missing,
            EngineError::Domain(CoreError::OrderNotFound(_))
        ));
    }
}
