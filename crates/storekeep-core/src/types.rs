//! # Domain Types
//!
//! Core domain types used throughout Storekeep.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Item       │   │      Sale       │   │     Order       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  sku (business) │   │  lines          │   │  order_number   │       │
//! │  │  kind           │   │  total_cents    │   │  status         │       │
//! │  │  price_cents    │   │  settled_at     │   │  customer       │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    ItemKind     │   │   OrderStatus   │   │  Notification   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  Product{qty,   │   │  Pending        │   │  kind           │       │
//! │  │    threshold}   │   │  Processing     │   │  subject_item   │       │
//! │  │  Service        │   │  Completed      │   │  read           │       │
//! │  └─────────────────┘   │  Cancelled      │   └─────────────────┘       │
//! │                        └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for store relations
//! - Business ID: (sku, order_number, etc.) - human-readable, potentially mutable

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 800 bps = 8% (the engine default)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Creates a tax rate from a percentage (for convenience).
    pub fn from_percentage(pct: f64) -> Self {
        TaxRate((pct * 100.0).round() as u32)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    /// Checks if tax rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Item Kind
// =============================================================================

/// What a catalog entry is: a stocked product or an untracked service.
///
/// ## Why a Tagged Variant?
/// Stock fields exist only on products. Making `quantity` and
/// `low_stock_threshold` part of the `Product` variant means a `Service`
/// cannot carry phantom stock state, and every stock operation must prove
/// it is holding a product before touching the ledger.
///
/// Serialized with an explicit tag so records stay self-describing:
/// `{"type": "product", "quantity": 5, "low_stock_threshold": 5}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemKind {
    /// Physical stocked good. The ledger owns `quantity`.
    Product {
        /// Units on hand. Never negative.
        quantity: i64,
        /// Alert boundary: 0 < quantity <= threshold raises LowStock.
        low_stock_threshold: i64,
    },
    /// Untracked offering (labor, repairs). No ledger entry.
    Service,
}

impl ItemKind {
    /// Checks if this kind tracks stock.
    #[inline]
    pub const fn tracks_stock(&self) -> bool {
        matches!(self, ItemKind::Product { .. })
    }

    /// Returns the quantity on hand, or None for services.
    #[inline]
    pub const fn quantity(&self) -> Option<i64> {
        match self {
            ItemKind::Product { quantity, .. } => Some(*quantity),
            ItemKind::Service => None,
        }
    }

    /// Returns the low-stock threshold, or None for services.
    #[inline]
    pub const fn low_stock_threshold(&self) -> Option<i64> {
        match self {
            ItemKind::Product {
                low_stock_threshold,
                ..
            } => Some(*low_stock_threshold),
            ItemKind::Service => None,
        }
    }
}

// =============================================================================
// Stock Status
// =============================================================================

/// Derived stock classification for an item.
///
/// This is never stored; it is recomputed from the kind on every read so the
/// ledger's quantity remains the single source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    /// Quantity above the low-stock threshold.
    InStock,
    /// 0 < quantity <= low_stock_threshold.
    LowStock,
    /// Quantity is exactly zero.
    OutOfStock,
    /// Services: stock does not apply.
    NotTracked,
}

// =============================================================================
// Item
// =============================================================================

/// A catalog entry: a product with tracked stock, or a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Item {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name shown in the catalog and on lines.
    pub name: String,

    /// Product (with stock) or service (without).
    pub kind: ItemKind,

    /// Category used for grouping in analytics.
    pub category: String,

    /// Selling price in cents (smallest currency unit).
    pub price_cents: i64,

    /// Acquisition cost in cents (for inventory valuation).
    pub cost_cents: i64,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// When the item was created.
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    /// When the item was last updated.
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Returns the price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Returns the cost as a Money type.
    #[inline]
    pub fn cost(&self) -> Money {
        Money::from_cents(self.cost_cents)
    }

    /// Checks if this item tracks stock.
    #[inline]
    pub fn tracks_stock(&self) -> bool {
        self.kind.tracks_stock()
    }

    /// Classifies the current stock level.
    pub fn stock_status(&self) -> StockStatus {
        match self.kind {
            ItemKind::Service => StockStatus::NotTracked,
            ItemKind::Product {
                quantity,
                low_stock_threshold,
            } => {
                if quantity == 0 {
                    StockStatus::OutOfStock
                } else if quantity <= low_stock_threshold {
                    StockStatus::LowStock
                } else {
                    StockStatus::InStock
                }
            }
        }
    }

    /// Checks if the requested quantity can be fulfilled right now.
    ///
    /// Services always fulfill; products need `quantity` units on hand.
    /// This is a point-in-time read used for validation messages. The
    /// ledger re-checks under its version guard before committing.
    pub fn can_fulfill(&self, requested: i64) -> bool {
        match self.kind {
            ItemKind::Service => true,
            ItemKind::Product { quantity, .. } => quantity >= requested,
        }
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment.
    Cash,
    /// Card payment on external terminal.
    Card,
    /// Digital wallet / transfer.
    Digital,
}

// =============================================================================
// Line Item
// =============================================================================

/// Whether a settled line tracked stock at settlement time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    /// Line decremented the ledger when settled.
    Product,
    /// Line never touched the ledger.
    Service,
}

/// A line on a sale or order.
/// Uses the snapshot pattern to freeze item data at transaction time.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineItem {
    pub item_id: String,
    /// Item name at transaction time (frozen).
    pub name: String,
    /// Whether the line hit the ledger (frozen kind).
    pub kind: LineKind,
    /// Unit price in cents at transaction time (frozen).
    pub unit_price_cents: i64,
    /// Units sold or ordered.
    pub quantity: i64,
    /// Line total before tax (unit_price × quantity).
    pub line_total_cents: i64,
}

impl LineItem {
    /// Returns the unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Returns the line total as Money.
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A settled point-of-sale transaction. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub lines: Vec<LineItem>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub payment_method: PaymentMethod,
    pub customer_name: Option<String>,
    #[ts(as = "String")]
    pub settled_at: DateTime<Utc>,
}

impl Sale {
    /// Returns the subtotal as Money.
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    /// Returns the tax amount as Money.
    #[inline]
    pub fn tax(&self) -> Money {
        Money::from_cents(self.tax_cents)
    }

    /// Returns the grand total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// The lifecycle state of a customer order.
///
/// ```text
/// Pending ──► Processing ──► Completed (stock settles on this edge)
///    │             │
///    └──────┬──────┘
///           ▼
///       Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order received, not yet being worked.
    Pending,
    /// Order being prepared; still cancellable.
    Processing,
    /// Order fulfilled; stock has been decremented. Terminal.
    Completed,
    /// Order abandoned before fulfillment. Terminal.
    Cancelled,
}

impl OrderStatus {
    /// Checks whether the state machine allows `self -> next`.
    ///
    /// Only `Processing -> Completed` settles stock; cancellation is
    /// allowed from either non-terminal state and never touches the
    /// ledger (nothing was decremented yet).
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Pending, Cancelled) | (Processing, Completed) | (Processing, Cancelled)
        )
    }

    /// Checks if no further transitions are allowed.
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

/// Lowercase form matching the serialized representation.
impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Order
// =============================================================================

/// Who placed an order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CustomerDetails {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

/// A customer order with deferred stock settlement.
///
/// Line prices and totals are frozen at creation; catalog price changes
/// afterwards do not re-price the order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Order {
    pub id: String,
    /// Sequential business identifier, e.g. "ORD-042".
    pub order_number: String,
    pub customer: CustomerDetails,
    pub status: OrderStatus,
    pub lines: Vec<LineItem>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Returns the grand total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Checks whether this order may move to `next`.
    #[inline]
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.status.can_transition_to(next)
    }
}

// =============================================================================
// Notification
// =============================================================================

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Product quantity dropped to/below its threshold (but above zero).
    LowStock,
    /// Product quantity reached zero.
    OutOfStock,
    /// Neutral informational message.
    Info,
    /// Positive confirmation (sale settled, order created).
    Success,
    /// Something failed and needs attention.
    Error,
}

impl NotificationKind {
    /// Stock alerts are deduplicated by (item, kind); the rest are not.
    #[inline]
    pub const fn is_stock_alert(&self) -> bool {
        matches!(self, NotificationKind::LowStock | NotificationKind::OutOfStock)
    }
}

/// An alert or message surfaced to the storefront operator.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    /// The item a stock alert is about; None for general messages.
    pub subject_item_id: Option<String>,
    pub title: String,
    pub message: String,
    #[ts(as = "String")]
    pub emitted_at: DateTime<Utc>,
    pub read: bool,
}

impl Notification {
    /// The dedup key: set only for stock alerts with a subject item.
    ///
    /// At most one live notification per key exists at any time; the
    /// deriver refreshes or supersedes in place rather than duplicating.
    pub fn dedup_key(&self) -> Option<(&str, NotificationKind)> {
        if self.kind.is_stock_alert() {
            self.subject_item_id.as_deref().map(|id| (id, self.kind))
        } else {
            None
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
