//! # Analytics
//!
//! Read-only rollups over sales history and the current catalog.
//!
//! ## Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Pure Core, Thin Wrappers                             │
//! │                                                                         │
//! │  compute_sales_rollup(&[Sale])      compute_inventory_rollup(&[Item])  │
//! │       pure, deterministic                pure, deterministic            │
//! │            ▲                                   ▲                        │
//! │            │                                   │                        │
//! │  AnalyticsAggregator::sales_rollup   AnalyticsAggregator::inventory_…  │
//! │       (fetch range, delegate)            (fetch catalog, delegate)     │
//! │                                                                         │
//! │  Rollups are never stored. They are recomputed from the records on     │
//! │  every call, so they cannot drift from the ledger.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Buckets are UTC calendar dates: a sale settled at 23:30 UTC and one at
//! 00:15 UTC the next day land in different buckets even though they are
//! 45 minutes apart.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use storekeep_core::{Item, ItemKind, Sale, StockStatus};
use storekeep_store::Repositories;

use crate::error::EngineResult;

// =============================================================================
// Date Range
// =============================================================================

/// A half-open UTC time window: `start` inclusive, `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Creates a range from explicit bounds.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        DateRange { start, end }
    }

    /// The trailing `days` ending now.
    pub fn trailing_days(days: i64) -> Self {
        let end = Utc::now();
        DateRange {
            start: end - Duration::days(days),
            end,
        }
    }

    /// Trailing 7 days.
    pub fn last_week() -> Self {
        Self::trailing_days(7)
    }

    /// Trailing 30 days.
    pub fn last_month() -> Self {
        Self::trailing_days(30)
    }

    /// Trailing 90 days.
    pub fn last_quarter() -> Self {
        Self::trailing_days(90)
    }

    /// Trailing 365 days.
    pub fn last_year() -> Self {
        Self::trailing_days(365)
    }

    /// Whether `at` falls inside the window.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

// =============================================================================
// Rollup Types
// =============================================================================

/// One UTC calendar date of sales activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyBucket {
    pub date: NaiveDate,
    pub revenue_cents: i64,
    pub transaction_count: usize,
}

/// Sales performance over a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesRollup {
    pub total_revenue_cents: i64,
    pub transaction_count: usize,
    /// Integer division of revenue by count; 0 when the window is empty.
    pub average_order_value_cents: i64,
    /// Daily buckets in ascending date order. Dates with no sales are
    /// absent, not zero-filled.
    pub daily: Vec<DailyBucket>,
}

/// One category's slice of the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRollup {
    pub category: String,
    /// Every item in the category, services included.
    pub item_count: usize,
    /// Stock value at cost; services contribute nothing.
    pub value_cents: i64,
}

/// Snapshot of the catalog's stock position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRollup {
    /// Sum of quantity x cost across products.
    pub total_value_cents: i64,
    pub low_stock: Vec<Item>,
    pub out_of_stock: Vec<Item>,
    /// Sorted by category name.
    pub categories: Vec<CategoryRollup>,
}

// =============================================================================
// Pure Rollup Functions
// =============================================================================

/// Rolls a slice of sales up into totals and daily buckets.
///
/// ## Example
/// ```text
/// sales: [$10.80 on Mar 1, $21.60 on Mar 1]
///      │
///      ▼
/// total: $32.40, count: 2, AOV: $16.20
/// daily: [Mar 1: $32.40 / 2]
/// ```
pub fn compute_sales_rollup(sales: &[Sale]) -> SalesRollup {
    let total_revenue_cents: i64 = sales.iter().map(|s| s.total_cents).sum();
    let transaction_count = sales.len();
    let average_order_value_cents = if transaction_count == 0 {
        0
    } else {
        total_revenue_cents / transaction_count as i64
    };

    let mut days: BTreeMap<NaiveDate, DailyBucket> = BTreeMap::new();
    for sale in sales {
        let date = sale.settled_at.date_naive();
        let bucket = days.entry(date).or_insert(DailyBucket {
            date,
            revenue_cents: 0,
            transaction_count: 0,
        });
        bucket.revenue_cents += sale.total_cents;
        bucket.transaction_count += 1;
    }

    SalesRollup {
        total_revenue_cents,
        transaction_count,
        average_order_value_cents,
        daily: days.into_values().collect(),
    }
}

/// Rolls the catalog up into valuation, attention lists, and categories.
pub fn compute_inventory_rollup(items: &[Item]) -> InventoryRollup {
    let mut total_value_cents = 0i64;
    let mut low_stock = Vec::new();
    let mut out_of_stock = Vec::new();
    let mut categories: BTreeMap<String, CategoryRollup> = BTreeMap::new();

    for item in items {
        let stock_value = match item.kind {
            ItemKind::Product { quantity, .. } => quantity * item.cost_cents,
            ItemKind::Service => 0,
        };
        total_value_cents += stock_value;

        match item.stock_status() {
            StockStatus::LowStock => low_stock.push(item.clone()),
            StockStatus::OutOfStock => out_of_stock.push(item.clone()),
            StockStatus::InStock | StockStatus::NotTracked => {}
        }

        let entry = categories
            .entry(item.category.clone())
            .or_insert_with(|| CategoryRollup {
                category: item.category.clone(),
                item_count: 0,
                value_cents: 0,
            });
        entry.item_count += 1;
        entry.value_cents += stock_value;
    }

    InventoryRollup {
        total_value_cents,
        low_stock,
        out_of_stock,
        categories: categories.into_values().collect(),
    }
}

// =============================================================================
// Aggregator
// =============================================================================

/// Fetches records and delegates to the pure rollup functions.
#[derive(Clone)]
pub struct AnalyticsAggregator {
    repos: Repositories,
}

impl AnalyticsAggregator {
    /// Creates an aggregator over one owner's records.
    pub fn new(repos: Repositories) -> Self {
        AnalyticsAggregator { repos }
    }

    /// Sales rollup for a window.
    pub async fn sales_rollup(&self, range: DateRange) -> EngineResult<SalesRollup> {
        let sales = self.repos.sales().in_range(range.start, range.end).await?;
        Ok(compute_sales_rollup(&sales))
    }

    /// Inventory rollup over the current catalog.
    pub async fn inventory_rollup(&self) -> EngineResult<InventoryRollup> {
        let items = self.repos.items().list().await?;
        Ok(compute_inventory_rollup(&items))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
