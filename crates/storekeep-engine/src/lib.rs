//! # storekeep-engine: Transaction Engine for Storekeep
//!
//! This crate is the operational layer of Storekeep: it owns every write to
//! the inventory ledger and drives sales, orders, notifications, and
//! analytics over the document store.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Engine Architecture                              │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                     Engine (Main Entry Point)                    │  │
//! │  │                                                                  │  │
//! │  │  Holds the store handle, config, event bus, and session          │  │
//! │  │  Hands out owner-scoped services                                 │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │    Catalog     │  │  StockLedger   │  │ TransactionProcessor   │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Register items │  │ Sole writer of │  │ Sale settlement saga   │    │
//! │  │ Patch fields   │  │ quantities,    │  │ Order state machine    │    │
//! │  │ Remove items   │  │ CAS + retries  │  │ Compensation on fail   │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Notification   │  │ Notification   │  │ AnalyticsAggregator    │    │
//! │  │ Deriver        │  │ Center         │  │                        │    │
//! │  │                │  │                │  │ Sales rollups by day   │    │
//! │  │ Events → alerts│  │ Feed, badges,  │  │ Inventory valuation    │    │
//! │  │ Keyed dedup    │  │ read tracking  │  │ Pure + deterministic   │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  EVENT FLOW:                                                           │
//! │  ──────────                                                            │
//! │  Services emit EngineEvent on the bus; the derivation loop (spawned    │
//! │  by Engine::start) feeds them to the NotificationDeriver, skipping     │
//! │  the deriver's own outputs. Frontends subscribe to the same bus.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - Main `Engine` entry point and derivation loop
//! - [`catalog`] - Item registration and maintenance
//! - [`ledger`] - Stock quantity adjustments (the only quantity writer)
//! - [`settlement`] - Sale settlement saga and order lifecycle
//! - [`notifications`] - Alert derivation and the notification feed
//! - [`analytics`] - Sales and inventory rollups
//! - [`events`] - Engine event bus
//! - [`config`] - Engine configuration (tax, retries, page sizes)
//! - [`retry`] - Bounded optimistic-write retry loop
//! - [`error`] - Engine error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use storekeep_engine::{Engine, EngineConfig};
//!
//! // Create an engine and sign in
//! let engine = Engine::in_memory(EngineConfig::load_or_default(None));
//! engine.sign_in("owner-1").await?;
//! let handle = engine.start();
//!
//! // Register an item and sell it
//! let catalog = engine.catalog().await?;
//! let item = catalog.register_item(draft).await?;
//! let sale = engine.settlement().await?.settle_sale(cart).await?;
//!
//! handle.shutdown().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod analytics;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod ledger;
pub mod notifications;
pub mod retry;
pub mod settlement;

// =============================================================================
// Re-exports
// =============================================================================

// Entry point
pub use engine::{Engine, EngineHandle};

// Configuration and errors
pub use config::{
    EngineConfig, EventSettings, QuerySettings, RetrySettings, StockSettings, TaxSettings,
};
pub use error::{EngineError, EngineResult};

// Events
pub use events::{EngineEvent, EventBus, EventSubscription, StockChangeReason};

// Services
pub use analytics::{
    compute_inventory_rollup, compute_sales_rollup, AnalyticsAggregator, CategoryRollup,
    DailyBucket, DateRange, InventoryRollup, SalesRollup,
};
pub use catalog::{Catalog, DraftKind, ItemDraft, ItemUpdate};
pub use ledger::{AdjustMode, StockAdjustment, StockLedger};
pub use notifications::{NotificationCenter, NotificationDeriver};
pub use settlement::{LineDraft, OrderDraft, SaleDraft, TransactionProcessor};
