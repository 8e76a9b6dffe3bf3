//! # storekeep-store: Document Store Layer for Storekeep
//!
//! This crate provides document storage for the Storekeep engine.
//! Records are versioned JSON documents in owner-scoped collections, with
//! snapshot subscriptions for live views.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Storekeep Data Flow                              │
//! │                                                                         │
//! │  Engine operation (settle_sale, adjust_stock, ...)                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  storekeep-store (THIS CRATE)                   │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │ DocumentStore │    │ Repositories  │    │ Typed Layer  │  │   │
//! │  │   │ (document.rs) │    │  (items.rs)   │    │   (mod.rs)   │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ create/update │◄───│ ItemRepo      │◄───│ TypedColl<T> │  │   │
//! │  │   │ update_checked│    │ SaleRepo      │    │ Versioned<T> │  │   │
//! │  │   │ query/subscr. │    │ OrderRepo ... │    │ TypedStream  │  │   │
//! │  │   └───────┬───────┘    └───────────────┘    └──────────────┘  │   │
//! │  │           │                                                     │   │
//! │  └───────────┼─────────────────────────────────────────────────────┘   │
//! │              ▼                                                          │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  MemoryStore (memory.rs)                        │   │
//! │  │   users/{owner}/items · sales · orders · notifications · meta   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine only ever sees the [`DocumentStore`] trait. Swapping the
//! in-memory backend for a hosted document database is a one-struct change.
//!
//! ## Module Organization
//!
//! - [`document`] - The `DocumentStore` trait, query model, and record stream
//! - [`memory`] - In-memory reference backend with change notifications
//! - [`error`] - Store error types
//! - [`repository`] - Typed repositories (items, sales, orders, ...)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use storekeep_store::{MemoryStore, Repositories};
//!
//! // Create a store and bind it to an owner
//! let store = Arc::new(MemoryStore::new());
//! let repos = Repositories::new(store, "owner-1");
//!
//! // Use repositories
//! let items = repos.items().list().await?;
//! let number = repos.counters().next_order_number().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod document;
pub mod error;
pub mod memory;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use document::{
    Direction, DocumentStore, Filter, Op, OrderBy, Query, RecordStream, StoredRecord,
};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;

// Repository re-exports for convenience
pub use repository::counters::CounterRepository;
pub use repository::items::ItemRepository;
pub use repository::notifications::NotificationRepository;
pub use repository::orders::{OrderRepository, DEFAULT_ORDERS_LIMIT};
pub use repository::sales::{SaleRepository, DEFAULT_SALES_LIMIT};
pub use repository::{scoped, Repositories, TypedCollection, TypedStream, Versioned};
