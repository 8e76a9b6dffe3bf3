//! # storekeep-core: Pure Business Logic for Storekeep
//!
//! This crate is the **heart** of Storekeep. It contains all business logic
//! as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Storekeep Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Frontend (out of this workspace)                │   │
//! │  │    Catalog UI ──► POS UI ──► Orders UI ──► Reports UI          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ in-process calls                       │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  storekeep-engine (Engine Layer)                │   │
//! │  │    settle_sale, adjust_quantity, transition_order, rollups     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ storekeep-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │   error   │  │ validation│  │   │
//! │  │   │   Item    │  │   Money   │  │ CoreError │  │   rules   │  │   │
//! │  │   │ Sale/Order│  │  TaxCalc  │  │  variants │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO STORE • NO NETWORK • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 storekeep-store (Persistence Layer)             │   │
//! │  │           DocumentStore trait, memory backend, repositories    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Item, Sale, Order, Notification, etc.)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Store, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: All monetary values are in cents (i64) to avoid float errors
//! 4. **Explicit Errors**: All errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use storekeep_core::money::Money;
//! use storekeep_core::types::TaxRate;
//!
//! // Create money from cents (never from floats!)
//! let subtotal = Money::from_cents(1000); // $10.00
//!
//! // Calculate tax at the engine default rate
//! let tax_rate = TaxRate::from_bps(800); // 8%
//! let tax = subtotal.calculate_tax(tax_rate);
//!
//! // Tax on $10.00 at 8% = $0.80
//! assert_eq!(tax.cents(), 80);
//! assert_eq!((subtotal + tax).cents(), 1080);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use storekeep_core::Money` instead of
// `use storekeep_core::money::Money`

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default low-stock threshold for new products
///
/// ## Why a constant?
/// Item drafts may omit the threshold; the catalog fills in this value so
/// every product always has a usable alert boundary.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 5;

/// Default tax rate in basis points (800 = 8%)
///
/// ## Business Reason
/// Applied when the engine configuration does not override it. Stored per
/// settled sale, so later rate changes never rewrite history.
pub const DEFAULT_TAX_RATE_BPS: u32 = 800;

/// Maximum tax rate in basis points (10000 = 100%)
///
/// ## Business Reason
/// A rate above 100% is always a data-entry mistake, not a policy.
pub const MAX_TAX_RATE_BPS: u32 = 10_000;

/// Maximum distinct lines allowed in a single sale or order
///
/// ## Business Reason
/// Prevents runaway drafts and ensures reasonable transaction sizes.
/// Can be made configurable in future versions.
pub const MAX_SALE_LINES: usize = 100;

/// Maximum quantity of a single line
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10)
/// Configurable in future versions.
pub const MAX_LINE_QUANTITY: i64 = 999;
