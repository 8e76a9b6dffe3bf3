//! # Error Types
//!
//! Domain-specific error types for storekeep-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  storekeep-core errors (this file)                                      │
//! │  ├── CoreError        - Business rule violations                        │
//! │  └── ValidationError  - Input validation failures                       │
//! │                                                                         │
//! │  storekeep-store errors (separate crate)                                │
//! │  └── StoreError       - Document store failures                         │
//! │                                                                         │
//! │  storekeep-engine errors (separate crate)                               │
//! │  └── EngineError      - What callers see (wraps the layers below)       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → Caller               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (item id, quantities, etc.)
//! 3. Errors are enum variants, never String
//! 4. Each error variant maps to a user-facing message

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations or domain logic failures.
/// They should be caught and translated to user-friendly messages.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Item cannot be found.
    ///
    /// ## When This Occurs
    /// - Item id doesn't exist in the owner's catalog
    /// - Item was removed between a read and the follow-up write
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// Sale not found.
    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Notification not found.
    #[error("Notification not found: {0}")]
    NotificationNotFound(String),

    /// Insufficient stock to complete the adjustment.
    ///
    /// ## When This Occurs
    /// - A sale line requests more units than the item has
    /// - A manual removal would drive the quantity below zero
    ///
    /// ## Settlement Workflow
    /// ```text
    /// Settle line (qty: 5)
    ///      │
    ///      ▼
    /// Read ledger: available=3
    ///      │
    ///      ▼
    /// InsufficientStock { item_id, available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// Saga compensates already-applied lines, caller sees the error
    /// ```
    #[error("Insufficient stock for item {item_id}: available {available}, requested {requested}")]
    InsufficientStock {
        item_id: String,
        available: i64,
        requested: i64,
    },

    /// Stock operation attempted on an item that doesn't track stock.
    ///
    /// ## When This Occurs
    /// - Quantity adjustment targets a Service item
    /// - Services have no ledger entry; only Products do
    #[error("Item {item_id} does not track stock")]
    StockNotTracked { item_id: String },

    /// Order is not in a state that allows the requested transition.
    ///
    /// ## When This Occurs
    /// - Completing an order straight from Pending
    /// - Re-opening a Completed or Cancelled order
    /// - Losing a status race to a concurrent transition
    #[error("Invalid order transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// True when the error reflects a stock shortfall rather than bad input.
    ///
    /// Settlement uses this to decide whether compensation is required:
    /// stock errors happen mid-saga, validation errors happen before any
    /// ledger write.
    pub fn is_stock_error(&self) -> bool {
        matches!(
            self,
            CoreError::InsufficientStock { .. } | CoreError::StockNotTracked { .. }
        )
    }

    /// True when the error is caused by caller input and retrying the same
    /// call cannot succeed.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            CoreError::Validation(_) | CoreError::InvalidTransition { .. }
        )
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid email, invalid amount string).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Sale or order draft contains no lines.
    #[error("at least one line is required")]
    EmptyCart,

    /// A draft line references an item that doesn't exist.
    #[error("line references unknown item {item_id}")]
    UnknownItem { item_id: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
