//! # Engine Error Types
//!
//! Error types for ledger, settlement, and derivation operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Engine Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │     Domain      │  │     Storage     │  │     Concurrency         │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  (CoreError,    │  │  (StoreError,   │  │  ConcurrencyConflict    │ │
//! │  │   transparent)  │  │   wrapped)      │  │  (retries exhausted)    │ │
//! │  │  InsufficientSt │  │  NotFound       │  │                         │ │
//! │  │  InvalidTransit │  │  VersionConfl.  │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────────────────────────────┐  │
//! │  │  Configuration  │  │                  Session                    │  │
//! │  │                 │  │                                             │  │
//! │  │  InvalidConfig  │  │  NotAuthenticated                           │  │
//! │  │  ConfigLoad     │  │                                             │  │
//! │  │  ConfigSave     │  │                                             │  │
//! │  └─────────────────┘  └─────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use storekeep_core::{CoreError, ValidationError};
use storekeep_store::StoreError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error type covering all possible operation failures.
///
/// ## Design Principles
/// - Domain errors pass through untouched so callers can match on them
///   (a settlement that fails on stock must surface `InsufficientStock`,
///   not a stringified copy of it)
/// - Storage and concurrency failures are separated: a `VersionConflict`
///   inside one write attempt is retryable, `ConcurrencyConflict` means
///   the retry budget is already spent
/// - All errors are `Send + Sync` for async compatibility
#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// A business-rule violation from the core crate.
    #[error(transparent)]
    Domain(#[from] CoreError),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// A document store failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // =========================================================================
    // Concurrency Errors
    // =========================================================================
    /// Optimistic retries exhausted without a clean write.
    #[error("Concurrent writes kept colliding on {key} ({attempts} attempts)")]
    ConcurrencyConflict { key: String, attempts: u32 },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid engine configuration.
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Session Errors
    // =========================================================================
    /// No owner is signed in.
    #[error("No owner signed in. Call sign_in first.")]
    NotAuthenticated,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Domain(CoreError::Validation(err))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Store(StoreError::Serialization(err))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl EngineError {
    /// Returns true if a fresh read-modify-write attempt could still succeed.
    ///
    /// ## Retryable Errors
    /// - Version conflicts (someone else won the write; re-read and redo)
    /// - Transient store unavailability
    ///
    /// ## Non-Retryable Errors
    /// - Domain errors (retrying will not create stock)
    /// - Exhausted concurrency budgets
    /// - Configuration errors
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Store(e) => e.is_conflict() || e.is_transient(),
            _ => false,
        }
    }

    /// Returns true if this error came from concurrent writers, whether a
    /// single lost write or an exhausted retry budget.
    pub fn is_conflict(&self) -> bool {
        match self {
            EngineError::ConcurrencyConflict { .. } => true,
            EngineError::Store(e) => e.is_conflict(),
            _ => false,
        }
    }

    /// Returns true if this error is the caller's input's fault rather
    /// than the system's.
    pub fn is_user_error(&self) -> bool {
        matches!(self, EngineError::Domain(e) if e.is_user_error())
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidConfig(_)
                | EngineError::ConfigLoadFailed(_)
                | EngineError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        let conflict = EngineError::Store(StoreError::VersionConflict {
            collection: "users/u1/items".into(),
            id: "abc".into(),
            expected: 3,
        });
        assert!(conflict.is_retryable());
        assert!(conflict.is_conflict());

        let exhausted = EngineError::ConcurrencyConflict {
            key: "users/u1/items/abc".into(),
            attempts: 5,
        };
        assert!(!exhausted.is_retryable());
        assert!(exhausted.is_conflict());

        assert!(!EngineError::NotAuthenticated.is_retryable());
    }

    #[test]
    fn test_domain_errors_pass_through() {
        let err: EngineError = CoreError::InsufficientStock {
            item_id: "abc".into(),
            available: 1,
            requested: 3,
        }
        .into();

        assert!(matches!(
            err,
            EngineError::Domain(CoreError::InsufficientStock { available: 1, .. })
        ));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_user_error_passthrough() {
        let err: EngineError = CoreError::InvalidTransition {
            from: "completed".into(),
            to: "pending".into(),
        }
        .into();
        assert!(err.is_user_error());

        let err = EngineError::ConfigLoadFailed("missing file".into());
        assert!(!err.is_user_error());
        assert!(err.is_config_error());
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::ConcurrencyConflict {
            key: "users/u1/items/abc-123".into(),
            attempts: 5,
        };
        assert!(err.to_string().contains("abc-123"));
        assert!(err.to_string().contains("5 attempts"));
    }
}
