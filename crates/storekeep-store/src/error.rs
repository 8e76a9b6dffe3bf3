//! # Store Error Types
//!
//! Error types for document store operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  Backend failure (network blip, closed store, bad payload)             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StoreError (this module) ← Adds context and categorization            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  EngineError (storekeep-engine) ← Retried if transient, else surfaced  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Caller decides: compensate, report, or bubble up                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Document store operation errors.
///
/// These errors wrap backend failures and provide the categorization the
/// engine's retry and compensation logic depends on.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record not found in the collection.
    ///
    /// ## When This Occurs
    /// - `update`/`update_checked` targets an id that doesn't exist
    /// - Record was deleted between a read and the follow-up write
    #[error("{collection}/{id} not found")]
    NotFound { collection: String, id: String },

    /// A record with this id already exists.
    ///
    /// ## When This Occurs
    /// - `create` races another creator for the same id
    /// - Counter documents being initialized concurrently
    #[error("{collection}/{id} already exists")]
    AlreadyExists { collection: String, id: String },

    /// Optimistic version check failed.
    ///
    /// ## When This Occurs
    /// - `update_checked` ran with a stale version: another writer
    ///   committed first
    ///
    /// The caller re-reads and retries; the engine bounds those retries.
    #[error("Version conflict on {collection}/{id}: expected v{expected}")]
    VersionConflict {
        collection: String,
        id: String,
        expected: u64,
    },

    /// Record body could not be serialized or deserialized.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record body is not a JSON object.
    ///
    /// Every stored record is an object so top-level merge is well defined.
    #[error("Record body must be a JSON object")]
    NotAnObject,

    /// Backend temporarily unavailable.
    ///
    /// ## When This Occurs
    /// - Network blip to a hosted backend
    /// - Backend shedding load
    ///
    /// Safe to retry with backoff.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Permanent backend failure.
    #[error("Store backend error: {0}")]
    Backend(String),

    /// Store or subscription has been shut down.
    #[error("Store is closed")]
    Closed,
}

impl StoreError {
    /// Creates a NotFound error for a given collection and id.
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Creates an AlreadyExists error.
    pub fn already_exists(collection: impl Into<String>, id: impl Into<String>) -> Self {
        StoreError::AlreadyExists {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// True when retrying the same call later may succeed.
    ///
    /// Version conflicts are NOT transient in this sense: they need a
    /// re-read first, which the caller's CAS loop performs.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }

    /// True when an optimistic write lost its race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = StoreError::not_found("users/u1/items", "itm-1");
        assert_eq!(err.to_string(), "users/u1/items/itm-1 not found");

        let err = StoreError::VersionConflict {
            collection: "users/u1/items".to_string(),
            id: "itm-1".to_string(),
            expected: 4,
        };
        assert_eq!(
            err.to_string(),
            "Version conflict on users/u1/items/itm-1: expected v4"
        );
    }

    #[test]
    fn test_categorization() {
        assert!(StoreError::Unavailable("blip".to_string()).is_transient());
        assert!(!StoreError::Backend("broken".to_string()).is_transient());

        let conflict = StoreError::VersionConflict {
            collection: "c".to_string(),
            id: "i".to_string(),
            expected: 1,
        };
        assert!(conflict.is_conflict());
        assert!(!conflict.is_transient());
    }
}
