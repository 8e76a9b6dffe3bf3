//! # Optimistic Write Retries
//!
//! Bounded retry loop for read-modify-write cycles against versioned
//! records.
//!
//! ## Collision Handling
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Two Writers, One Record                                │
//! │                                                                         │
//! │  Writer A                         Writer B                              │
//! │  ────────                         ────────                              │
//! │  read item v3 (qty 5)             read item v3 (qty 5)                  │
//! │  write(expect v3) ──✓ v4          write(expect v3) ──✗ conflict         │
//! │                                   sleep ~25ms                           │
//! │                                   read item v4 (qty 4)                  │
//! │                                   write(expect v4) ──✓ v5               │
//! │                                                                         │
//! │  Both decrements land; neither overwrites the other. The loser's       │
//! │  retry re-checks business rules against the FRESH state, so a          │
//! │  retried write can still fail with a domain error (e.g. the last       │
//! │  unit was taken).                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Backoff schedule: exponential with jitter, doubling from the configured
//! initial interval up to the cap.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::future::Future;
use tracing::{debug, warn};

use crate::config::RetrySettings;
use crate::error::{EngineError, EngineResult};

/// Runs `op` until it commits, fails with a non-retryable error, or the
/// attempt budget is spent.
///
/// ## Arguments
/// * `settings` - Attempt budget and backoff bounds
/// * `key` - A log-friendly name for the contended record
/// * `op` - One full read-modify-write attempt; called fresh each retry
///
/// ## Returns
/// The operation's value, or [`EngineError::ConcurrencyConflict`] once the
/// budget is spent on retryable failures. Non-retryable errors (domain
/// rules, missing records) pass through on the attempt that hit them.
pub async fn with_retries<T, F, Fut>(
    settings: &RetrySettings,
    key: &str,
    mut op: F,
) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EngineResult<T>>,
{
    let mut backoff = create_backoff(settings);
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(key, attempt, "Checked write committed after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() => {
                if attempt >= settings.max_attempts {
                    warn!(key, attempts = attempt, "Retry budget spent; giving up");
                    return Err(EngineError::ConcurrencyConflict {
                        key: key.to_string(),
                        attempts: attempt,
                    });
                }

                // None only occurs with a max_elapsed_time, which we never set
                let delay = backoff.next_backoff().unwrap_or(settings.max_backoff());
                debug!(
                    key,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Write collided; backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Creates the exponential backoff schedule for one retried operation.
pub(crate) fn create_backoff(settings: &RetrySettings) -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: settings.initial_backoff(),
        max_interval: settings.max_backoff(),
        multiplier: 2.0,
        max_elapsed_time: None, // Attempts are bounded by count, not wall time
        ..Default::default()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use storekeep_core::CoreError;
    use storekeep_store::StoreError;

    fn fast_settings() -> RetrySettings {
        RetrySettings {
            max_attempts: 4,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    fn conflict() -> EngineError {
        EngineError::Store(StoreError::VersionConflict {
            collection: "users/u1/items".into(),
            id: "abc".into(),
            expected: 1,
        })
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = with_retries(&fast_settings(), "items/abc", || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_until_commit() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = with_retries(&fast_settings(), "items/abc", || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(conflict())
                } else {
                    Ok("committed")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "committed");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_surfaces_conflict() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: EngineResult<()> = with_retries(&fast_settings(), "items/abc", || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(conflict())
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(EngineError::ConcurrencyConflict { attempts: 4, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_domain_error_passes_through_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: EngineResult<()> = with_retries(&fast_settings(), "items/abc", || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(CoreError::InsufficientStock {
                    item_id: "abc".into(),
                    available: 0,
                    requested: 1,
                }
                .into())
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(EngineError::Domain(CoreError::InsufficientStock { .. }))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
