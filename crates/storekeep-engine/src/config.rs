//! # Engine Configuration
//!
//! Configuration management for the settlement engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     STOREKEEP_TAX_RATE_BPS=825                                         │
//! │     STOREKEEP_RETRY_MAX_ATTEMPTS=8                                     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/storekeep/engine.toml (Linux)                            │
//! │     ~/Library/Application Support/com.storekeep.storekeep/engine.toml  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     800 bps tax, 5 retry attempts, threshold 5                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # engine.toml
//! [tax]
//! rate_bps = 800  # 8.00% applied to every settlement
//!
//! [retry]
//! max_attempts = 5
//! initial_backoff_ms = 25
//! max_backoff_ms = 500
//!
//! [query]
//! sales_limit = 50
//! orders_limit = 100
//!
//! [stock]
//! default_low_threshold = 5
//!
//! [events]
//! channel_capacity = 256
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use storekeep_core::{
    TaxRate, DEFAULT_LOW_STOCK_THRESHOLD, DEFAULT_TAX_RATE_BPS, MAX_TAX_RATE_BPS,
};
use storekeep_store::{DEFAULT_ORDERS_LIMIT, DEFAULT_SALES_LIMIT};

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Tax Settings
// =============================================================================

/// Tax applied at settlement time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxSettings {
    /// Tax rate in basis points (1 bps = 0.01%). 800 = 8.00%.
    ///
    /// Basis points keep the rate integral; the percentage form of common
    /// sales-tax rates (8.25%) is not exact in binary floating point.
    #[serde(default = "default_tax_rate_bps")]
    pub rate_bps: u32,
}

fn default_tax_rate_bps() -> u32 {
    DEFAULT_TAX_RATE_BPS
}

impl Default for TaxSettings {
    fn default() -> Self {
        TaxSettings {
            rate_bps: default_tax_rate_bps(),
        }
    }
}

// =============================================================================
// Retry Settings
// =============================================================================

/// Bounds for the optimistic-concurrency retry loops.
///
/// ## Retry Behavior
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                     Checked-Write Retry Cycle                           │
/// │                                                                         │
/// │  attempt 1: read v3 ── write(expect v3) ──✗ conflict                    │
/// │      sleep 25ms                                                         │
/// │  attempt 2: read v4 ── write(expect v4) ──✗ conflict                    │
/// │      sleep 50ms             (doubles, capped at max_backoff_ms)         │
/// │  attempt 3: read v5 ── write(expect v5) ──✓ committed as v6             │
/// │                                                                         │
/// │  After max_attempts: surface ConcurrencyConflict to the caller.        │
/// │  Collisions only happen on the SAME record; carts touching disjoint    │
/// │  items never contend.                                                   │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Maximum read-modify-write attempts per record.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff duration (milliseconds) after a lost write.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration (milliseconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_initial_backoff() -> u64 {
    25
}
fn default_max_backoff() -> u64 {
    500
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl RetrySettings {
    /// Initial backoff as a `Duration`.
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Maximum backoff as a `Duration`.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

// =============================================================================
// Query Settings
// =============================================================================

/// Default page sizes for history queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySettings {
    /// Sales returned by the recent-sales query when no limit is given.
    #[serde(default = "default_sales_limit")]
    pub sales_limit: usize,

    /// Orders returned by the recent-orders query when no limit is given.
    #[serde(default = "default_orders_limit")]
    pub orders_limit: usize,
}

fn default_sales_limit() -> usize {
    DEFAULT_SALES_LIMIT
}
fn default_orders_limit() -> usize {
    DEFAULT_ORDERS_LIMIT
}

impl Default for QuerySettings {
    fn default() -> Self {
        QuerySettings {
            sales_limit: default_sales_limit(),
            orders_limit: default_orders_limit(),
        }
    }
}

// =============================================================================
// Stock Settings
// =============================================================================

/// Stock-tracking defaults for newly registered items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockSettings {
    /// Low-stock threshold used when the item registration omits one.
    #[serde(default = "default_low_threshold")]
    pub default_low_threshold: i64,
}

fn default_low_threshold() -> i64 {
    DEFAULT_LOW_STOCK_THRESHOLD
}

impl Default for StockSettings {
    fn default() -> Self {
        StockSettings {
            default_low_threshold: default_low_threshold(),
        }
    }
}

// =============================================================================
// Event Settings
// =============================================================================

/// Event bus sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSettings {
    /// Broadcast channel capacity. Slow subscribers that fall further
    /// behind than this see a lag notice and resume with current events.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for EventSettings {
    fn default() -> Self {
        EventSettings {
            channel_capacity: default_channel_capacity(),
        }
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
///
/// ## Example Config File
/// ```toml
/// [tax]
/// rate_bps = 800
///
/// [retry]
/// max_attempts = 5
/// initial_backoff_ms = 25
/// max_backoff_ms = 500
///
/// [query]
/// sales_limit = 50
/// orders_limit = 100
///
/// [stock]
/// default_low_threshold = 5
///
/// [events]
/// channel_capacity = 256
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Tax applied at settlement.
    #[serde(default)]
    pub tax: TaxSettings,

    /// Optimistic-concurrency retry bounds.
    #[serde(default)]
    pub retry: RetrySettings,

    /// History query page sizes.
    #[serde(default)]
    pub query: QuerySettings,

    /// Stock-tracking defaults.
    #[serde(default)]
    pub stock: StockSettings,

    /// Event bus sizing.
    #[serde(default)]
    pub events: EventSettings,
}

impl EngineConfig {
    /// Creates a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (engine.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        // Try to load from config file
        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        // Override with environment variables
        config.apply_env_overrides();

        // Validate the configuration
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> EngineResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EngineError::ConfigSaveFailed("No config path available".into()))?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.tax.rate_bps > MAX_TAX_RATE_BPS {
            return Err(EngineError::InvalidConfig(format!(
                "tax.rate_bps must be at most {} (100%), got {}",
                MAX_TAX_RATE_BPS, self.tax.rate_bps
            )));
        }

        if self.retry.max_attempts == 0 {
            return Err(EngineError::InvalidConfig(
                "retry.max_attempts must be greater than 0".into(),
            ));
        }

        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(EngineError::InvalidConfig(format!(
                "retry.max_backoff_ms ({}) must not be below retry.initial_backoff_ms ({})",
                self.retry.max_backoff_ms, self.retry.initial_backoff_ms
            )));
        }

        if self.query.sales_limit == 0 || self.query.orders_limit == 0 {
            return Err(EngineError::InvalidConfig(
                "query limits must be greater than 0".into(),
            ));
        }

        if self.stock.default_low_threshold < 0 {
            return Err(EngineError::InvalidConfig(
                "stock.default_low_threshold must not be negative".into(),
            ));
        }

        if self.events.channel_capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "events.channel_capacity must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        // Tax rate
        if let Ok(bps) = std::env::var("STOREKEEP_TAX_RATE_BPS") {
            if let Ok(b) = bps.parse::<u32>() {
                debug!(rate_bps = b, "Overriding tax rate from environment");
                self.tax.rate_bps = b;
            }
        }

        // Retry attempts
        if let Ok(attempts) = std::env::var("STOREKEEP_RETRY_MAX_ATTEMPTS") {
            if let Ok(a) = attempts.parse::<u32>() {
                debug!(attempts = a, "Overriding retry attempts from environment");
                self.retry.max_attempts = a;
            }
        }

        // Query limits
        if let Ok(limit) = std::env::var("STOREKEEP_SALES_LIMIT") {
            if let Ok(l) = limit.parse::<usize>() {
                self.query.sales_limit = l;
            }
        }
        if let Ok(limit) = std::env::var("STOREKEEP_ORDERS_LIMIT") {
            if let Ok(l) = limit.parse::<usize>() {
                self.query.orders_limit = l;
            }
        }

        // Stock threshold default
        if let Ok(threshold) = std::env::var("STOREKEEP_LOW_STOCK_THRESHOLD") {
            if let Ok(t) = threshold.parse::<i64>() {
                debug!(threshold = t, "Overriding low-stock threshold from environment");
                self.stock.default_low_threshold = t;
            }
        }

        // Event channel capacity
        if let Ok(capacity) = std::env::var("STOREKEEP_EVENT_CAPACITY") {
            if let Ok(c) = capacity.parse::<usize>() {
                self.events.channel_capacity = c;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "storekeep", "storekeep").map(|dirs| {
            let config_dir = dirs.config_dir();
            config_dir.join("engine.toml")
        })
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the configured tax rate.
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax.rate_bps)
    }

    /// Returns the retry attempt budget.
    pub fn max_attempts(&self) -> u32 {
        self.retry.max_attempts
    }

    /// Returns the event channel capacity.
    pub fn channel_capacity(&self) -> usize {
        self.events.channel_capacity
    }
}
