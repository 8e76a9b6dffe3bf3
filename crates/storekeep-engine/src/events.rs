//! # Engine Events
//!
//! Broadcast events describing every committed state change.
//!
//! ## Event Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Event Fan-Out                                  │
//! │                                                                         │
//! │  catalog / ledger / settlement                                         │
//! │       │                                                                 │
//! │       │  emit(EngineEvent) after the write COMMITS                     │
//! │       ▼                                                                 │
//! │  ┌───────────────┐     ┌──────────────────────────────────────────┐    │
//! │  │   EventBus    │────▶│  NotificationDeriver (alerts + toasts)   │    │
//! │  │  (broadcast)  │     ├──────────────────────────────────────────┤    │
//! │  │               │────▶│  UI bridges / integrations               │    │
//! │  └───────────────┘     └──────────────────────────────────────────┘    │
//! │                                                                         │
//! │  Rules:                                                                │
//! │  • Events describe changes that already happened; consumers cannot     │
//! │    veto them                                                           │
//! │  • A failed operation emits nothing                                    │
//! │  • Slow subscribers skip missed events and resume with current ones    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{trace, warn};

use storekeep_core::{Item, Notification, Order, OrderStatus, Sale};

// =============================================================================
// Stock Change Reasons
// =============================================================================

/// Why a stock level moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockChangeReason {
    /// A manual adjustment (receiving, recount, shrinkage).
    Manual,

    /// Stock consumed by a settled sale.
    Sale,

    /// Stock consumed by an order reaching completion.
    Order,

    /// A rolled-back settlement returned stock it had taken.
    Compensation,
}

impl std::fmt::Display for StockChangeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StockChangeReason::Manual => write!(f, "manual"),
            StockChangeReason::Sale => write!(f, "sale"),
            StockChangeReason::Order => write!(f, "order"),
            StockChangeReason::Compensation => write!(f, "compensation"),
        }
    }
}

// =============================================================================
// Engine Events
// =============================================================================

/// A committed state change, broadcast to all subscribers.
///
/// Events carry the full written record so consumers never have to read
/// back what they were just told about.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A sale settled: stock decremented, record written.
    SaleSettled { sale: Sale },

    /// An order was created in `Pending` status.
    OrderCreated { order: Order },

    /// An order moved between statuses.
    OrderStatusChanged {
        order: Order,
        old: OrderStatus,
        new: OrderStatus,
    },

    /// A tracked item's quantity changed.
    StockAdjusted {
        item: Item,
        previous_quantity: i64,
        new_quantity: i64,
        reason: StockChangeReason,
    },

    /// A new item entered the catalog.
    ItemRegistered { item: Item },

    /// An existing item's definition changed (price, threshold, name).
    ItemUpdated { item: Item },

    /// An item left the catalog.
    ItemRemoved { item_id: String },

    /// The deriver raised (or superseded into) a notification.
    NotificationRaised { notification: Notification },

    /// A notification was deleted.
    NotificationDismissed { notification_id: String },
}

impl EngineEvent {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::SaleSettled { .. } => "sale_settled",
            EngineEvent::OrderCreated { .. } => "order_created",
            EngineEvent::OrderStatusChanged { .. } => "order_status_changed",
            EngineEvent::StockAdjusted { .. } => "stock_adjusted",
            EngineEvent::ItemRegistered { .. } => "item_registered",
            EngineEvent::ItemUpdated { .. } => "item_updated",
            EngineEvent::ItemRemoved { .. } => "item_removed",
            EngineEvent::NotificationRaised { .. } => "notification_raised",
            EngineEvent::NotificationDismissed { .. } => "notification_dismissed",
        }
    }

    /// Returns true for events the deriver itself produces.
    ///
    /// The deriver must skip these or raising a notification would feed
    /// straight back into the deriver.
    pub fn is_derived_output(&self) -> bool {
        matches!(
            self,
            EngineEvent::NotificationRaised { .. } | EngineEvent::NotificationDismissed { .. }
        )
    }
}

// =============================================================================
// Event Bus
// =============================================================================

/// Broadcast fan-out for [`EngineEvent`]s.
///
/// Cloning the bus is cheap and every clone feeds the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Creates a bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        EventBus { tx }
    }

    /// Opens a subscription starting at the current point in the stream.
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Publishes an event to all current subscribers.
    ///
    /// An event with no listeners is dropped silently; emitting is never
    /// an error path for the operation that committed the change.
    pub fn emit(&self, event: EngineEvent) {
        trace!(event = event.name(), "Emitting engine event");
        let _ = self.tx.send(event);
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

// =============================================================================
// Event Subscription
// =============================================================================

/// A single subscriber's view of the event stream.
pub struct EventSubscription {
    rx: broadcast::Receiver<EngineEvent>,
}

impl EventSubscription {
    /// Receives the next event.
    ///
    /// A subscriber that fell behind the channel capacity skips the missed
    /// events (with a warning) and resumes with current ones. Returns
    /// `None` once the bus is dropped.
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Event subscriber lagged; resuming with current events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
