//! # Notifications
//!
//! Derives operator-facing alerts from engine events and serves the
//! notification feed.
//!
//! ## Derivation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    One-Way Derivation                                   │
//! │                                                                         │
//! │  StockAdjusted ─┐                                                       │
//! │  ItemRegistered ─┤                                                      │
//! │  ItemUpdated ───┼──► NotificationDeriver ──► notification records      │
//! │  ItemRemoved ───┤         │                                             │
//! │  SaleSettled ───┤         └──► NotificationRaised / Dismissed events   │
//! │  OrderCreated ──┘                        │                              │
//! │                                          ▼                              │
//! │                              ignored by the deriver                     │
//! │                         (its own outputs never feed back)               │
//! │                                                                         │
//! │  Stock alerts are keyed: at most one live record per                   │
//! │  (item, LowStock|OutOfStock). A repeat event refreshes the message     │
//! │  in place; a class change retires the old alert and raises the new    │
//! │  one; recovery retires both. Toasts (Info/Success/Error) are           │
//! │  fire-and-forget and never deduplicate.                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use storekeep_core::{CoreError, Item, Notification, NotificationKind, StockStatus};
use storekeep_store::{Repositories, TypedStream};

use crate::error::EngineResult;
use crate::events::{EngineEvent, EventBus};

// =============================================================================
// Deriver
// =============================================================================

/// Turns engine events into notification records.
///
/// Runs on the engine's event loop; every write it makes is announced as a
/// `NotificationRaised` or `NotificationDismissed` event, which it ignores
/// on the way back in.
#[derive(Clone)]
pub struct NotificationDeriver {
    repos: Repositories,
    events: EventBus,
}

impl NotificationDeriver {
    /// Creates a deriver for one owner's notification set.
    pub fn new(repos: Repositories, events: EventBus) -> Self {
        NotificationDeriver { repos, events }
    }

    /// Reacts to one engine event.
    pub async fn handle_event(&self, event: &EngineEvent) -> EngineResult<()> {
        match event {
            EngineEvent::StockAdjusted { item, .. } | EngineEvent::ItemUpdated { item } => {
                self.sync_stock_alerts(item).await?;
            }
            EngineEvent::ItemRegistered { item } => {
                self.toast(
                    NotificationKind::Success,
                    Some(item.id.clone()),
                    "Item Added",
                    format!("{} has been added to your inventory", item.name),
                )
                .await?;
                // A product registered at or below its threshold alerts
                // right away, not on its first adjustment
                self.sync_stock_alerts(item).await?;
            }
            EngineEvent::ItemRemoved { item_id } => {
                self.retire_all_alerts(item_id).await?;
            }
            EngineEvent::SaleSettled { sale } => {
                self.toast(
                    NotificationKind::Success,
                    None,
                    "Sale Completed",
                    format!("Sale completed! Total: {}", sale.total()),
                )
                .await?;
            }
            EngineEvent::OrderCreated { order } => {
                self.toast(
                    NotificationKind::Success,
                    None,
                    "Order Created",
                    format!("Order {} created successfully!", order.order_number),
                )
                .await?;
            }
            EngineEvent::OrderStatusChanged { order, new, .. } => {
                self.toast(
                    NotificationKind::Info,
                    None,
                    "Order Updated",
                    format!("Order {} is now {}", order.order_number, new),
                )
                .await?;
            }
            // Our own outputs; reacting to them would loop forever
            EngineEvent::NotificationRaised { .. } | EngineEvent::NotificationDismissed { .. } => {}
        }
        Ok(())
    }

    /// Brings the item's stock alerts in line with its current level.
    async fn sync_stock_alerts(&self, item: &Item) -> EngineResult<()> {
        let desired = match item.stock_status() {
            StockStatus::OutOfStock => Some(NotificationKind::OutOfStock),
            StockStatus::LowStock => Some(NotificationKind::LowStock),
            StockStatus::InStock | StockStatus::NotTracked => None,
        };

        match desired {
            Some(NotificationKind::OutOfStock) => {
                self.ensure_alert(item, NotificationKind::OutOfStock).await?;
                self.retire_alert(&item.id, NotificationKind::LowStock).await?;
            }
            Some(NotificationKind::LowStock) => {
                self.ensure_alert(item, NotificationKind::LowStock).await?;
                self.retire_alert(&item.id, NotificationKind::OutOfStock).await?;
            }
            _ => {
                self.retire_alert(&item.id, NotificationKind::LowStock).await?;
                self.retire_alert(&item.id, NotificationKind::OutOfStock).await?;
            }
        }

        Ok(())
    }

    /// Raises the keyed alert, or refreshes the live one in place.
    ///
    /// A refresh keeps the record id and read flag and emits nothing: the
    /// operator already has this alert in front of them.
    async fn ensure_alert(&self, item: &Item, kind: NotificationKind) -> EngineResult<()> {
        let (title, message) = alert_content(item, kind);
        let notifications = self.repos.notifications();

        match notifications.find_stock_alert(&item.id, kind).await? {
            Some(existing) => {
                if existing.message != message {
                    debug!(item_id = %item.id, kind = ?kind, "Refreshing stock alert");
                    notifications.refresh(&existing.id, &message, Utc::now()).await?;
                }
            }
            None => {
                let notification = Notification {
                    id: Uuid::new_v4().to_string(),
                    kind,
                    subject_item_id: Some(item.id.clone()),
                    title: title.to_string(),
                    message,
                    emitted_at: Utc::now(),
                    read: false,
                };
                info!(item_id = %item.id, kind = ?kind, "Raising stock alert");
                notifications.insert(&notification).await?;
                self.events
                    .emit(EngineEvent::NotificationRaised { notification });
            }
        }

        Ok(())
    }

    /// Retires the keyed alert if one is live.
    async fn retire_alert(&self, item_id: &str, kind: NotificationKind) -> EngineResult<()> {
        let notifications = self.repos.notifications();
        if let Some(existing) = notifications.find_stock_alert(item_id, kind).await? {
            debug!(item_id = %item_id, kind = ?kind, "Retiring stock alert");
            notifications.delete(&existing.id).await?;
            self.events.emit(EngineEvent::NotificationDismissed {
                notification_id: existing.id,
            });
        }
        Ok(())
    }

    /// Retires every stock alert about an item. Toasts that happen to
    /// reference it stay.
    async fn retire_all_alerts(&self, item_id: &str) -> EngineResult<()> {
        let notifications = self.repos.notifications();
        for alert in notifications.stock_alerts_for_item(item_id).await? {
            notifications.delete(&alert.id).await?;
            self.events.emit(EngineEvent::NotificationDismissed {
                notification_id: alert.id,
            });
        }
        Ok(())
    }

    /// Inserts a fire-and-forget toast.
    async fn toast(
        &self,
        kind: NotificationKind,
        subject_item_id: Option<String>,
        title: &str,
        message: String,
    ) -> EngineResult<()> {
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            kind,
            subject_item_id,
            title: title.to_string(),
            message,
            emitted_at: Utc::now(),
            read: false,
        };
        self.repos.notifications().insert(&notification).await?;
        self.events
            .emit(EngineEvent::NotificationRaised { notification });
        Ok(())
    }
}

/// Title and message for a stock alert.
fn alert_content(item: &Item, kind: NotificationKind) -> (&'static str, String) {
    match kind {
        NotificationKind::OutOfStock => {
            ("Out of Stock", format!("{} is out of stock", item.name))
        }
        _ => (
            "Low Stock Alert",
            format!(
                "{} is running low ({} remaining)",
                item.name,
                item.kind.quantity().unwrap_or(0)
            ),
        ),
    }
}

// =============================================================================
// Center
// =============================================================================

/// The operator's view of the notification feed.
#[derive(Clone)]
pub struct NotificationCenter {
    repos: Repositories,
    events: EventBus,
}

impl NotificationCenter {
    /// Creates a center for one owner's notifications.
    pub fn new(repos: Repositories, events: EventBus) -> Self {
        NotificationCenter { repos, events }
    }

    /// All notifications, newest first.
    pub async fn list(&self) -> EngineResult<Vec<Notification>> {
        Ok(self.repos.notifications().list().await?)
    }

    /// Number of unread notifications (the badge count).
    pub async fn unread_count(&self) -> EngineResult<usize> {
        Ok(self.repos.notifications().unread_count().await?)
    }

    /// Marks one notification read.
    pub async fn mark_read(&self, notification_id: &str) -> EngineResult<()> {
        let notifications = self.repos.notifications();
        if notifications.get(notification_id).await?.is_none() {
            return Err(CoreError::NotificationNotFound(notification_id.to_string()).into());
        }
        notifications.mark_read(notification_id).await?;
        Ok(())
    }

    /// Marks everything read. Returns how many changed.
    pub async fn mark_all_read(&self) -> EngineResult<usize> {
        Ok(self.repos.notifications().mark_all_read().await?)
    }

    /// Removes one notification from the feed.
    pub async fn dismiss(&self, notification_id: &str) -> EngineResult<()> {
        let notifications = self.repos.notifications();
        if notifications.get(notification_id).await?.is_none() {
            return Err(CoreError::NotificationNotFound(notification_id.to_string()).into());
        }
        notifications.delete(notification_id).await?;
        self.events.emit(EngineEvent::NotificationDismissed {
            notification_id: notification_id.to_string(),
        });
        Ok(())
    }

    /// Empties the feed. Returns how many were removed.
    ///
    /// Bulk clearing emits no per-record events; subscribers resync from
    /// the (now empty) list instead of replaying hundreds of dismissals.
    pub async fn clear_all(&self) -> EngineResult<usize> {
        let removed = self.repos.notifications().clear_all().await?;
        info!(removed, "Cleared notification feed");
        Ok(removed)
    }

    /// Subscribes to the feed, newest first.
    pub async fn watch(&self) -> EngineResult<TypedStream<Notification>> {
        Ok(self.repos.notifications().watch().await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
