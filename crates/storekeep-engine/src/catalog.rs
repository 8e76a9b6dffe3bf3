//! # Catalog
//!
//! Item registration and maintenance.
//!
//! ## Ownership Split With the Ledger
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Who Writes What on an Item                             │
//! │                                                                         │
//! │  Catalog (this module)              StockLedger                         │
//! │  ──────────────────────             ───────────                         │
//! │  name, category, sku                quantity                            │
//! │  price, cost                                                            │
//! │  low_stock_threshold                                                    │
//! │  registration / removal                                                 │
//! │                                                                         │
//! │  Both write through the same checked-replace loop, so a catalog        │
//! │  update racing a settlement decrement resolves by version: the         │
//! │  loser re-reads and reapplies its own fields over the fresh record.    │
//! │  A price change can never resurrect a sold-out quantity.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use storekeep_core::{validation, CoreError, Item, ItemKind};
use storekeep_store::{Repositories, TypedStream, Versioned};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::events::{EngineEvent, EventBus};
use crate::retry::with_retries;

// =============================================================================
// Drafts
// =============================================================================

/// Stock fields of a registration draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DraftKind {
    /// Register a stocked product.
    Product {
        /// Units on hand right now (zero is allowed).
        initial_quantity: i64,
        /// Alert boundary; defaults from the engine config when omitted.
        low_stock_threshold: Option<i64>,
    },
    /// Register an untracked service.
    Service,
}

impl DraftKind {
    /// Uppercase tag used in generated SKUs.
    fn sku_prefix(&self) -> &'static str {
        match self {
            DraftKind::Product { .. } => "PRODUCT",
            DraftKind::Service => "SERVICE",
        }
    }
}

/// Everything needed to register a new item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDraft {
    pub name: String,
    pub kind: DraftKind,
    pub category: String,
    pub price_cents: i64,
    /// Acquisition cost; omitted means untracked (stored as 0).
    #[serde(default)]
    pub cost_cents: Option<i64>,
    /// Business identifier; blank or omitted generates `{KIND}-{millis}`.
    #[serde(default)]
    pub sku: Option<String>,
}

/// A partial update of an item's catalog fields.
///
/// Quantity is deliberately absent: stock moves only through the ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub price_cents: Option<i64>,
    #[serde(default)]
    pub cost_cents: Option<i64>,
    #[serde(default)]
    pub sku: Option<String>,
    /// Products only; updating it on a service is rejected.
    #[serde(default)]
    pub low_stock_threshold: Option<i64>,
}

impl ItemUpdate {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.category.is_none()
            && self.price_cents.is_none()
            && self.cost_cents.is_none()
            && self.sku.is_none()
            && self.low_stock_threshold.is_none()
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// Item CRUD over one owner's catalog.
#[derive(Clone)]
pub struct Catalog {
    repos: Repositories,
    events: EventBus,
    config: Arc<EngineConfig>,
}

// Manual impl: `Repositories` holds a `dyn DocumentStore` without a `Debug`
// bound, so the derive does not apply.
impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog").finish_non_exhaustive()
    }
}

impl Catalog {
    /// Creates a catalog service.
    pub fn new(repos: Repositories, events: EventBus, config: Arc<EngineConfig>) -> Self {
        Catalog {
            repos,
            events,
            config,
        }
    }

    /// Registers a new item and returns the stored record.
    ///
    /// ## Defaults
    /// * SKU: `{KIND}-{unix_millis}` when blank or omitted
    /// * Low-stock threshold: the configured default (5) when omitted
    /// * Cost: 0 when omitted
    pub async fn register_item(&self, draft: ItemDraft) -> EngineResult<Item> {
        validation::validate_item_name(&draft.name)?;
        validation::validate_category(&draft.category)?;
        validation::validate_price_cents(draft.price_cents)?;
        if let Some(cost) = draft.cost_cents {
            validation::validate_cost_cents(cost)?;
        }

        let now = Utc::now();

        let sku = match normalized(draft.sku.as_deref()) {
            Some(sku) => {
                validation::validate_sku(sku)?;
                sku.to_string()
            }
            None => format!("{}-{}", draft.kind.sku_prefix(), now.timestamp_millis()),
        };

        let kind = match draft.kind {
            DraftKind::Product {
                initial_quantity,
                low_stock_threshold,
            } => {
                validation::validate_initial_quantity(initial_quantity)?;
                let threshold =
                    low_stock_threshold.unwrap_or(self.config.stock.default_low_threshold);
                validation::validate_threshold(threshold)?;
                ItemKind::Product {
                    quantity: initial_quantity,
                    low_stock_threshold: threshold,
                }
            }
            DraftKind::Service => ItemKind::Service,
        };

        let item = Item {
            id: Uuid::new_v4().to_string(),
            name: draft.name.trim().to_string(),
            kind,
            category: draft.category.trim().to_string(),
            price_cents: draft.price_cents,
            cost_cents: draft.cost_cents.unwrap_or(0),
            sku,
            created_at: now,
            updated_at: now,
        };

        self.repos.items().insert(&item).await?;

        info!(id = %item.id, sku = %item.sku, name = %item.name, "Item registered");
        self.events.emit(EngineEvent::ItemRegistered { item: item.clone() });

        Ok(item)
    }

    /// Applies a partial update to an item's catalog fields.
    ///
    /// Runs as a checked replace so a concurrent quantity change is never
    /// overwritten: on conflict the patch is reapplied over the fresh
    /// record.
    pub async fn update_item(&self, item_id: &str, update: ItemUpdate) -> EngineResult<Item> {
        if let Some(ref name) = update.name {
            validation::validate_item_name(name)?;
        }
        if let Some(ref category) = update.category {
            validation::validate_category(category)?;
        }
        if let Some(price) = update.price_cents {
            validation::validate_price_cents(price)?;
        }
        if let Some(cost) = update.cost_cents {
            validation::validate_cost_cents(cost)?;
        }
        if let Some(ref sku) = update.sku {
            validation::validate_sku(sku.trim())?;
        }
        if let Some(threshold) = update.low_stock_threshold {
            validation::validate_threshold(threshold)?;
        }

        if update.is_empty() {
            // Nothing to write; hand back the current record
            return self.get_item(item_id).await;
        }

        let key = format!("items/{}", item_id);
        let updated = with_retries(&self.config.retry, &key, || {
            let items = self.repos.items();
            let item_id = item_id.to_string();
            let update = update.clone();
            async move {
                let Some(Versioned {
                    value: mut item,
                    version,
                }) = items.get(&item_id).await?
                else {
                    return Err(CoreError::ItemNotFound(item_id).into());
                };

                if let Some(name) = update.name {
                    item.name = name.trim().to_string();
                }
                if let Some(category) = update.category {
                    item.category = category.trim().to_string();
                }
                if let Some(price) = update.price_cents {
                    item.price_cents = price;
                }
                if let Some(cost) = update.cost_cents {
                    item.cost_cents = cost;
                }
                if let Some(sku) = update.sku {
                    item.sku = sku.trim().to_string();
                }
                if let Some(threshold) = update.low_stock_threshold {
                    match item.kind {
                        ItemKind::Product { quantity, .. } => {
                            item.kind = ItemKind::Product {
                                quantity,
                                low_stock_threshold: threshold,
                            };
                        }
                        ItemKind::Service => {
                            return Err(CoreError::StockNotTracked { item_id }.into());
                        }
                    }
                }
                item.updated_at = Utc::now();

                items.replace_checked(&item_id, version, &item).await?;
                Ok(item)
            }
        })
        .await?;

        info!(id = %item_id, "Item updated");
        self.events.emit(EngineEvent::ItemUpdated {
            item: updated.clone(),
        });

        Ok(updated)
    }

    /// Removes an item from the catalog.
    pub async fn remove_item(&self, item_id: &str) -> EngineResult<()> {
        let Some(current) = self.repos.items().get(item_id).await? else {
            return Err(CoreError::ItemNotFound(item_id.to_string()).into());
        };

        self.repos.items().delete(item_id).await?;

        info!(id = %item_id, name = %current.value.name, "Item removed");
        self.events.emit(EngineEvent::ItemRemoved {
            item_id: item_id.to_string(),
        });

        Ok(())
    }

    /// Fetches one item.
    pub async fn get_item(&self, item_id: &str) -> EngineResult<Item> {
        self.repos
            .items()
            .get(item_id)
            .await?
            .map(|v| v.value)
            .ok_or_else(|| CoreError::ItemNotFound(item_id.to_string()).into())
    }

    /// Lists the catalog ordered by name.
    pub async fn list_items(&self) -> EngineResult<Vec<Item>> {
        Ok(self.repos.items().list().await?)
    }

    /// Subscribes to catalog snapshots (name-ordered, full set per change).
    pub async fn watch_items(&self) -> EngineResult<TypedStream<Item>> {
        Ok(self.repos.items().watch().await?)
    }
}

/// Trims and drops blank strings.
fn normalized(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use storekeep_core::{StockStatus, ValidationError};
    use storekeep_store::MemoryStore;

    fn fixture() -> (Catalog, Repositories, EventBus) {
        let store = Arc::new(MemoryStore::new());
        let repos = Repositories::new(store, "u1");
        let events = EventBus::new(32);
        let mut config = EngineConfig::default();
        config.retry.initial_backoff_ms = 1;
        config.retry.max_backoff_ms = 2;
        let catalog = Catalog::new(repos.clone(), events.clone(), Arc::new(config));
        (catalog, repos, events)
    }

    fn product_draft(name: &str, quantity: i64) -> ItemDraft {
        ItemDraft {
            name: name.to_string(),
            kind: DraftKind::Product {
                initial_quantity: quantity,
                low_stock_threshold: None,
            },
            category: "Drinks".to_string(),
            price_cents: 299,
            cost_cents: Some(120),
            sku: None,
        }
    }

    #[tokio::test]
    async fn test_register_product_with_defaults() {
        let (catalog, repos, _events) = fixture();

        let item = catalog.register_item(product_draft("Cola", 10)).await.unwrap();

        assert_eq!(item.kind.quantity(), Some(10));
        assert_eq!(item.kind.low_stock_threshold(), Some(5));
        assert!(item.sku.starts_with("PRODUCT-"));
        assert_eq!(item.stock_status(), StockStatus::InStock);

        let stored = repos.items().get(&item.id).await.unwrap().unwrap();
        assert_eq!(stored.value.name, "Cola");
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_register_service_has_no_stock() {
        let (catalog, _repos, _events) = fixture();

        let item = catalog
            .register_item(ItemDraft {
                name: "Screen Repair".to_string(),
                kind: DraftKind::Service,
                category: "Services".to_string(),
                price_cents: 4999,
                cost_cents: None,
                sku: Some("  ".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(item.kind, ItemKind::Service);
        assert_eq!(item.cost_cents, 0);
        // Blank SKU falls back to the generated form
        assert!(item.sku.starts_with("SERVICE-"));
        assert_eq!(item.stock_status(), StockStatus::NotTracked);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_drafts() {
        let (catalog, _repos, _events) = fixture();

        let err = catalog.register_item(product_draft("", 1)).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Domain(CoreError::Validation(ValidationError::Required { .. }))
        ));

        let mut negative_price = product_draft("Cola", 1);
        negative_price.price_cents = -5;
        assert!(catalog.register_item(negative_price).await.is_err());

        let negative_quantity = product_draft("Cola", -1);
        assert!(catalog.register_item(negative_quantity).await.is_err());
    }

    #[tokio::test]
    async fn test_register_emits_event() {
        let (catalog, _repos, events) = fixture();
        let mut sub = events.subscribe();

        let item = catalog.register_item(product_draft("Cola", 3)).await.unwrap();

        let event = sub.recv().await.unwrap();
        assert!(matches!(
            event,
            EngineEvent::ItemRegistered { item: registered } if registered.id == item.id
        ));
    }

    #[tokio::test]
    async fn test_update_patches_fields_and_keeps_quantity() {
        let (catalog, repos, _events) = fixture();
        let item = catalog.register_item(product_draft("Cola", 10)).await.unwrap();

        let updated = catalog
            .update_item(
                &item.id,
                ItemUpdate {
                    name: Some("Cola Zero".to_string()),
                    price_cents: Some(349),
                    low_stock_threshold: Some(2),
                    ..ItemUpdate::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Cola Zero");
        assert_eq!(updated.price_cents, 349);
        assert_eq!(updated.kind.quantity(), Some(10));
        assert_eq!(updated.kind.low_stock_threshold(), Some(2));
        assert_eq!(updated.category, "Drinks");

        let stored = repos.items().get(&item.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_update_threshold_on_service_rejected() {
        let (catalog, _repos, _events) = fixture();
        let item = catalog
            .register_item(ItemDraft {
                name: "Repair".to_string(),
                kind: DraftKind::Service,
                category: "Services".to_string(),
                price_cents: 4999,
                cost_cents: None,
                sku: None,
            })
            .await
            .unwrap();

        let err = catalog
            .update_item(
                &item.id,
                ItemUpdate {
                    low_stock_threshold: Some(3),
                    ..ItemUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Domain(CoreError::StockNotTracked { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_update_is_a_read() {
        let (catalog, repos, _events) = fixture();
        let item = catalog.register_item(product_draft("Cola", 1)).await.unwrap();

        let unchanged = catalog.update_item(&item.id, ItemUpdate::default()).await.unwrap();
        assert_eq!(unchanged.name, "Cola");

        let stored = repos.items().get(&item.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_remove_item() {
        let (catalog, repos, events) = fixture();
        let item = catalog.register_item(product_draft("Cola", 1)).await.unwrap();
        let mut sub = events.subscribe();

        catalog.remove_item(&item.id).await.unwrap();
        assert!(repos.items().get(&item.id).await.unwrap().is_none());

        let event = sub.recv().await.unwrap();
        assert!(matches!(
            event,
            EngineEvent::ItemRemoved { item_id } if item_id == item.id
        ));

        // A second removal reports the miss
        let err = catalog.remove_item(&item.id).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Domain(CoreError::ItemNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_is_name_ordered() {
        let (catalog, _repos, _events) = fixture();
        catalog.register_item(product_draft("Tea", 1)).await.unwrap();
        catalog.register_item(product_draft("Cola", 1)).await.unwrap();
        catalog.register_item(product_draft("Soda", 1)).await.unwrap();

        let names: Vec<String> = catalog
            .list_items()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["Cola", "Soda", "Tea"]);
    }
}
