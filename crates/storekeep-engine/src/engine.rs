//! # Engine
//!
//! Main entry point for the storefront engine. Owns the store handle, the
//! event bus, and the signed-in session, and hands out owner-scoped
//! services.
//!
//! ## Engine Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Engine Architecture                             │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                            Engine                                │  │
//! │  │                                                                  │  │
//! │  │  • Holds the store handle, config, event bus, and session        │  │
//! │  │  • Hands out services scoped to the signed-in owner              │  │
//! │  │  • Runs the notification derivation loop until shutdown          │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │        ┌────────────┬─────────┼───────────┬────────────────┐           │
//! │        ▼            ▼         ▼           ▼                ▼           │
//! │  ┌──────────┐ ┌──────────┐ ┌───────────────┐ ┌──────────────────────┐ │
//! │  │ Catalog  │ │  Stock   │ │  Transaction  │ │ NotificationCenter / │ │
//! │  │          │ │  Ledger  │ │  Processor    │ │ AnalyticsAggregator  │ │
//! │  └──────────┘ └──────────┘ └───────────────┘ └──────────────────────┘ │
//! │                                                                         │
//! │  EVENT LOOP (spawned by start):                                        │
//! │  ──────────────────────────────                                        │
//! │  EngineEvent ──► skip derived outputs ──► NotificationDeriver          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! let engine = Engine::in_memory(EngineConfig::default());
//! engine.sign_in("owner-1").await?;
//! let handle = engine.start();
//!
//! let catalog = engine.catalog().await?;
//! let item = catalog.register_item(draft).await?;
//!
//! handle.shutdown().await;
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use storekeep_core::ValidationError;
use storekeep_store::{DocumentStore, MemoryStore, Repositories};

use crate::analytics::AnalyticsAggregator;
use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventBus, EventSubscription};
use crate::ledger::StockLedger;
use crate::notifications::{NotificationCenter, NotificationDeriver};
use crate::settlement::TransactionProcessor;

// =============================================================================
// Engine
// =============================================================================

/// The storefront engine.
///
/// One engine serves one signed-in owner at a time; every service it hands
/// out is scoped to that owner's records. Swapping owners is a sign-out
/// and sign-in, not a new engine.
pub struct Engine {
    /// Document store backing all records.
    store: Arc<dyn DocumentStore>,

    /// Engine configuration (tax rate, retry budget, page sizes).
    config: Arc<EngineConfig>,

    /// Event bus shared by all services.
    events: EventBus,

    /// The signed-in owner, if any.
    session: Arc<RwLock<Option<String>>>,
}

impl Engine {
    /// Creates an engine over an existing store.
    pub fn new(store: Arc<dyn DocumentStore>, config: EngineConfig) -> Self {
        let events = EventBus::new(config.events.channel_capacity);
        Engine {
            store,
            config: Arc::new(config),
            events,
            session: Arc::new(RwLock::new(None)),
        }
    }

    /// Creates an engine over a fresh in-memory store.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    /// The active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The engine's event bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribes to engine events.
    pub fn subscribe(&self) -> EventSubscription {
        self.events.subscribe()
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Signs an owner in, replacing any previous session.
    pub async fn sign_in(&self, owner: &str) -> EngineResult<()> {
        let owner = owner.trim();
        if owner.is_empty() {
            return Err(ValidationError::Required {
                field: "owner".to_string(),
            }
            .into());
        }

        let mut session = self.session.write().await;
        *session = Some(owner.to_string());
        info!(owner = %owner, "Owner signed in");
        Ok(())
    }

    /// Signs the current owner out. A no-op when nobody is signed in.
    pub async fn sign_out(&self) {
        let mut session = self.session.write().await;
        if let Some(owner) = session.take() {
            info!(owner = %owner, "Owner signed out");
        }
    }

    /// The signed-in owner id.
    pub async fn current_owner(&self) -> EngineResult<String> {
        self.session
            .read()
            .await
            .clone()
            .ok_or(EngineError::NotAuthenticated)
    }

    /// Repositories scoped to the signed-in owner.
    async fn repositories(&self) -> EngineResult<Repositories> {
        let owner = self.current_owner().await?;
        Ok(Repositories::new(Arc::clone(&self.store), owner))
    }

    // =========================================================================
    // Services
    // =========================================================================

    /// Item registration and maintenance.
    pub async fn catalog(&self) -> EngineResult<Catalog> {
        let repos = self.repositories().await?;
        Ok(Catalog::new(
            repos,
            self.events.clone(),
            Arc::clone(&self.config),
        ))
    }

    /// Manual stock adjustments.
    pub async fn ledger(&self) -> EngineResult<StockLedger> {
        let repos = self.repositories().await?;
        Ok(StockLedger::new(
            repos,
            self.events.clone(),
            Arc::clone(&self.config),
        ))
    }

    /// Sale settlement and the order lifecycle.
    pub async fn settlement(&self) -> EngineResult<TransactionProcessor> {
        let repos = self.repositories().await?;
        Ok(TransactionProcessor::new(
            repos,
            self.events.clone(),
            Arc::clone(&self.config),
        ))
    }

    /// The notification feed.
    pub async fn notifications(&self) -> EngineResult<NotificationCenter> {
        let repos = self.repositories().await?;
        Ok(NotificationCenter::new(repos, self.events.clone()))
    }

    /// Sales and inventory rollups.
    pub async fn analytics(&self) -> EngineResult<AnalyticsAggregator> {
        let repos = self.repositories().await?;
        Ok(AnalyticsAggregator::new(repos))
    }

    // =========================================================================
    // Event Loop
    // =========================================================================

    /// Spawns the notification derivation loop.
    ///
    /// The loop listens to the event bus and keeps the notification set in
    /// line with what happened. It runs until the returned handle shuts it
    /// down (or the engine itself is dropped, closing the bus).
    pub fn start(&self) -> EngineHandle {
        let sub = self.events.subscribe();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let task = tokio::spawn(Self::derivation_loop(
            Arc::clone(&self.store),
            self.events.clone(),
            Arc::clone(&self.session),
            sub,
            shutdown_rx,
        ));

        info!("Engine derivation loop started");
        EngineHandle { shutdown_tx, task }
    }

    /// Routes events into the notification deriver.
    async fn derivation_loop(
        store: Arc<dyn DocumentStore>,
        events: EventBus,
        session: Arc<RwLock<Option<String>>>,
        mut sub: EventSubscription,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                maybe = sub.recv() => {
                    let Some(event) = maybe else {
                        debug!("Event bus closed; derivation loop exiting");
                        break;
                    };
                    if event.is_derived_output() {
                        continue;
                    }

                    // The emitting service ran under a session; it can only
                    // be gone if the owner signed out since. Nothing left
                    // to derive into in that case.
                    let owner = session.read().await.clone();
                    let Some(owner) = owner else {
                        debug!(event = event.name(), "Event with no session; skipping");
                        continue;
                    };

                    let deriver = NotificationDeriver::new(
                        Repositories::new(Arc::clone(&store), owner),
                        events.clone(),
                    );
                    if let Err(err) = deriver.handle_event(&event).await {
                        error!(
                            event = event.name(),
                            error = %err,
                            "Notification derivation failed"
                        );
                    }
                }

                _ = shutdown_rx.recv() => {
                    info!("Derivation loop received shutdown");
                    break;
                }
            }
        }

        debug!("Derivation loop stopped");
    }
}

// =============================================================================
// Engine Handle
// =============================================================================

/// Handle for the running derivation loop.
pub struct EngineHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl EngineHandle {
    /// Signals the loop to stop and waits for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
