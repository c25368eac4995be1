// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Orchestrator facade.
//!
//! The [`Orchestrator`] ties the components together:
//! - the primary adapter (authoritative store, hosts the operation log)
//! - the [`CacheManager`] in front of primary reads
//! - the [`SyncManager`] that replays writes onto every secondary
//!
//! # Lifecycle
//!
//! ```text
//! Created → Connecting → Ready → Running → ShuttingDown
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use sync_orchestrator::{
//!     Adapter, Entity, InMemoryAdapter, Orchestrator, OrchestratorConfig,
//!     OrchestratorState, ReadOptions, WriteOptions,
//! };
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), sync_orchestrator::OrchestratorError> {
//! let primary: Arc<dyn Adapter> = Arc::new(InMemoryAdapter::new("primary"));
//! let orchestrator = Orchestrator::new(OrchestratorConfig::default(), primary);
//! orchestrator.start().await?;
//! assert_eq!(orchestrator.state(), OrchestratorState::Running);
//!
//! let entity = Entity::new("issue").with_attr("name", json!("Bug"));
//! let stored = orchestrator.insert("issues", entity, WriteOptions::default()).await?;
//! let found = orchestrator.find_by_id("issues", &stored.id, ReadOptions::default()).await?;
//! assert_eq!(found, Some(stored));
//!
//! orchestrator.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod api;
mod lifecycle;
mod types;

pub use types::{ChangeEvent, OrchestratorError, OrchestratorState, ReadOptions, WriteOptions};

use std::sync::Arc;
use tokio::sync::{broadcast, watch};

use crate::adapter::Adapter;
use crate::cache::CacheManager;
use crate::config::OrchestratorConfig;
use crate::resilience::retry::RetryConfig;
use crate::sync::SyncManager;

/// Single entry point for reads and writes across the primary, the cache
/// and the secondaries.
///
/// # Thread Safety
///
/// The orchestrator is `Send + Sync`; every method takes `&self`. Share it
/// behind an `Arc`.
pub struct Orchestrator {
    pub(super) config: OrchestratorConfig,

    /// Authoritative store
    pub(super) primary: Arc<dyn Adapter>,

    /// Read cache (filled from the primary on miss)
    pub(super) cache: Arc<CacheManager>,

    /// Operation log and replicator
    pub(super) sync: Arc<SyncManager>,

    /// Lifecycle state (broadcast to watchers)
    pub(super) state: watch::Sender<OrchestratorState>,
    pub(super) state_rx: watch::Receiver<OrchestratorState>,

    /// Change notifications
    pub(super) events: broadcast::Sender<ChangeEvent>,

    /// Backoff used when connecting adapters
    pub(super) retry: RetryConfig,
}

impl Orchestrator {
    /// Create an orchestrator over `primary`.
    ///
    /// Starts in `Created` state. Call [`start()`](Self::start) to connect
    /// and begin accepting requests.
    pub fn new(config: OrchestratorConfig, primary: Arc<dyn Adapter>) -> Self {
        let (state_tx, state_rx) = watch::channel(OrchestratorState::Created);
        let (events, _) = broadcast::channel(config.event_buffer.max(1));

        let cache = Arc::new(CacheManager::new(config.cache.clone(), Some(primary.clone())));
        let sync = Arc::new(SyncManager::new(
            config.sync.clone(),
            config.primary_name.clone(),
            primary.clone(),
        ));
        let retry = RetryConfig::from_sync_config(&config.sync);

        Self {
            config,
            primary,
            cache,
            sync,
            state: state_tx,
            state_rx,
            events,
            retry,
        }
    }

    /// Override the connection backoff (defaults to the sync retry settings).
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> OrchestratorState {
        *self.state_rx.borrow()
    }

    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<OrchestratorState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    #[must_use]
    pub fn primary(&self) -> &Arc<dyn Adapter> {
        &self.primary
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    #[must_use]
    pub fn sync_manager(&self) -> &Arc<SyncManager> {
        &self.sync
    }

    /// Receive a [`ChangeEvent`] for every successful primary write from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    pub(super) fn set_state(&self, state: OrchestratorState) {
        let _ = self.state.send(state);
        crate::metrics::set_orchestrator_state(&state.to_string());
    }

    pub(super) fn ensure_ready(&self) -> Result<(), OrchestratorError> {
        let state = self.state();
        if state.is_ready() {
            Ok(())
        } else {
            Err(OrchestratorError::NotReady(state))
        }
    }

    pub(super) fn publish(&self, event: ChangeEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
