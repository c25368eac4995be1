// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Orchestrator lifecycle: start, shutdown, secondary registration.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::adapter::Adapter;
use crate::resilience::retry::connect_with_retry;
use crate::sync::SyncError;

use super::{Orchestrator, OrchestratorError, OrchestratorState};

impl Orchestrator {
    /// Start the orchestrator.
    ///
    /// 1. Connect the primary (with retry)
    /// 2. Create the operation log collection if missing
    /// 3. Start the cache cleanup and sync loops, per config
    ///
    /// Calling `start` on a started orchestrator is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self) -> Result<(), OrchestratorError> {
        let state = self.state();
        if state.is_ready() {
            debug!(%state, "Already started");
            return Ok(());
        }
        if state != OrchestratorState::Created {
            return Err(OrchestratorError::NotReady(state));
        }

        let startup_start = std::time::Instant::now();
        info!(primary = %self.config.primary_name, "Starting orchestrator...");
        self.set_state(OrchestratorState::Connecting);

        if let Err(e) = connect_with_retry(&self.primary, &self.retry).await {
            error!(error = %e, "Failed to connect primary store");
            crate::metrics::record_error("orchestrator", "start", "connect");
            self.set_state(OrchestratorState::Created);
            return Err(e.into());
        }

        if let Err(e) = self.sync.initialize().await {
            error!(error = %e, "Failed to initialize sync operation log");
            crate::metrics::record_error("orchestrator", "start", e.kind());
            self.set_state(OrchestratorState::Created);
            return Err(e.into());
        }
        self.set_state(OrchestratorState::Ready);

        if self.config.auto_start_cleanup {
            self.cache.start_cleanup();
        }
        if self.config.auto_start_sync {
            self.sync.start_sync();
        }
        self.set_state(OrchestratorState::Running);

        info!(
            elapsed_ms = startup_start.elapsed().as_millis() as u64,
            cleanup = self.cache.is_cleanup_running(),
            sync = self.sync.is_running(),
            "Orchestrator running"
        );
        Ok(())
    }

    /// Graceful shutdown: stop both loops, then run one final sync cycle so
    /// operations enqueued just before shutdown still go out.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        let shutdown_start = std::time::Instant::now();
        info!("Initiating orchestrator shutdown...");
        self.set_state(OrchestratorState::ShuttingDown);

        self.cache.stop_cleanup();

        match self.sync.drain().await {
            Ok(report) => info!(
                completed = report.completed,
                failed = report.failed,
                "Final sync cycle complete"
            ),
            Err(SyncError::AlreadySyncing) => {
                warn!("A manual sync cycle is still running, skipping final cycle");
            }
            Err(e) => {
                warn!(error = %e, "Final sync cycle failed");
                crate::metrics::record_error("orchestrator", "shutdown", e.kind());
            }
        }

        info!(
            elapsed_ms = shutdown_start.elapsed().as_millis() as u64,
            "Orchestrator shutdown complete"
        );
    }

    /// Connect a secondary (with retry) and register it as a sync target.
    ///
    /// Only writes made after registration are fanned out to it.
    pub async fn add_secondary(&self, name: impl Into<String>, adapter: Arc<dyn Adapter>) -> Result<(), OrchestratorError> {
        let name = name.into();
        connect_with_retry(&adapter, &self.retry).await?;
        self.sync.register_adapter(name.clone(), adapter)?;
        info!(secondary = %name, "Secondary added");
        Ok(())
    }

    /// Stop fanning out to a secondary. Operations already logged for it stay
    /// in the log and fail when replayed.
    pub fn remove_secondary(&self, name: &str) -> bool {
        let removed = self.sync.unregister_adapter(name);
        if removed {
            info!(secondary = %name, "Secondary removed");
        }
        removed
    }

    /// Registered secondary names, sorted.
    #[must_use]
    pub fn secondaries(&self) -> Vec<String> {
        self.sync.adapter_names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::InMemoryAdapter;
    use crate::config::OrchestratorConfig;

    fn orchestrator(config: OrchestratorConfig) -> (Arc<InMemoryAdapter>, Orchestrator) {
        let primary = Arc::new(InMemoryAdapter::new("primary"));
        let orchestrator = Orchestrator::new(config, primary.clone() as Arc<dyn Adapter>);
        (primary, orchestrator)
    }

    #[tokio::test]
    async fn test_start_connects_and_runs() {
        let (primary, orchestrator) = orchestrator(OrchestratorConfig::default());
        assert_eq!(orchestrator.state(), OrchestratorState::Created);

        orchestrator.start().await.unwrap();

        assert_eq!(orchestrator.state(), OrchestratorState::Running);
        assert!(primary.is_connected());
        assert!(primary.collection_exists("_sync_operations").await.unwrap());
        assert!(orchestrator.cache().is_cleanup_running());
        assert!(orchestrator.sync_manager().is_running());

        // Second start is a no-op
        orchestrator.start().await.unwrap();
        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_without_loops() {
        let config = OrchestratorConfig {
            auto_start_sync: false,
            auto_start_cleanup: false,
            ..Default::default()
        };
        let (_, orchestrator) = orchestrator(config);
        orchestrator.start().await.unwrap();

        assert!(!orchestrator.cache().is_cleanup_running());
        assert!(!orchestrator.sync_manager().is_running());
    }

    #[tokio::test]
    async fn test_state_receiver_sees_transitions() {
        let (_, orchestrator) = orchestrator(OrchestratorConfig::default());
        let mut rx = orchestrator.state_receiver();

        orchestrator.start().await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), OrchestratorState::Running);

        orchestrator.shutdown().await;
        assert_eq!(*rx.borrow_and_update(), OrchestratorState::ShuttingDown);
        assert!(!orchestrator.is_ready());
    }

    #[tokio::test]
    async fn test_cannot_restart_after_shutdown() {
        let (_, orchestrator) = orchestrator(OrchestratorConfig::default());
        orchestrator.start().await.unwrap();
        orchestrator.shutdown().await;

        let err = orchestrator.start().await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NotReady(OrchestratorState::ShuttingDown)));
    }

    #[tokio::test]
    async fn test_add_and_remove_secondary() {
        let (_, orchestrator) = orchestrator(OrchestratorConfig::default());
        orchestrator.start().await.unwrap();

        let secondary = Arc::new(InMemoryAdapter::new("B"));
        orchestrator.add_secondary("B", secondary.clone() as Arc<dyn Adapter>).await.unwrap();
        assert!(secondary.is_connected(), "connected on registration");
        assert_eq!(orchestrator.secondaries(), vec!["B".to_string()]);

        assert!(orchestrator.remove_secondary("B"));
        assert!(!orchestrator.remove_secondary("B"));
        assert!(orchestrator.secondaries().is_empty());
    }
}
