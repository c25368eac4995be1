// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the orchestrator facade.

use std::time::Duration;
use thiserror::Error;

use crate::adapter::AdapterError;
use crate::entity::Entity;
use crate::sync::SyncError;

/// Orchestrator lifecycle state.
///
/// ```text
/// Created → Connecting → Ready → Running → ShuttingDown
/// ```
///
/// Use [`super::Orchestrator::state()`] to check the current state or
/// [`super::Orchestrator::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Just created, not yet started
    Created,
    /// Connecting to the primary store
    Connecting,
    /// Primary connected and operation log initialized
    Ready,
    /// Background loops started (per config)
    Running,
    /// Graceful shutdown in progress
    ShuttingDown,
}

impl OrchestratorState {
    /// Reads and writes are accepted.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready | Self::Running)
    }
}

impl std::fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Ready => write!(f, "Ready"),
            Self::Running => write!(f, "Running"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
        }
    }
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("entity '{id}' not found in '{collection}'")]
    NotFound { collection: String, id: String },
    #[error("orchestrator is not ready (state: {0})")]
    NotReady(OrchestratorState),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Per-call write behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Refresh the cache with the written entity
    pub use_cache: bool,
    /// Fan the write out to every registered secondary
    pub sync: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self { use_cache: true, sync: true }
    }
}

impl WriteOptions {
    /// Write to the primary only.
    #[must_use]
    pub fn local() -> Self {
        Self { use_cache: true, sync: false }
    }
}

/// Per-call read behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Serve from and populate the cache
    pub use_cache: bool,
    /// TTL for entries populated by this read (cache default if unset)
    pub ttl: Option<Duration>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self { use_cache: true, ttl: None }
    }
}

impl ReadOptions {
    /// Always hit the primary and leave the cache untouched.
    #[must_use]
    pub fn bypass_cache() -> Self {
        Self { use_cache: false, ttl: None }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Published after every successful write on the primary.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Inserted { collection: String, entity: Entity },
    Updated { collection: String, entity: Entity },
    Deleted { collection: String, id: String },
}

impl ChangeEvent {
    #[must_use]
    pub fn collection(&self) -> &str {
        match self {
            Self::Inserted { collection, .. }
            | Self::Updated { collection, .. }
            | Self::Deleted { collection, .. } => collection,
        }
    }

    #[must_use]
    pub fn entity_id(&self) -> &str {
        match self {
            Self::Inserted { entity, .. } | Self::Updated { entity, .. } => &entity.id,
            Self::Deleted { id, .. } => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(format!("{}", OrchestratorState::Created), "Created");
        assert_eq!(format!("{}", OrchestratorState::Running), "Running");
        assert_eq!(format!("{}", OrchestratorState::ShuttingDown), "ShuttingDown");
    }

    #[test]
    fn test_state_readiness() {
        assert!(!OrchestratorState::Created.is_ready());
        assert!(!OrchestratorState::Connecting.is_ready());
        assert!(OrchestratorState::Ready.is_ready());
        assert!(OrchestratorState::Running.is_ready());
        assert!(!OrchestratorState::ShuttingDown.is_ready());
    }

    #[test]
    fn test_option_defaults() {
        assert_eq!(WriteOptions::default(), WriteOptions { use_cache: true, sync: true });
        assert!(!WriteOptions::local().sync);

        let read = ReadOptions::bypass_cache().with_ttl(Duration::from_secs(1));
        assert!(!read.use_cache);
        assert_eq!(read.ttl, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_event_accessors() {
        let event = ChangeEvent::Deleted { collection: "issues".into(), id: "e1".into() };
        assert_eq!(event.collection(), "issues");
        assert_eq!(event.entity_id(), "e1");

        let event = ChangeEvent::Inserted {
            collection: "issues".into(),
            entity: Entity::new("issue").with_id("e2"),
        };
        assert_eq!(event.entity_id(), "e2");
    }

    #[test]
    fn test_error_display() {
        let err = OrchestratorError::NotFound { collection: "issues".into(), id: "e1".into() };
        assert_eq!(err.to_string(), "entity 'e1' not found in 'issues'");

        let err = OrchestratorError::NotReady(OrchestratorState::Created);
        assert_eq!(err.to_string(), "orchestrator is not ready (state: Created)");
    }
}
