// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use thiserror::Error;

use crate::adapter::AdapterError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("adapter '{0}' is not connected")]
    AdapterNotConnected(String),
    #[error("adapter '{0}' is not registered")]
    AdapterNotRegistered(String),
    #[error("a sync cycle is already running")]
    AlreadySyncing,
    #[error("invalid sync operation: {0}")]
    InvalidOperation(String),
    #[error("batch aborted at operation {index} of {total}: {reason}")]
    BatchAborted {
        index: usize,
        total: usize,
        reason: String,
    },
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error("operation log serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Short label for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AdapterNotConnected(_) => "not_connected",
            Self::AdapterNotRegistered(_) => "not_registered",
            Self::AlreadySyncing => "already_syncing",
            Self::InvalidOperation(_) => "invalid_operation",
            Self::BatchAborted { .. } => "batch_aborted",
            Self::Adapter(_) => "adapter",
            Self::Serialization(_) => "serialization",
        }
    }
}
