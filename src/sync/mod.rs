// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Operation log and replication to secondary stores.
//!
//! Every write on the primary is mirrored by one [`SyncOperation`] per
//! registered secondary, appended to a reserved collection on the primary.
//! The [`SyncManager`] drains that log in periodic, non-overlapping cycles.
//!
//! ```text
//! pending ──claim──► executing ──ok──► completed
//!                        └────err────► failed (terminal)
//! ```

mod error;
mod manager;
mod operation;

pub use error::SyncError;
pub use manager::{SyncCycleReport, SyncManager, SyncStats};
pub use operation::{BatchOperation, SyncOperation, SyncOperationType, SyncStatus};
