// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync operation data model.
//!
//! A [`SyncOperation`] is one entry of the operation log: a mutation that must
//! be replayed against a named target adapter. Operations are persisted as
//! ordinary entities in the log collection of the primary store, so the wire
//! shape (camelCase, lowercase enums) is the storage shape.
//!
//! # Example
//!
//! ```
//! use sync_orchestrator::{Entity, SyncOperation, SyncOperationType, SyncStatus};
//!
//! let op = SyncOperation::create("primary", "search", "issues", Entity::new("issue").with_id("e1"));
//! assert_eq!(op.op_type, SyncOperationType::Create);
//! assert_eq!(op.status, SyncStatus::Pending);
//! assert_eq!(op.entity_id.as_deref(), Some("e1"));
//! assert!(op.validate().is_ok());
//! ```

use std::fmt;
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use super::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperationType {
    Create,
    Update,
    Delete,
    Batch,
}

impl SyncOperationType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Batch => "batch",
        }
    }
}

impl fmt::Display for SyncOperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a logged operation: `pending → executing → completed | failed`.
///
/// `Failed` is terminal; the engine never retries or deletes an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

impl SyncStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a batch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOperation {
    #[serde(rename = "type")]
    pub op_type: SyncOperationType,
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Entity>,
}

impl BatchOperation {
    pub fn create(collection: impl Into<String>, entity: Entity) -> Self {
        Self {
            op_type: SyncOperationType::Create,
            collection: collection.into(),
            entity_id: non_empty(&entity.id),
            data: Some(entity),
        }
    }

    pub fn update(collection: impl Into<String>, id: impl Into<String>, entity: Entity) -> Self {
        Self {
            op_type: SyncOperationType::Update,
            collection: collection.into(),
            entity_id: Some(id.into()),
            data: Some(entity),
        }
    }

    pub fn delete(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            op_type: SyncOperationType::Delete,
            collection: collection.into(),
            entity_id: Some(id.into()),
            data: None,
        }
    }

    fn validate(&self) -> Result<(), SyncError> {
        if self.op_type == SyncOperationType::Batch {
            return Err(SyncError::InvalidOperation("nested batch operations are not supported".into()));
        }
        validate_step(self.op_type, &self.collection, self.entity_id.as_deref(), self.data.as_ref())
    }
}

/// A logged mutation to replay against `target_adapter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub op_type: SyncOperationType,
    pub source_adapter: String,
    pub target_adapter: String,
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Entity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_operations: Option<Vec<BatchOperation>>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<i64>,
    pub status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncOperation {
    fn base(
        op_type: SyncOperationType,
        source: impl Into<String>,
        target: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            op_type,
            source_adapter: source.into(),
            target_adapter: target.into(),
            collection: collection.into(),
            entity_id: None,
            data: None,
            batch_operations: None,
            created_at: 0,
            executed_at: None,
            status: SyncStatus::Pending,
            error: None,
        }
    }

    pub fn create(
        source: impl Into<String>,
        target: impl Into<String>,
        collection: impl Into<String>,
        entity: Entity,
    ) -> Self {
        let mut op = Self::base(SyncOperationType::Create, source, target, collection);
        op.entity_id = non_empty(&entity.id);
        op.data = Some(entity);
        op
    }

    pub fn update(
        source: impl Into<String>,
        target: impl Into<String>,
        collection: impl Into<String>,
        id: impl Into<String>,
        entity: Entity,
    ) -> Self {
        let mut op = Self::base(SyncOperationType::Update, source, target, collection);
        op.entity_id = Some(id.into());
        op.data = Some(entity);
        op
    }

    pub fn delete(
        source: impl Into<String>,
        target: impl Into<String>,
        collection: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        let mut op = Self::base(SyncOperationType::Delete, source, target, collection);
        op.entity_id = Some(id.into());
        op
    }

    /// Batch of steps applied in order. `collection` is the first step's collection.
    pub fn batch(
        source: impl Into<String>,
        target: impl Into<String>,
        operations: Vec<BatchOperation>,
    ) -> Self {
        let collection = operations.first().map(|o| o.collection.clone()).unwrap_or_default();
        let mut op = Self::base(SyncOperationType::Batch, source, target, collection);
        op.batch_operations = Some(operations);
        op
    }

    /// Check the operation carries what its type needs.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.target_adapter.is_empty() {
            return Err(SyncError::InvalidOperation("target adapter is required".into()));
        }
        match self.op_type {
            SyncOperationType::Batch => {
                let ops = self
                    .batch_operations
                    .as_deref()
                    .filter(|ops| !ops.is_empty())
                    .ok_or_else(|| SyncError::InvalidOperation("batch requires at least one operation".into()))?;
                ops.iter().try_for_each(BatchOperation::validate)
            }
            op_type => validate_step(op_type, &self.collection, self.entity_id.as_deref(), self.data.as_ref()),
        }
    }

    /// Encode as a log entity.
    pub fn to_entity(&self) -> Result<Entity, serde_json::Error> {
        serde_json::from_value(serde_json::to_value(self)?)
    }

    /// Decode from a log entity.
    pub fn from_entity(entity: &Entity) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::to_value(entity)?)
    }
}

fn non_empty(id: &str) -> Option<String> {
    (!id.is_empty()).then(|| id.to_string())
}

fn validate_step(
    op_type: SyncOperationType,
    collection: &str,
    entity_id: Option<&str>,
    data: Option<&Entity>,
) -> Result<(), SyncError> {
    if collection.is_empty() {
        return Err(SyncError::InvalidOperation(format!("{} requires a collection", op_type)));
    }
    let has_id = entity_id.is_some_and(|id| !id.is_empty());

    match op_type {
        SyncOperationType::Create => {
            let data = data.ok_or_else(|| SyncError::InvalidOperation("create requires data".into()))?;
            if !has_id && data.id.is_empty() {
                return Err(SyncError::InvalidOperation("create requires an entity id".into()));
            }
        }
        SyncOperationType::Update => {
            if !has_id {
                return Err(SyncError::InvalidOperation("update requires an entity id".into()));
            }
            if data.is_none() {
                return Err(SyncError::InvalidOperation("update requires data".into()));
            }
        }
        SyncOperationType::Delete => {
            if !has_id {
                return Err(SyncError::InvalidOperation("delete requires an entity id".into()));
            }
        }
        SyncOperationType::Batch => {
            return Err(SyncError::InvalidOperation("nested batch operations are not supported".into()));
        }
    }
    Ok(())
}
