// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::entity::Entity;
use crate::query::{FindOptions, Query};

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Adapter '{0}' is not connected")]
    NotConnected(String),
    #[error("Entity '{id}' not found in '{collection}'")]
    NotFound { collection: String, id: String },
    #[error("Entity '{id}' already exists in '{collection}'")]
    Duplicate { collection: String, id: String },
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Adapter backend error: {0}")]
    Backend(String),
}

impl AdapterError {
    /// Connectivity failures are surfaced to callers immediately.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::NotConnected(_))
    }
}

/// Patch applied by `update` / `update_by_id`: keys replace fields of the same name.
pub type Patch = Map<String, Value>;

/// Uniform contract every backing store exposes.
///
/// Implementations translate these calls to their vendor API. Every call is
/// fallible and must surface errors rather than swallow them: the sync
/// manager relies on this to record per-operation failures.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Human-readable adapter name (for logs).
    fn name(&self) -> &str;

    async fn connect(&self) -> Result<(), AdapterError>;
    async fn disconnect(&self) -> Result<(), AdapterError>;
    fn is_connected(&self) -> bool;

    async fn find(
        &self,
        collection: &str,
        query: &Query,
        options: &FindOptions,
    ) -> Result<Vec<Entity>, AdapterError>;

    /// First match of `query`.
    /// Default implementation runs `find` with a limit of one.
    async fn find_one(&self, collection: &str, query: &Query) -> Result<Option<Entity>, AdapterError> {
        let options = FindOptions::default().limit(1);
        Ok(self.find(collection, query, &options).await?.into_iter().next())
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Entity>, AdapterError>;

    /// Insert a new entity. Fails with `Duplicate` if the id is taken.
    /// Returns the stored (canonical) copy.
    async fn insert(&self, collection: &str, entity: Entity) -> Result<Entity, AdapterError>;

    /// Insert several entities.
    /// Default implementation falls back to sequential inserts.
    async fn insert_many(&self, collection: &str, entities: Vec<Entity>) -> Result<Vec<Entity>, AdapterError> {
        let mut stored = Vec::with_capacity(entities.len());
        for entity in entities {
            stored.push(self.insert(collection, entity).await?);
        }
        Ok(stored)
    }

    /// Patch every entity matching `query`. Returns the number updated.
    async fn update(&self, collection: &str, query: &Query, patch: &Patch) -> Result<u64, AdapterError>;

    /// Patch one entity. Returns the updated copy, or `None` if it does not exist.
    async fn update_by_id(&self, collection: &str, id: &str, patch: &Patch) -> Result<Option<Entity>, AdapterError>;

    /// Replace one entity wholesale: attributes absent from `entity` are gone
    /// afterwards. The stored id is kept. Returns the new copy, or `None` if
    /// no entity has that id.
    ///
    /// Default implementation deletes and re-inserts; backends with a native
    /// replace should override it.
    async fn replace_by_id(&self, collection: &str, id: &str, entity: Entity) -> Result<Option<Entity>, AdapterError> {
        if !self.delete_by_id(collection, id).await? {
            return Ok(None);
        }
        let mut entity = entity;
        entity.id = id.to_string();
        Ok(Some(self.insert(collection, entity).await?))
    }

    /// Delete every entity matching `query`. Returns the number removed.
    async fn delete(&self, collection: &str, query: &Query) -> Result<u64, AdapterError>;

    /// Delete one entity. Returns `false` (not an error) when it was already absent.
    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<bool, AdapterError>;

    async fn count(&self, collection: &str, query: &Query) -> Result<u64, AdapterError>;

    async fn collection_exists(&self, collection: &str) -> Result<bool, AdapterError>;
    async fn create_collection(&self, collection: &str) -> Result<(), AdapterError>;

    /// Returns `false` if the collection did not exist.
    async fn drop_collection(&self, collection: &str) -> Result<bool, AdapterError>;

    async fn collection_names(&self) -> Result<Vec<String>, AdapterError>;
}
