// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory reference adapter.
//!
//! Backs each collection with a map guarded by a [`DashMap`] shard. Insertion
//! order is tracked with a sequence number so unsorted `find` results come
//! back in the order entities were first stored.
//!
//! Carries two fault-injection knobs for chaos-style testing:
//! - [`InMemoryAdapter::poison`]: writes touching the id fail with a backend error
//! - [`InMemoryAdapter::set_latency`]: every call sleeps before running

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::entity::Entity;
use crate::query::{FindOptions, Query};
use super::traits::{Adapter, AdapterError, Patch};

#[derive(Debug, Clone)]
struct Stored {
    seq: u64,
    entity: Entity,
}

type Collection = HashMap<String, Stored>;

pub struct InMemoryAdapter {
    name: String,
    collections: DashMap<String, Collection>,
    connected: AtomicBool,
    next_seq: AtomicU64,
    latency_ms: AtomicU64,
    poisoned: RwLock<HashSet<String>>,
}

impl InMemoryAdapter {
    /// Create a disconnected adapter. Call `connect()` before use.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: DashMap::new(),
            connected: AtomicBool::new(false),
            next_seq: AtomicU64::new(0),
            latency_ms: AtomicU64::new(0),
            poisoned: RwLock::new(HashSet::new()),
        }
    }

    /// Create an adapter that is already connected.
    #[must_use]
    pub fn connected(name: impl Into<String>) -> Self {
        let adapter = Self::new(name);
        adapter.connected.store(true, Ordering::Release);
        adapter
    }

    /// Make every write that touches `id` fail.
    pub fn poison(&self, id: impl Into<String>) {
        self.poisoned.write().insert(id.into());
    }

    pub fn heal(&self, id: &str) {
        self.poisoned.write().remove(id);
    }

    /// Delay applied to every call (zero disables).
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms.store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Number of entities in a collection (0 if missing).
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, |c| c.len())
    }

    /// All entities of a collection in insertion order.
    #[must_use]
    pub fn snapshot(&self, collection: &str) -> Vec<Entity> {
        let Some(coll) = self.collections.get(collection) else {
            return Vec::new();
        };
        let mut stored: Vec<_> = coll.values().cloned().collect();
        stored.sort_by_key(|s| s.seq);
        stored.into_iter().map(|s| s.entity).collect()
    }

    async fn enter(&self) -> Result<(), AdapterError> {
        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if !self.is_connected() {
            return Err(AdapterError::NotConnected(self.name.clone()));
        }
        Ok(())
    }

    fn check_poison(&self, id: &str) -> Result<(), AdapterError> {
        if self.poisoned.read().contains(id) {
            return Err(AdapterError::Backend(format!(
                "injected failure for '{}' on adapter '{}'", id, self.name
            )));
        }
        Ok(())
    }

    fn matching_ids(&self, collection: &str, query: &Query) -> Vec<String> {
        self.collections
            .get(collection)
            .map(|c| {
                c.iter()
                    .filter(|(_, s)| query.matches(&s.entity))
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Adapter for InMemoryAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<(), AdapterError> {
        self.connected.store(true, Ordering::Release);
        debug!(adapter = %self.name, "In-memory adapter connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), AdapterError> {
        self.connected.store(false, Ordering::Release);
        debug!(adapter = %self.name, "In-memory adapter disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn find(
        &self,
        collection: &str,
        query: &Query,
        options: &FindOptions,
    ) -> Result<Vec<Entity>, AdapterError> {
        self.enter().await?;

        let mut hits: Vec<Stored> = match self.collections.get(collection) {
            Some(coll) => coll.values().filter(|s| query.matches(&s.entity)).cloned().collect(),
            None => return Ok(Vec::new()),
        };

        // Insertion order first, then the (stable) requested sort on top.
        hits.sort_by_key(|s| s.seq);
        if !options.sort.is_empty() {
            hits.sort_by(|a, b| options.compare(&a.entity, &b.entity));
        }

        let limit = options.limit.unwrap_or(usize::MAX);
        Ok(hits.into_iter().skip(options.skip).take(limit).map(|s| s.entity).collect())
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Entity>, AdapterError> {
        self.enter().await?;
        Ok(self
            .collections
            .get(collection)
            .and_then(|c| c.get(id).map(|s| s.entity.clone())))
    }

    async fn insert(&self, collection: &str, entity: Entity) -> Result<Entity, AdapterError> {
        self.enter().await?;
        if entity.id.is_empty() {
            return Err(AdapterError::InvalidQuery("cannot insert an entity without an id".into()));
        }
        self.check_poison(&entity.id)?;

        let mut coll = self.collections.entry(collection.to_string()).or_default();
        if coll.contains_key(&entity.id) {
            return Err(AdapterError::Duplicate {
                collection: collection.to_string(),
                id: entity.id,
            });
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        coll.insert(entity.id.clone(), Stored { seq, entity: entity.clone() });
        Ok(entity)
    }

    async fn update(&self, collection: &str, query: &Query, patch: &Patch) -> Result<u64, AdapterError> {
        self.enter().await?;
        let ids = self.matching_ids(collection, query);
        for id in &ids {
            self.check_poison(id)?;
        }

        let Some(mut coll) = self.collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut updated = 0;
        for id in ids {
            if let Some(stored) = coll.get_mut(&id) {
                stored.entity.apply_patch(patch);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn update_by_id(&self, collection: &str, id: &str, patch: &Patch) -> Result<Option<Entity>, AdapterError> {
        self.enter().await?;
        self.check_poison(id)?;

        let Some(mut coll) = self.collections.get_mut(collection) else {
            return Ok(None);
        };
        Ok(coll.get_mut(id).map(|stored| {
            stored.entity.apply_patch(patch);
            stored.entity.clone()
        }))
    }

    async fn replace_by_id(&self, collection: &str, id: &str, mut entity: Entity) -> Result<Option<Entity>, AdapterError> {
        self.enter().await?;
        self.check_poison(id)?;

        let Some(mut coll) = self.collections.get_mut(collection) else {
            return Ok(None);
        };
        entity.id = id.to_string();
        Ok(coll.get_mut(id).map(|stored| {
            stored.entity = entity;
            stored.entity.clone()
        }))
    }

    async fn delete(&self, collection: &str, query: &Query) -> Result<u64, AdapterError> {
        self.enter().await?;
        let ids = self.matching_ids(collection, query);
        for id in &ids {
            self.check_poison(id)?;
        }

        let Some(mut coll) = self.collections.get_mut(collection) else {
            return Ok(0);
        };
        Ok(ids.iter().filter(|id| coll.remove(id.as_str()).is_some()).count() as u64)
    }

    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<bool, AdapterError> {
        self.enter().await?;
        self.check_poison(id)?;

        Ok(self
            .collections
            .get_mut(collection)
            .is_some_and(|mut c| c.remove(id).is_some()))
    }

    async fn count(&self, collection: &str, query: &Query) -> Result<u64, AdapterError> {
        self.enter().await?;
        Ok(self.matching_ids(collection, query).len() as u64)
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool, AdapterError> {
        self.enter().await?;
        Ok(self.collections.contains_key(collection))
    }

    async fn create_collection(&self, collection: &str) -> Result<(), AdapterError> {
        self.enter().await?;
        self.collections.entry(collection.to_string()).or_default();
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> Result<bool, AdapterError> {
        self.enter().await?;
        Ok(self.collections.remove(collection).is_some())
    }

    async fn collection_names(&self) -> Result<Vec<String>, AdapterError> {
        self.enter().await?;
        let mut names: Vec<String> = self.collections.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }
}
