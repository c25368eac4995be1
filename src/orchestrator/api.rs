// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! CRUD surface of the orchestrator.
//!
//! Writes go to the primary first; only after it succeeds is the cache
//! refreshed and one sync operation enqueued per registered secondary.
//! Reads are cache-first unless the caller opts out.

use serde_json::Value;
use tracing::{debug, warn};

use crate::adapter::Patch;
use crate::entity::{now_millis, Entity};
use crate::metrics::LatencyTimer;
use crate::query::{FindOptions, Query};
use crate::sync::SyncOperation;

use super::{ChangeEvent, Orchestrator, OrchestratorError, ReadOptions, WriteOptions};

impl Orchestrator {
    // --- Writes ---

    /// Insert an entity, assigning an id and timestamps where missing.
    ///
    /// Returns the stored copy.
    #[tracing::instrument(skip(self, entity, options), fields(id))]
    pub async fn insert(&self, collection: &str, mut entity: Entity, options: WriteOptions) -> Result<Entity, OrchestratorError> {
        self.ensure_ready()?;
        let _timer = LatencyTimer::new("orchestrator", "insert");

        entity.ensure_identity();
        tracing::Span::current().record("id", entity.id.as_str());

        let stored = self.primary.insert(collection, entity).await.map_err(|e| {
            crate::metrics::record_error("orchestrator", "insert", "primary");
            e
        })?;

        if options.use_cache {
            self.cache.set(collection, &stored.id, stored.clone(), None);
        }
        if options.sync {
            let source = &self.config.primary_name;
            self.fan_out("create", |target| {
                SyncOperation::create(source, target, collection, stored.clone())
            })
            .await;
        }

        self.publish(ChangeEvent::Inserted {
            collection: collection.to_string(),
            entity: stored.clone(),
        });
        debug!("Inserted");
        Ok(stored)
    }

    /// Insert several entities in order. Stops at the first failure; entities
    /// inserted before it stay inserted.
    pub async fn insert_many(&self, collection: &str, entities: Vec<Entity>, options: WriteOptions) -> Result<Vec<Entity>, OrchestratorError> {
        let mut stored = Vec::with_capacity(entities.len());
        for entity in entities {
            stored.push(self.insert(collection, entity, options).await?);
        }
        Ok(stored)
    }

    /// Apply a patch to an existing entity. `updatedAt` is stamped with now.
    ///
    /// Returns the updated copy, or `NotFound` if the primary has no such entity.
    #[tracing::instrument(skip(self, patch, options))]
    pub async fn update(&self, collection: &str, id: &str, mut patch: Patch, options: WriteOptions) -> Result<Entity, OrchestratorError> {
        self.ensure_ready()?;
        let _timer = LatencyTimer::new("orchestrator", "update");

        patch.insert("updatedAt".to_string(), Value::from(now_millis()));

        let updated = self
            .primary
            .update_by_id(collection, id, &patch)
            .await
            .map_err(|e| {
                crate::metrics::record_error("orchestrator", "update", "primary");
                e
            })?
            .ok_or_else(|| OrchestratorError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;

        if options.use_cache {
            self.cache.set(collection, id, updated.clone(), None);
        } else {
            self.cache.remove(collection, id);
        }
        if options.sync {
            let source = &self.config.primary_name;
            self.fan_out("update", |target| {
                SyncOperation::update(source, target, collection, id, updated.clone())
            })
            .await;
        }

        self.publish(ChangeEvent::Updated {
            collection: collection.to_string(),
            entity: updated.clone(),
        });
        debug!("Updated");
        Ok(updated)
    }

    /// Delete an entity. Returns `false` (and fans nothing out) if it did
    /// not exist on the primary.
    #[tracing::instrument(skip(self, options))]
    pub async fn delete(&self, collection: &str, id: &str, options: WriteOptions) -> Result<bool, OrchestratorError> {
        self.ensure_ready()?;
        let _timer = LatencyTimer::new("orchestrator", "delete");

        self.cache.remove(collection, id);
        if self.primary.find_by_id(collection, id).await?.is_none() {
            debug!("Delete of missing entity");
            return Ok(false);
        }

        let removed = self.primary.delete_by_id(collection, id).await.map_err(|e| {
            crate::metrics::record_error("orchestrator", "delete", "primary");
            e
        })?;
        if !removed {
            return Ok(false);
        }

        if options.sync {
            let source = &self.config.primary_name;
            self.fan_out("delete", |target| {
                SyncOperation::delete(source, target, collection, id)
            })
            .await;
        }

        self.publish(ChangeEvent::Deleted {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        debug!("Deleted");
        Ok(true)
    }

    /// Enqueue one operation per registered secondary, sequentially.
    ///
    /// Failures are logged and counted, never returned. Returns how many
    /// operations were enqueued.
    async fn fan_out<F>(&self, op_type: &str, build: F) -> usize
    where
        F: Fn(&str) -> SyncOperation,
    {
        let mut enqueued = 0;
        for target in self.sync.adapter_names() {
            match self.sync.create_sync_operation(build(&target)).await {
                Ok(op_id) => {
                    crate::metrics::record_fanout(&target, true);
                    debug!(target = %target, op_id = %op_id, op_type, "Fan-out enqueued");
                    enqueued += 1;
                }
                Err(e) => {
                    crate::metrics::record_fanout(&target, false);
                    warn!(target = %target, op_type, error = %e, "Fan-out enqueue failed");
                }
            }
        }
        enqueued
    }

    // --- Reads ---

    /// Look up by id, cache first.
    #[tracing::instrument(skip(self, options), fields(cache_hit))]
    pub async fn find_by_id(&self, collection: &str, id: &str, options: ReadOptions) -> Result<Option<Entity>, OrchestratorError> {
        self.ensure_ready()?;
        let _timer = LatencyTimer::new("orchestrator", "find_by_id");

        if options.use_cache {
            if let Some(entity) = self.cache.get(collection, id) {
                tracing::Span::current().record("cache_hit", true);
                return Ok(Some(entity));
            }
        }
        tracing::Span::current().record("cache_hit", false);

        let found = self.primary.find_by_id(collection, id).await?;
        if options.use_cache {
            if let Some(ref entity) = found {
                self.cache.set(collection, id, entity.clone(), options.ttl);
            }
        }
        Ok(found)
    }

    /// First match of `query`. An id-equality query is served like
    /// [`find_by_id`](Self::find_by_id).
    pub async fn find_one(&self, collection: &str, query: &Query, options: ReadOptions) -> Result<Option<Entity>, OrchestratorError> {
        if let Some(id) = query.as_id_lookup() {
            return self.find_by_id(collection, id, options).await;
        }
        self.ensure_ready()?;
        let _timer = LatencyTimer::new("orchestrator", "find_one");

        let found = self.primary.find_one(collection, query).await?;
        if options.use_cache {
            if let Some(ref entity) = found {
                self.cache.set(collection, &entity.id, entity.clone(), options.ttl);
            }
        }
        Ok(found)
    }

    /// All matches of `query`, always read from the primary. Results are
    /// cached for later id lookups unless the caller opts out.
    pub async fn find(
        &self,
        collection: &str,
        query: &Query,
        find_options: &FindOptions,
        options: ReadOptions,
    ) -> Result<Vec<Entity>, OrchestratorError> {
        self.ensure_ready()?;
        let _timer = LatencyTimer::new("orchestrator", "find");

        let found = self.primary.find(collection, query, find_options).await?;
        if options.use_cache {
            for entity in &found {
                self.cache.set(collection, &entity.id, entity.clone(), options.ttl);
            }
        }
        Ok(found)
    }

    pub async fn count(&self, collection: &str, query: &Query) -> Result<u64, OrchestratorError> {
        self.ensure_ready()?;
        Ok(self.primary.count(collection, query).await?)
    }

    /// Whether an entity exists. A live cache entry answers without I/O.
    pub async fn exists(&self, collection: &str, id: &str) -> Result<bool, OrchestratorError> {
        self.ensure_ready()?;
        if self.cache.contains(collection, id) {
            return Ok(true);
        }
        Ok(self.primary.find_by_id(collection, id).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use serde_json::json;
    use crate::adapter::{Adapter, InMemoryAdapter};
    use crate::config::OrchestratorConfig;
    use crate::sync::SyncStatus;

    struct Fixture {
        primary: Arc<InMemoryAdapter>,
        secondary: Arc<InMemoryAdapter>,
        orchestrator: Orchestrator,
    }

    async fn fixture() -> Fixture {
        let config = OrchestratorConfig {
            auto_start_sync: false,
            auto_start_cleanup: false,
            ..Default::default()
        };
        let primary = Arc::new(InMemoryAdapter::new("primary"));
        let secondary = Arc::new(InMemoryAdapter::connected("B"));
        let orchestrator = Orchestrator::new(config, primary.clone() as Arc<dyn Adapter>);
        orchestrator.start().await.unwrap();
        orchestrator.add_secondary("B", secondary.clone() as Arc<dyn Adapter>).await.unwrap();
        Fixture { primary, secondary, orchestrator }
    }

    fn bug() -> Entity {
        Entity::new("issue").with_attr("name", json!("Bug"))
    }

    fn patch(value: serde_json::Value) -> Patch {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_requires_start() {
        let primary: Arc<dyn Adapter> = Arc::new(InMemoryAdapter::connected("primary"));
        let orchestrator = Orchestrator::new(OrchestratorConfig::default(), primary);

        let err = orchestrator.insert("issues", bug(), WriteOptions::default()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NotReady(_)));
    }

    #[tokio::test]
    async fn test_insert_assigns_identity_and_caches() {
        let f = fixture().await;
        let stored = f.orchestrator.insert("issues", bug(), WriteOptions::default()).await.unwrap();

        assert!(!stored.id.is_empty());
        assert!(stored.created_at > 0);
        assert_eq!(stored.updated_at, stored.created_at);
        assert_eq!(f.orchestrator.cache().peek("issues", &stored.id), Some(stored.clone()));
        assert_eq!(f.primary.len("issues"), 1);
    }

    #[tokio::test]
    async fn test_insert_keeps_given_id() {
        let f = fixture().await;
        let stored = f
            .orchestrator
            .insert("issues", bug().with_id("e1"), WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(stored.id, "e1");
    }

    #[tokio::test]
    async fn test_insert_fans_out_once_per_secondary() {
        let f = fixture().await;
        let third = Arc::new(InMemoryAdapter::connected("C"));
        f.orchestrator.add_secondary("C", third as Arc<dyn Adapter>).await.unwrap();

        f.orchestrator.insert("issues", bug(), WriteOptions::default()).await.unwrap();

        let pending = f
            .orchestrator
            .sync_manager()
            .operations_by_status(SyncStatus::Pending, None)
            .await
            .unwrap();
        let mut targets: Vec<String> = pending.into_iter().map(|op| op.target_adapter).collect();
        targets.sort();
        assert_eq!(targets, vec!["B".to_string(), "C".to_string()]);
    }

    #[tokio::test]
    async fn test_write_options_skip_sync_and_cache() {
        let f = fixture().await;
        let options = WriteOptions { use_cache: false, sync: false };
        let stored = f.orchestrator.insert("issues", bug(), options).await.unwrap();

        assert!(f.orchestrator.cache().is_empty());
        assert_eq!(f.orchestrator.sync_manager().pending_count().await.unwrap(), 0);
        assert!(f.primary.find_by_id("issues", &stored.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_primary_failure_propagates_without_fan_out() {
        let f = fixture().await;
        f.primary.poison("e1");

        let err = f
            .orchestrator
            .insert("issues", bug().with_id("e1"), WriteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Adapter(_)));
        assert_eq!(f.orchestrator.sync_manager().pending_count().await.unwrap(), 0);
        assert!(f.orchestrator.cache().is_empty());
    }

    #[tokio::test]
    async fn test_update_patches_and_stamps() {
        let f = fixture().await;
        let stored = f.orchestrator.insert("issues", bug(), WriteOptions::local()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;

        let updated = f
            .orchestrator
            .update("issues", &stored.id, patch(json!({"name": "Fixed"})), WriteOptions::default())
            .await
            .unwrap();

        assert_eq!(updated.attr("name"), Some(&json!("Fixed")));
        assert!(updated.updated_at > stored.updated_at);
        assert_eq!(updated.created_at, stored.created_at);
        assert_eq!(f.orchestrator.cache().peek("issues", &stored.id), Some(updated));
        assert_eq!(f.orchestrator.sync_manager().pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let f = fixture().await;
        let err = f
            .orchestrator
            .update("issues", "ghost", patch(json!({"name": "x"})), WriteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound { ref id, .. } if id == "ghost"));
        assert_eq!(f.orchestrator.sync_manager().pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_without_cache_invalidates() {
        let f = fixture().await;
        let stored = f.orchestrator.insert("issues", bug(), WriteOptions::local()).await.unwrap();

        let options = WriteOptions { use_cache: false, sync: false };
        f.orchestrator
            .update("issues", &stored.id, patch(json!({"name": "Fixed"})), options)
            .await
            .unwrap();
        assert!(!f.orchestrator.cache().contains("issues", &stored.id));
    }

    #[tokio::test]
    async fn test_delete() {
        let f = fixture().await;
        let stored = f.orchestrator.insert("issues", bug(), WriteOptions::local()).await.unwrap();

        assert!(f.orchestrator.delete("issues", &stored.id, WriteOptions::default()).await.unwrap());
        assert!(!f.orchestrator.cache().contains("issues", &stored.id));
        assert_eq!(f.primary.len("issues"), 0);
        assert_eq!(f.orchestrator.sync_manager().pending_count().await.unwrap(), 1);

        // Missing: false, nothing fanned out
        assert!(!f.orchestrator.delete("issues", &stored.id, WriteOptions::default()).await.unwrap());
        assert_eq!(f.orchestrator.sync_manager().pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_by_id_populates_cache() {
        let f = fixture().await;
        f.primary.insert("issues", bug().with_id("e1")).await.unwrap();

        let found = f.orchestrator.find_by_id("issues", "e1", ReadOptions::default()).await.unwrap();
        assert!(found.is_some());
        assert_eq!(f.orchestrator.cache().stats().misses, 1);

        let again = f.orchestrator.find_by_id("issues", "e1", ReadOptions::default()).await.unwrap();
        assert_eq!(again, found);
        assert_eq!(f.orchestrator.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn test_find_by_id_bypass_cache() {
        let f = fixture().await;
        f.primary.insert("issues", bug().with_id("e1")).await.unwrap();

        f.orchestrator.find_by_id("issues", "e1", ReadOptions::bypass_cache()).await.unwrap();
        assert!(f.orchestrator.cache().is_empty());
        assert_eq!(f.orchestrator.cache().stats().misses, 0);
    }

    #[tokio::test]
    async fn test_find_one_routes_id_lookups_through_cache() {
        let f = fixture().await;
        let stored = f.orchestrator.insert("issues", bug(), WriteOptions::local()).await.unwrap();

        let found = f
            .orchestrator
            .find_one("issues", &Query::by_id(stored.id.clone()), ReadOptions::default())
            .await
            .unwrap();
        assert_eq!(found, Some(stored));
        assert_eq!(f.orchestrator.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn test_find_one_by_field() {
        let f = fixture().await;
        f.orchestrator.insert("issues", bug(), WriteOptions::local()).await.unwrap();
        let other = Entity::new("issue").with_attr("name", json!("Other"));
        f.orchestrator.insert("issues", other, WriteOptions::local()).await.unwrap();

        let found = f
            .orchestrator
            .find_one("issues", &Query::field_eq("name", "Other"), ReadOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.attr("name"), Some(&json!("Other")));
    }

    #[tokio::test]
    async fn test_find_count_exists() {
        let f = fixture().await;
        for priority in [1, 2, 3] {
            let entity = bug().with_attr("priority", json!(priority));
            f.orchestrator.insert("issues", entity, WriteOptions::local()).await.unwrap();
        }
        f.orchestrator.cache().clear();

        let found = f
            .orchestrator
            .find(
                "issues",
                &Query::greater_or_equal("priority", 2i64),
                &FindOptions::default().sort_desc("priority"),
                ReadOptions::default(),
            )
            .await
            .unwrap();
        let priorities: Vec<_> = found.iter().map(|e| e.attr("priority").cloned()).collect();
        assert_eq!(priorities, vec![Some(json!(3)), Some(json!(2))]);
        assert_eq!(f.orchestrator.cache().len(), 2);

        assert_eq!(f.orchestrator.count("issues", &Query::all()).await.unwrap(), 3);
        assert!(f.orchestrator.exists("issues", &found[0].id).await.unwrap());
        assert!(!f.orchestrator.exists("issues", "ghost").await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_many() {
        let f = fixture().await;
        let stored = f
            .orchestrator
            .insert_many("issues", vec![bug(), bug(), bug()], WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(f.orchestrator.sync_manager().pending_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_change_events() {
        let f = fixture().await;
        let mut events = f.orchestrator.subscribe();

        let stored = f.orchestrator.insert("issues", bug(), WriteOptions::default()).await.unwrap();
        f.orchestrator
            .update("issues", &stored.id, patch(json!({"name": "Fixed"})), WriteOptions::default())
            .await
            .unwrap();
        f.orchestrator.delete("issues", &stored.id, WriteOptions::default()).await.unwrap();

        assert!(matches!(events.recv().await.unwrap(), ChangeEvent::Inserted { .. }));
        assert!(matches!(events.recv().await.unwrap(), ChangeEvent::Updated { .. }));
        let deleted = events.recv().await.unwrap();
        assert_eq!(deleted.entity_id(), stored.id);
        assert!(matches!(deleted, ChangeEvent::Deleted { .. }));
    }

    #[tokio::test]
    async fn test_offline_secondary_does_not_fail_write() {
        let f = fixture().await;
        f.secondary.disconnect().await.unwrap();

        let stored = f.orchestrator.insert("issues", bug(), WriteOptions::default()).await.unwrap();
        assert_eq!(f.primary.len("issues"), 1);

        // Enqueue succeeded; replay fails because the target is offline
        let report = f.orchestrator.sync_manager().sync_cycle().await.unwrap();
        assert_eq!(report.failed, 1);
        assert!(f.secondary.find_by_id("issues", &stored.id).await.is_err());
    }
}
