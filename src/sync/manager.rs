// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::adapter::{Adapter, Patch};
use crate::background::BackgroundTask;
use crate::config::SyncConfig;
use crate::entity::{now_millis, Entity};
use crate::query::{FindOptions, Query};
use crate::resilience::retry::{retry, RetryConfig};
use super::error::SyncError;
use super::operation::{BatchOperation, SyncOperation, SyncOperationType, SyncStatus};

/// Counters across the lifetime of a [`SyncManager`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub cycles_completed: u64,
    pub cycles_skipped: u64,
    pub operations_completed: u64,
    pub operations_failed: u64,
    /// Epoch millis of the last finished cycle
    pub last_sync_at: Option<i64>,
    pub last_error: Option<String>,
}

/// Outcome of one sync cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCycleReport {
    /// Pending operations fetched from the log
    pub fetched: usize,
    pub completed: usize,
    pub failed: usize,
    /// Left pending because they could not be claimed
    pub skipped: usize,
    /// Executed, but the outcome could not be written back to the log.
    /// These stay `executing` and are reset by the next cycle.
    pub unrecorded: usize,
    /// Stranded `executing` operations put back to `pending` at cycle start
    pub recovered: usize,
}

enum Outcome {
    Completed,
    Failed,
    Skipped,
    Unrecorded,
}

/// Releases the sync latch when dropped, including on panic.
struct SyncGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SyncGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Durable operation log plus the replicator that drains it.
///
/// Operations are appended to `sync_operations_collection` on the primary
/// adapter and replayed, oldest first, against registered target adapters.
/// At most one cycle runs at a time; a concurrent request returns
/// immediately instead of waiting.
pub struct SyncManager {
    config: SyncConfig,
    /// Recorded as `sourceAdapter` on every operation
    source_name: String,
    primary: Arc<dyn Adapter>,
    adapters: RwLock<HashMap<String, Arc<dyn Adapter>>>,
    syncing: AtomicBool,
    stats: Mutex<SyncStats>,
    sync_task: Mutex<Option<BackgroundTask>>,
    /// Backoff for writing an operation's outcome to the log
    outcome_retry: RetryConfig,
}

impl SyncManager {
    pub fn new(config: SyncConfig, source_name: impl Into<String>, primary: Arc<dyn Adapter>) -> Self {
        let outcome_retry = RetryConfig::from_sync_config(&config);
        Self {
            config,
            outcome_retry,
            source_name: source_name.into(),
            primary,
            adapters: RwLock::new(HashMap::new()),
            syncing: AtomicBool::new(false),
            stats: Mutex::new(SyncStats::default()),
            sync_task: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn log_collection(&self) -> &str {
        &self.config.sync_operations_collection
    }

    /// Create the log collection on the primary if it does not exist.
    pub async fn initialize(&self) -> Result<(), SyncError> {
        if !self.primary.is_connected() {
            return Err(SyncError::AdapterNotConnected(self.primary.name().to_string()));
        }
        let log = self.log_collection();
        if !self.primary.collection_exists(log).await? {
            self.primary.create_collection(log).await?;
            info!(collection = %log, "Created sync operation log");
        }
        Ok(())
    }

    // --- Target registry ---

    /// Register a target adapter. It must already be connected.
    pub fn register_adapter(&self, name: impl Into<String>, adapter: Arc<dyn Adapter>) -> Result<(), SyncError> {
        let name = name.into();
        if !adapter.is_connected() {
            return Err(SyncError::AdapterNotConnected(name));
        }
        if self.adapters.write().insert(name.clone(), adapter).is_some() {
            warn!(adapter = %name, "Replaced registered sync target");
        } else {
            info!(adapter = %name, "Registered sync target");
        }
        Ok(())
    }

    pub fn unregister_adapter(&self, name: &str) -> bool {
        let removed = self.adapters.write().remove(name).is_some();
        if removed {
            info!(adapter = %name, "Unregistered sync target");
        }
        removed
    }

    #[must_use]
    pub fn adapter(&self, name: &str) -> Option<Arc<dyn Adapter>> {
        self.adapters.read().get(name).cloned()
    }

    /// Registered target names, sorted.
    #[must_use]
    pub fn adapter_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.read().keys().cloned().collect();
        names.sort();
        names
    }

    // --- Enqueue ---

    /// Validate and append an operation to the log. Returns its id.
    ///
    /// The id is kept if set, otherwise a uuid is assigned. `createdAt` and
    /// `status` are always reset to now / `pending`.
    #[tracing::instrument(skip(self, operation), fields(op_type = %operation.op_type, target = %operation.target_adapter))]
    pub async fn create_sync_operation(&self, mut operation: SyncOperation) -> Result<String, SyncError> {
        operation.validate()?;

        if operation.id.is_empty() {
            operation.id = uuid::Uuid::new_v4().to_string();
        }
        operation.created_at = now_millis();
        operation.status = SyncStatus::Pending;
        operation.executed_at = None;
        operation.error = None;

        let entity = operation.to_entity()?;
        self.primary.insert(self.log_collection(), entity).await?;

        crate::metrics::record_sync_enqueued(operation.op_type.as_str(), &operation.target_adapter);
        debug!(id = %operation.id, "Sync operation enqueued");
        Ok(operation.id)
    }

    pub async fn create_entity(&self, target: &str, collection: &str, entity: Entity) -> Result<String, SyncError> {
        self.create_sync_operation(SyncOperation::create(&self.source_name, target, collection, entity))
            .await
    }

    pub async fn update_entity(&self, target: &str, collection: &str, id: &str, entity: Entity) -> Result<String, SyncError> {
        self.create_sync_operation(SyncOperation::update(&self.source_name, target, collection, id, entity))
            .await
    }

    pub async fn delete_entity(&self, target: &str, collection: &str, id: &str) -> Result<String, SyncError> {
        self.create_sync_operation(SyncOperation::delete(&self.source_name, target, collection, id))
            .await
    }

    pub async fn batch_operations(&self, target: &str, operations: Vec<BatchOperation>) -> Result<String, SyncError> {
        self.create_sync_operation(SyncOperation::batch(&self.source_name, target, operations))
            .await
    }

    // --- Log queries ---

    pub async fn get_operation(&self, id: &str) -> Result<Option<SyncOperation>, SyncError> {
        match self.primary.find_by_id(self.log_collection(), id).await? {
            Some(entity) => Ok(Some(SyncOperation::from_entity(&entity)?)),
            None => Ok(None),
        }
    }

    /// Operations with the given status, oldest first.
    pub async fn operations_by_status(&self, status: SyncStatus, limit: Option<usize>) -> Result<Vec<SyncOperation>, SyncError> {
        let mut options = FindOptions::default().sort_asc("createdAt");
        if let Some(limit) = limit {
            options = options.limit(limit);
        }
        let entities = self
            .primary
            .find(self.log_collection(), &Query::field_eq("status", status.as_str()), &options)
            .await?;
        entities
            .iter()
            .map(|e| SyncOperation::from_entity(e).map_err(SyncError::from))
            .collect()
    }

    pub async fn pending_count(&self) -> Result<u64, SyncError> {
        Ok(self
            .primary
            .count(self.log_collection(), &Query::field_eq("status", SyncStatus::Pending.as_str()))
            .await?)
    }

    #[must_use]
    pub fn stats(&self) -> SyncStats {
        self.stats.lock().clone()
    }

    // --- Replication ---

    /// Run one cycle if none is running. Returns whether a cycle ran.
    pub async fn sync(&self) -> bool {
        match self.sync_cycle().await {
            Ok(_) => true,
            Err(SyncError::AlreadySyncing) => false,
            Err(e) => {
                warn!(error = %e, "Sync cycle failed");
                false
            }
        }
    }

    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Drain up to `batch_size` pending operations, oldest first.
    ///
    /// A failing operation is marked failed and the cycle moves on. Any
    /// operation left `executing` by an earlier cycle is put back to
    /// `pending` first; replay is idempotent, so running it again is safe.
    #[tracing::instrument(skip(self))]
    pub async fn sync_cycle(&self) -> Result<SyncCycleReport, SyncError> {
        let Some(_guard) = SyncGuard::try_acquire(&self.syncing) else {
            self.stats.lock().cycles_skipped += 1;
            crate::metrics::record_sync_skipped();
            debug!("Sync already in progress, skipping");
            return Err(SyncError::AlreadySyncing);
        };
        let start = Instant::now();

        let recovered = match self.recover_stranded().await {
            Ok(recovered) => recovered,
            Err(e) => {
                self.stats.lock().last_error = Some(e.to_string());
                crate::metrics::record_error("sync", "recover_stranded", e.kind());
                return Err(e);
            }
        };

        let pending = match self.fetch_pending().await {
            Ok(pending) => pending,
            Err(e) => {
                self.stats.lock().last_error = Some(e.to_string());
                crate::metrics::record_error("sync", "fetch_pending", e.kind());
                return Err(e);
            }
        };

        let mut report = SyncCycleReport {
            fetched: pending.len(),
            recovered,
            ..Default::default()
        };
        for entity in pending {
            match self.process(entity).await {
                Outcome::Completed => report.completed += 1,
                Outcome::Failed => report.failed += 1,
                Outcome::Skipped => report.skipped += 1,
                Outcome::Unrecorded => report.unrecorded += 1,
            }
        }

        {
            let mut stats = self.stats.lock();
            stats.cycles_completed += 1;
            stats.operations_completed += report.completed as u64;
            stats.operations_failed += report.failed as u64;
            stats.last_sync_at = Some(now_millis());
        }
        crate::metrics::record_sync_cycle(start.elapsed(), report.completed + report.failed);
        if report.fetched > 0 {
            info!(
                fetched = report.fetched,
                completed = report.completed,
                failed = report.failed,
                skipped = report.skipped,
                unrecorded = report.unrecorded,
                recovered = report.recovered,
                "Sync cycle complete"
            );
        }
        Ok(report)
    }

    /// Reset operations stuck in `executing` back to `pending`.
    ///
    /// Only called while holding the sync latch, so no `executing` operation
    /// can belong to a cycle still in flight.
    async fn recover_stranded(&self) -> Result<usize, SyncError> {
        let stranded = self
            .primary
            .find(
                self.log_collection(),
                &Query::field_eq("status", SyncStatus::Executing.as_str()),
                &FindOptions::default(),
            )
            .await?;

        let mut recovered = 0;
        for entity in stranded {
            match self.set_status(&entity.id, SyncStatus::Pending, None).await {
                Ok(true) => {
                    warn!(id = %entity.id, "Recovered stranded operation, back to pending");
                    recovered += 1;
                }
                Ok(false) => {}
                Err(e) => warn!(id = %entity.id, error = %e, "Could not reset stranded operation"),
            }
        }
        Ok(recovered)
    }

    async fn fetch_pending(&self) -> Result<Vec<Entity>, SyncError> {
        let options = FindOptions::default()
            .sort_asc("createdAt")
            .limit(self.config.batch_size.max(1));
        Ok(self
            .primary
            .find(
                self.log_collection(),
                &Query::field_eq("status", SyncStatus::Pending.as_str()),
                &options,
            )
            .await?)
    }

    async fn process(&self, entity: Entity) -> Outcome {
        let id = entity.id.clone();

        // Claim it first; an unclaimable operation stays pending for the next cycle.
        match self.set_status(&id, SyncStatus::Executing, None).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(id = %id, "Operation vanished before it could be claimed");
                return Outcome::Skipped;
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Could not mark operation executing, leaving pending");
                return Outcome::Skipped;
            }
        }

        let (op_type, result) = match SyncOperation::from_entity(&entity) {
            Ok(op) => (op.op_type.as_str(), self.execute(&op).await),
            Err(e) => ("unknown", Err(SyncError::from(e))),
        };

        let (status, error) = match &result {
            Ok(()) => (SyncStatus::Completed, None),
            Err(e) => {
                warn!(id = %id, op_type, error = %e, "Sync operation failed");
                crate::metrics::record_error("sync", op_type, e.kind());
                self.stats.lock().last_error = Some(e.to_string());
                (SyncStatus::Failed, Some(e.to_string()))
            }
        };
        crate::metrics::record_sync_operation(op_type, status.as_str());

        let recorded = retry("record_sync_outcome", &self.outcome_retry, || {
            self.set_status(&id, status, error.clone())
        })
        .await;
        match (recorded, status) {
            (Ok(true), SyncStatus::Completed) => Outcome::Completed,
            (Ok(true), _) => Outcome::Failed,
            (Ok(false), _) => {
                warn!(id = %id, status = %status, "Operation vanished before its outcome was recorded");
                Outcome::Unrecorded
            }
            (Err(e), _) => {
                error!(id = %id, status = %status, error = %e, "Could not record operation outcome");
                crate::metrics::record_error("sync", "record_outcome", e.kind());
                Outcome::Unrecorded
            }
        }
    }

    async fn set_status(&self, id: &str, status: SyncStatus, error: Option<String>) -> Result<bool, SyncError> {
        let now = now_millis();
        let mut patch: Patch = Map::new();
        patch.insert("status".into(), Value::from(status.as_str()));
        patch.insert("updatedAt".into(), Value::from(now));
        if status.is_terminal() {
            patch.insert("executedAt".into(), Value::from(now));
        }
        if let Some(error) = error {
            patch.insert("error".into(), Value::from(error));
        }
        Ok(self
            .primary
            .update_by_id(self.log_collection(), id, &patch)
            .await?
            .is_some())
    }

    async fn execute(&self, op: &SyncOperation) -> Result<(), SyncError> {
        let target = self
            .adapter(&op.target_adapter)
            .ok_or_else(|| SyncError::AdapterNotRegistered(op.target_adapter.clone()))?;
        if !target.is_connected() {
            return Err(SyncError::AdapterNotConnected(op.target_adapter.clone()));
        }

        // TODO: honor retry_attempts / retry_delay_ms per operation instead of failing terminally.
        match op.op_type {
            SyncOperationType::Batch => {
                let steps = op.batch_operations.as_deref().unwrap_or_default();
                let total = steps.len();
                for (index, step) in steps.iter().enumerate() {
                    apply(target.as_ref(), step.op_type, &step.collection, step.entity_id.as_deref(), step.data.as_ref())
                        .await
                        .map_err(|e| SyncError::BatchAborted {
                            index,
                            total,
                            reason: e.to_string(),
                        })?;
                }
                Ok(())
            }
            op_type => apply(target.as_ref(), op_type, &op.collection, op.entity_id.as_deref(), op.data.as_ref()).await,
        }
    }

    // --- Background loop ---

    /// Start the periodic sync loop. Returns `false` if already running.
    pub fn start_sync(self: &Arc<Self>) -> bool {
        let mut task = self.sync_task.lock();
        if task.is_some() {
            return false;
        }

        let weak = Arc::downgrade(self);
        let interval = self.config.sync_interval();
        *task = Some(BackgroundTask::spawn("sync", interval, move || {
            let weak = weak.clone();
            async move {
                if let Some(manager) = weak.upgrade() {
                    manager.sync().await;
                }
            }
        }));
        info!(interval_ms = interval.as_millis() as u64, "Sync loop started");
        true
    }

    /// Stop the periodic loop. A cycle already running finishes normally.
    pub fn stop_sync(&self) -> bool {
        match self.sync_task.lock().take() {
            Some(task) => {
                task.stop();
                info!("Sync loop stopped");
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.sync_task.lock().is_some()
    }

    /// Stop the loop, wait for a cycle in flight, then run one final cycle.
    pub async fn drain(&self) -> Result<SyncCycleReport, SyncError> {
        let task = self.sync_task.lock().take();
        if let Some(task) = task {
            task.stop_and_wait().await;
            info!("Sync loop stopped for drain");
        }
        self.sync_cycle().await
    }
}

impl Drop for SyncManager {
    fn drop(&mut self) {
        if let Some(task) = self.sync_task.get_mut().take() {
            task.stop();
        }
    }
}

/// Apply one mutation to a target, idempotently.
///
/// create and update: replace the whole entity if present, else insert, so
/// the target ends up equal to `data`. delete: removing a missing entity is fine.
async fn apply(
    target: &dyn Adapter,
    op_type: SyncOperationType,
    collection: &str,
    entity_id: Option<&str>,
    data: Option<&Entity>,
) -> Result<(), SyncError> {
    let missing = |what: &str| SyncError::InvalidOperation(format!("{} requires {}", op_type, what));

    match op_type {
        SyncOperationType::Create | SyncOperationType::Update => {
            let data = data.ok_or_else(|| missing("data"))?;
            let id = entity_id
                .filter(|id| !id.is_empty())
                .unwrap_or(data.id.as_str());
            if id.is_empty() {
                return Err(missing("an entity id"));
            }

            let mut entity = data.clone();
            entity.id = id.to_string();
            if target.replace_by_id(collection, id, entity.clone()).await?.is_none() {
                target.insert(collection, entity).await?;
            }
            Ok(())
        }
        SyncOperationType::Delete => {
            let id = entity_id.filter(|id| !id.is_empty()).ok_or_else(|| missing("an entity id"))?;
            let removed = target.delete_by_id(collection, id).await?;
            if !removed {
                debug!(collection, id, "Delete target already absent");
            }
            Ok(())
        }
        SyncOperationType::Batch => Err(SyncError::InvalidOperation(
            "nested batch operations are not supported".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::InMemoryAdapter;
    use serde_json::json;
    use std::time::Duration;

    const LOG: &str = "_sync_operations";

    struct Fixture {
        primary: Arc<InMemoryAdapter>,
        target: Arc<InMemoryAdapter>,
        manager: Arc<SyncManager>,
    }

    async fn fixture(config: SyncConfig) -> Fixture {
        let primary = Arc::new(InMemoryAdapter::connected("primary"));
        let target = Arc::new(InMemoryAdapter::connected("B"));
        let manager = Arc::new(SyncManager::new(config, "primary", primary.clone() as Arc<dyn Adapter>));
        manager.initialize().await.unwrap();
        manager.register_adapter("B", target.clone() as Arc<dyn Adapter>).unwrap();
        Fixture { primary, target, manager }
    }

    fn issue(id: &str, name: &str) -> Entity {
        Entity::new("issue").with_id(id).with_attr("name", json!(name))
    }

    #[tokio::test]
    async fn test_initialize_creates_log_collection() {
        let f = fixture(SyncConfig::default()).await;
        assert!(f.primary.collection_exists(LOG).await.unwrap());
    }

    #[tokio::test]
    async fn test_register_requires_connected_adapter() {
        let f = fixture(SyncConfig::default()).await;
        let offline = Arc::new(InMemoryAdapter::new("C"));

        let err = f.manager.register_adapter("C", offline as Arc<dyn Adapter>).unwrap_err();
        assert!(matches!(err, SyncError::AdapterNotConnected(name) if name == "C"));
        assert_eq!(f.manager.adapter_names(), vec!["B".to_string()]);

        assert!(f.manager.unregister_adapter("B"));
        assert!(!f.manager.unregister_adapter("B"));
        assert!(f.manager.adapter_names().is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_persists_pending_operation() {
        let f = fixture(SyncConfig::default()).await;
        let id = f.manager.create_entity("B", "issues", issue("e1", "Bug")).await.unwrap();

        let op = f.manager.get_operation(&id).await.unwrap().unwrap();
        assert_eq!(op.status, SyncStatus::Pending);
        assert_eq!(op.source_adapter, "primary");
        assert_eq!(op.target_adapter, "B");
        assert!(op.created_at > 0);
        assert_eq!(f.manager.pending_count().await.unwrap(), 1);
        assert_eq!(f.primary.len(LOG), 1);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_invalid_operation() {
        let f = fixture(SyncConfig::default()).await;
        let err = f.manager.batch_operations("B", vec![]).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidOperation(_)));
        assert_eq!(f.primary.len(LOG), 0);
    }

    #[tokio::test]
    async fn test_cycle_replays_create_update_delete() {
        let f = fixture(SyncConfig::default()).await;
        f.manager.create_entity("B", "issues", issue("e1", "Bug")).await.unwrap();
        f.manager.create_entity("B", "issues", issue("e2", "Other")).await.unwrap();
        f.manager.update_entity("B", "issues", "e1", issue("e1", "Fixed")).await.unwrap();
        f.manager.delete_entity("B", "issues", "e2").await.unwrap();

        let report = f.manager.sync_cycle().await.unwrap();
        assert_eq!(report, SyncCycleReport { fetched: 4, completed: 4, ..Default::default() });

        let stored = f.target.snapshot("issues");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].attr("name"), Some(&json!("Fixed")));

        let completed = f.manager.operations_by_status(SyncStatus::Completed, None).await.unwrap();
        assert_eq!(completed.len(), 4);
        assert!(completed.iter().all(|op| op.executed_at.is_some()));
        assert_eq!(f.manager.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_replay_is_idempotent() {
        let f = fixture(SyncConfig::default()).await;
        let stale = issue("e1", "Old").with_attr("stale", json!(true));
        f.target.insert("issues", stale).await.unwrap();

        let data = issue("e1", "Bug");
        f.manager.create_entity("B", "issues", data.clone()).await.unwrap();
        f.manager.create_entity("B", "issues", data.clone()).await.unwrap();
        let report = f.manager.sync_cycle().await.unwrap();

        assert_eq!(report.completed, 2);
        // Attributes the target had but the data lacks are gone
        assert_eq!(f.target.snapshot("issues"), vec![data]);
    }

    #[tokio::test]
    async fn test_update_of_missing_entity_inserts() {
        let f = fixture(SyncConfig::default()).await;
        f.manager.update_entity("B", "issues", "e9", issue("e9", "Late")).await.unwrap();
        f.manager.sync_cycle().await.unwrap();

        assert!(f.target.find_by_id("issues", "e9").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_of_missing_entity_completes() {
        let f = fixture(SyncConfig::default()).await;
        let id = f.manager.delete_entity("B", "issues", "nope").await.unwrap();
        f.manager.sync_cycle().await.unwrap();

        let op = f.manager.get_operation(&id).await.unwrap().unwrap();
        assert_eq!(op.status, SyncStatus::Completed);
    }

    #[tokio::test]
    async fn test_unknown_target_fails_operation_not_cycle() {
        let f = fixture(SyncConfig::default()).await;
        let bad = f.manager.create_entity("ghost", "issues", issue("e1", "Bug")).await.unwrap();
        let good = f.manager.create_entity("B", "issues", issue("e2", "Bug")).await.unwrap();

        let report = f.manager.sync_cycle().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.completed, 1);

        let bad = f.manager.get_operation(&bad).await.unwrap().unwrap();
        assert_eq!(bad.status, SyncStatus::Failed);
        assert!(bad.error.unwrap().contains("ghost"));
        let good = f.manager.get_operation(&good).await.unwrap().unwrap();
        assert_eq!(good.status, SyncStatus::Completed);
    }

    #[tokio::test]
    async fn test_failed_operations_are_not_retried() {
        let f = fixture(SyncConfig::default()).await;
        f.target.poison("e1");
        f.manager.create_entity("B", "issues", issue("e1", "Bug")).await.unwrap();

        assert_eq!(f.manager.sync_cycle().await.unwrap().failed, 1);
        f.target.heal("e1");
        assert_eq!(f.manager.sync_cycle().await.unwrap().fetched, 0);
        assert_eq!(f.target.len("issues"), 0);

        let stats = f.manager.stats();
        assert_eq!(stats.operations_failed, 1);
        assert_eq!(stats.cycles_completed, 2);
        assert!(stats.last_error.is_some());
    }

    #[tokio::test]
    async fn test_batch_partial_failure() {
        let f = fixture(SyncConfig::default()).await;
        f.target.poison("b2");
        let id = f
            .manager
            .batch_operations("B", vec![
                BatchOperation::create("issues", issue("b1", "one")),
                BatchOperation::create("issues", issue("b2", "two")),
                BatchOperation::create("issues", issue("b3", "three")),
            ])
            .await
            .unwrap();

        f.manager.sync_cycle().await.unwrap();

        let op = f.manager.get_operation(&id).await.unwrap().unwrap();
        assert_eq!(op.status, SyncStatus::Failed);
        assert!(op.error.unwrap().contains("operation 1 of 3"));

        // No rollback of the steps that already ran
        let ids: Vec<String> = f.target.snapshot("issues").into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["b1".to_string()]);
    }

    #[tokio::test]
    async fn test_cycle_respects_batch_size_and_order() {
        let f = fixture(SyncConfig { batch_size: 2, ..Default::default() }).await;
        for id in ["e1", "e2", "e3"] {
            f.manager.create_entity("B", "issues", issue(id, id)).await.unwrap();
        }

        assert_eq!(f.manager.sync_cycle().await.unwrap().completed, 2);
        let ids: Vec<String> = f.target.snapshot("issues").into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["e1".to_string(), "e2".to_string()]);

        assert_eq!(f.manager.sync_cycle().await.unwrap().completed, 1);
        assert_eq!(f.target.len("issues"), 3);
    }

    #[tokio::test]
    async fn test_unclaimable_operation_stays_pending() {
        let f = fixture(SyncConfig::default()).await;
        let id = f.manager.create_entity("B", "issues", issue("e1", "Bug")).await.unwrap();
        f.primary.poison(id.clone());

        let report = f.manager.sync_cycle().await.unwrap();
        assert_eq!(report.skipped, 1);

        f.primary.heal(&id);
        let op = f.manager.get_operation(&id).await.unwrap().unwrap();
        assert_eq!(op.status, SyncStatus::Pending);
    }

    #[tokio::test]
    async fn test_stranded_executing_operation_is_replayed() {
        let f = fixture(SyncConfig::default()).await;
        let id = f.manager.create_entity("B", "issues", issue("e1", "Bug")).await.unwrap();
        f.manager.set_status(&id, SyncStatus::Executing, None).await.unwrap();

        let report = f.manager.sync_cycle().await.unwrap();
        assert_eq!(report.recovered, 1);
        assert_eq!(report.completed, 1);

        let op = f.manager.get_operation(&id).await.unwrap().unwrap();
        assert_eq!(op.status, SyncStatus::Completed);
        assert!(op.executed_at.is_some());
        assert_eq!(f.target.len("issues"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecorded_outcome_is_not_reported_completed() {
        let f = fixture(SyncConfig::default()).await;
        let id = f.manager.create_entity("B", "issues", issue("e1", "Bug")).await.unwrap();
        f.target.set_latency(Duration::from_millis(100));

        // Claimed as executing, then the log rejects every outcome write
        let manager = f.manager.clone();
        let cycle = tokio::spawn(async move { manager.sync_cycle().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        f.primary.poison(id.clone());

        let report = cycle.await.unwrap().unwrap();
        assert_eq!(report.completed, 0);
        assert_eq!(report.unrecorded, 1);
        assert_eq!(f.manager.stats().operations_completed, 0);

        f.primary.heal(&id);
        let op = f.manager.get_operation(&id).await.unwrap().unwrap();
        assert_eq!(op.status, SyncStatus::Executing);
        assert_eq!(f.manager.operations_by_status(SyncStatus::Executing, None).await.unwrap().len(), 1);

        // Next cycle puts it back and finishes it
        let report = f.manager.sync_cycle().await.unwrap();
        assert_eq!(report.recovered, 1);
        assert_eq!(report.completed, 1);
        let op = f.manager.get_operation(&id).await.unwrap().unwrap();
        assert_eq!(op.status, SyncStatus::Completed);
        assert_eq!(f.target.snapshot("issues"), vec![issue("e1", "Bug")]);
    }

    #[tokio::test]
    async fn test_cycle_fails_fast_when_primary_offline() {
        let f = fixture(SyncConfig::default()).await;
        f.primary.disconnect().await.unwrap();

        let err = f.manager.sync_cycle().await.unwrap_err();
        assert!(matches!(err, SyncError::Adapter(_)));
        assert!(!f.manager.is_syncing(), "latch released on error");
        assert!(!f.manager.sync().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycles_never_overlap() {
        let f = fixture(SyncConfig::default()).await;
        f.manager.create_entity("B", "issues", issue("e1", "Bug")).await.unwrap();
        f.target.set_latency(Duration::from_millis(100));

        let manager = f.manager.clone();
        let first = tokio::spawn(async move { manager.sync_cycle().await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(f.manager.is_syncing());
        assert!(matches!(f.manager.sync_cycle().await, Err(SyncError::AlreadySyncing)));
        assert!(!f.manager.sync().await);

        let report = first.await.unwrap().unwrap();
        assert_eq!(report.completed, 1);
        assert!(!f.manager.is_syncing());
        assert_eq!(f.manager.stats().cycles_skipped, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_loop() {
        let f = fixture(SyncConfig { sync_interval_ms: 100, ..Default::default() }).await;
        f.manager.create_entity("B", "issues", issue("e1", "Bug")).await.unwrap();

        assert!(f.manager.start_sync());
        assert!(!f.manager.start_sync());
        assert!(f.manager.is_running());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(f.target.len("issues"), 1);

        assert!(f.manager.stop_sync());
        assert!(!f.manager.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_waits_for_inflight_cycle() {
        let f = fixture(SyncConfig { sync_interval_ms: 100, ..Default::default() }).await;
        f.manager.create_entity("B", "issues", issue("e1", "Bug")).await.unwrap();
        f.target.set_latency(Duration::from_millis(500));
        f.manager.start_sync();

        // First tick at 100ms is now stuck on the slow target
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(f.manager.is_syncing());
        f.manager.create_entity("B", "issues", issue("e2", "Bug")).await.unwrap();

        let report = f.manager.drain().await.unwrap();
        assert_eq!(report.completed, 1, "final cycle picks up the later operation");
        assert!(!f.manager.is_running());
        assert_eq!(f.target.len("issues"), 2);
    }
}
