// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::adapter::Adapter;
use crate::background::BackgroundTask;
use crate::config::CacheConfig;
use crate::entity::Entity;
use crate::eviction::{EvictionCandidate, LruPolicy};
use super::entry::{CacheEntry, CacheKey, PrefetchQueue};

/// Cache statistics
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Entries filled by the background prefetcher
    pub prefetches: u64,
    /// Current number of entries (expired ones included until cleanup)
    pub entries: usize,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}

/// Result of one cleanup cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub expired: usize,
    pub evicted: usize,
    pub prefetched: usize,
}

/// Bounded, TTL-based read cache with LRU eviction and a best-effort
/// prefetch queue.
///
/// All mutation goes through this type; callers only ever receive copies of
/// cached entities. Internal failures (prefetch I/O) are logged, never
/// returned.
pub struct CacheManager {
    config: CacheConfig,
    entries: DashMap<CacheKey, CacheEntry>,
    next_seq: AtomicU64,
    policy: LruPolicy,
    prefetch_queue: Mutex<PrefetchQueue>,
    /// Store used to fill prefetched keys (usually the primary)
    source: Option<Arc<dyn Adapter>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    prefetches: AtomicU64,
    cleanup_task: Mutex<Option<BackgroundTask>>,
}

impl CacheManager {
    /// Create a cache. `source` is the adapter the prefetcher reads from;
    /// without one, queued keys are discarded at cleanup.
    pub fn new(config: CacheConfig, source: Option<Arc<dyn Adapter>>) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            next_seq: AtomicU64::new(0),
            policy: LruPolicy,
            prefetch_queue: Mutex::new(PrefetchQueue::default()),
            source,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            prefetches: AtomicU64::new(0),
            cleanup_task: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a cached entity.
    ///
    /// A hit bumps recency and access count and returns a copy. A miss (absent
    /// or expired) counts as such and queues the key for prefetch.
    pub fn get(&self, collection: &str, id: &str) -> Option<Entity> {
        let key = CacheKey::new(collection, id);
        let now = Instant::now();

        if let Some(mut entry) = self.entries.get_mut(&key) {
            if !entry.is_expired(now) {
                entry.record_access(now);
                self.hits.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_cache_lookup(true);
                return Some(entry.data.clone());
            }
        }

        if self.entries.remove_if(&key, |_, e| e.is_expired(now)).is_some() {
            crate::metrics::record_cache_eviction("ttl", 1);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_cache_lookup(false);

        if self.config.prefetch_enabled {
            let queued = self.prefetch_queue.lock().push(key, self.config.prefetch_threshold);
            if queued {
                debug!(collection, id, "Queued cache miss for prefetch");
            }
        }
        None
    }

    /// Insert or replace an entry. `ttl` falls back to the configured default.
    ///
    /// Evicts immediately when the insert pushes the cache above `max_size`.
    pub fn set(&self, collection: &str, id: &str, entity: Entity, ttl: Option<Duration>) {
        let key = CacheKey::new(collection, id);
        let now = Instant::now();
        let ttl = ttl.unwrap_or_else(|| self.config.default_ttl());

        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => occupied.get_mut().refresh(entity, now, ttl),
            Entry::Vacant(vacant) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                vacant.insert(CacheEntry::new(entity, now, ttl, seq));
            }
        }

        if self.entries.len() > self.config.max_size {
            self.evict_overflow();
        }
    }

    /// Drop one entry. Returns whether it was present.
    pub fn remove(&self, collection: &str, id: &str) -> bool {
        self.entries.remove(&CacheKey::new(collection, id)).is_some()
    }

    /// Drop every entry of a collection. Returns the number removed.
    pub fn invalidate_collection(&self, collection: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.collection != collection);
        let removed = before.saturating_sub(self.entries.len());
        debug!(collection, removed, "Invalidated cached collection");
        removed
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Unexpired entry present (no stats, no recency update).
    #[must_use]
    pub fn contains(&self, collection: &str, id: &str) -> bool {
        let now = Instant::now();
        self.entries
            .get(&CacheKey::new(collection, id))
            .is_some_and(|e| !e.is_expired(now))
    }

    /// Copy of an unexpired entity without touching stats or recency.
    #[must_use]
    pub fn peek(&self, collection: &str, id: &str) -> Option<Entity> {
        self.entry(collection, id).map(|e| e.data)
    }

    /// Copy of an unexpired entry with its access metadata.
    #[must_use]
    pub fn entry(&self, collection: &str, id: &str) -> Option<CacheEntry> {
        let now = Instant::now();
        self.entries
            .get(&CacheKey::new(collection, id))
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value().clone())
    }

    /// Rendered keys (`collection:id`) of all stored entries.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().to_string()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn prefetch_queue_len(&self) -> usize {
        self.prefetch_queue.lock().len()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            prefetches: self.prefetches.load(Ordering::Relaxed),
            entries: self.entries.len(),
            hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
        }
    }

    /// Run one cleanup cycle: expire, enforce the size bound, drain prefetch.
    #[tracing::instrument(skip(self))]
    pub async fn cleanup(&self) -> CleanupReport {
        let now = Instant::now();

        let mut expired = 0;
        self.entries.retain(|_, e| {
            let keep = !e.is_expired(now);
            if !keep {
                expired += 1;
            }
            keep
        });
        crate::metrics::record_cache_eviction("ttl", expired);

        let evicted = self.evict_overflow();
        let prefetched = self.drain_prefetch().await;

        crate::metrics::set_cache_entries(self.entries.len());
        crate::metrics::set_prefetch_queue(self.prefetch_queue_len());
        if expired + evicted + prefetched > 0 {
            debug!(expired, evicted, prefetched, entries = self.entries.len(), "Cache cleanup complete");
        }
        CleanupReport { expired, evicted, prefetched }
    }

    /// Start the periodic cleanup loop. Returns `false` if already running.
    pub fn start_cleanup(self: &Arc<Self>) -> bool {
        let mut task = self.cleanup_task.lock();
        if task.is_some() {
            return false;
        }

        let weak = Arc::downgrade(self);
        let interval = self.config.cleanup_interval();
        *task = Some(BackgroundTask::spawn("cache-cleanup", interval, move || {
            let weak = weak.clone();
            async move {
                if let Some(cache) = weak.upgrade() {
                    cache.cleanup().await;
                }
            }
        }));
        info!(interval_ms = interval.as_millis() as u64, "Cache cleanup started");
        true
    }

    /// Stop the cleanup loop. A cycle already running is allowed to finish.
    pub fn stop_cleanup(&self) -> bool {
        match self.cleanup_task.lock().take() {
            Some(task) => {
                task.stop();
                info!("Cache cleanup stopped");
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_cleanup_running(&self) -> bool {
        self.cleanup_task.lock().is_some()
    }

    /// Stop background work, drop all entries and queued keys, reset stats.
    pub fn dispose(&self) {
        self.stop_cleanup();
        self.entries.clear();
        self.prefetch_queue.lock().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.prefetches.store(0, Ordering::Relaxed);
        info!("Cache disposed");
    }

    /// Evict least recently used entries until the cache fits `max_size`.
    fn evict_overflow(&self) -> usize {
        let overflow = LruPolicy::overflow(self.entries.len(), self.config.max_size);
        if overflow == 0 {
            return 0;
        }

        let candidates: Vec<_> = self
            .entries
            .iter()
            .map(|e| EvictionCandidate {
                key: e.key().clone(),
                last_accessed: e.last_accessed,
                seq: e.seq,
            })
            .collect();

        let victims = self.policy.select_victims(candidates, overflow);
        let evicted = victims
            .iter()
            .filter(|key| self.entries.remove(*key).is_some())
            .count();

        self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        crate::metrics::record_cache_eviction("lru", evicted);
        debug!(evicted, max_size = self.config.max_size, "LRU eviction");
        evicted
    }

    /// Fill queued keys from the source adapter, in fixed-size batches.
    /// Only keys queued before the drain started are processed.
    async fn drain_prefetch(&self) -> usize {
        let Some(source) = self.source.clone() else {
            self.prefetch_queue.lock().clear();
            return 0;
        };

        let batch_size = self.config.prefetch_batch_size.max(1);
        let mut remaining = self.prefetch_queue_len();
        let mut filled = 0;

        while remaining > 0 {
            let batch = self.prefetch_queue.lock().take(batch_size.min(remaining));
            if batch.is_empty() {
                break;
            }
            remaining -= batch.len();

            for key in batch {
                if self.contains(&key.collection, &key.id) {
                    continue;
                }
                match source.find_by_id(&key.collection, &key.id).await {
                    Ok(Some(entity)) => {
                        self.set(&key.collection, &key.id, entity, None);
                        self.prefetches.fetch_add(1, Ordering::Relaxed);
                        crate::metrics::record_prefetch("filled");
                        filled += 1;
                    }
                    Ok(None) => {
                        crate::metrics::record_prefetch("missing");
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "Prefetch failed, dropping key");
                        crate::metrics::record_prefetch("error");
                    }
                }
            }
        }
        filled
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        if let Some(task) = self.cleanup_task.get_mut().take() {
            task.stop();
        }
    }
}
