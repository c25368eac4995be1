// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::entity::Entity;

/// Cache key: (collection, id), rendered as `collection:id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub collection: String,
    pub id: String,
}

impl CacheKey {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.collection, self.id)
    }
}

/// Cached copy of an entity plus its access metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: Entity,
    pub expires_at: Instant,
    pub last_accessed: Instant,
    pub access_count: u64,
    /// Insertion sequence (eviction tie-break)
    pub(crate) seq: u64,
}

impl CacheEntry {
    pub(crate) fn new(data: Entity, now: Instant, ttl: Duration, seq: u64) -> Self {
        Self {
            data,
            expires_at: now + ttl,
            last_accessed: now,
            access_count: 0,
            seq,
        }
    }

    /// Visible only while `now < expires_at`.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    pub(crate) fn record_access(&mut self, now: Instant) {
        self.last_accessed = now;
        self.access_count = self.access_count.saturating_add(1);
    }

    pub(crate) fn refresh(&mut self, data: Entity, now: Instant, ttl: Duration) {
        self.data = data;
        self.expires_at = now + ttl;
        self.last_accessed = now;
    }
}

/// FIFO of keys waiting for background population, deduplicated.
#[derive(Debug, Default)]
pub(crate) struct PrefetchQueue {
    order: VecDeque<CacheKey>,
    members: HashSet<CacheKey>,
}

impl PrefetchQueue {
    /// Queue a key unless it is already queued or the queue is full.
    pub(crate) fn push(&mut self, key: CacheKey, capacity: usize) -> bool {
        if self.members.len() >= capacity || self.members.contains(&key) {
            return false;
        }
        self.members.insert(key.clone());
        self.order.push_back(key);
        true
    }

    pub(crate) fn take(&mut self, count: usize) -> Vec<CacheKey> {
        let n = count.min(self.order.len());
        let batch: Vec<CacheKey> = self.order.drain(..n).collect();
        for key in &batch {
            self.members.remove(key);
        }
        batch
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }
}
