// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use tokio::time::Instant;

/// Eviction metadata for one cache entry.
#[derive(Debug, Clone)]
pub struct EvictionCandidate<K> {
    pub key: K,
    pub last_accessed: Instant,
    /// Insertion sequence, used to break recency ties
    pub seq: u64,
}

/// Least-recently-used victim selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct LruPolicy;

impl LruPolicy {
    /// Number of entries to drop so that `len` fits in `max_size`.
    #[must_use]
    pub fn overflow(len: usize, max_size: usize) -> usize {
        len.saturating_sub(max_size)
    }

    /// Select victims for eviction (oldest access first).
    ///
    /// Ties on `last_accessed` fall back to insertion order, so the choice is
    /// deterministic but carries no further meaning.
    pub fn select_victims<K>(&self, mut candidates: Vec<EvictionCandidate<K>>, count: usize) -> Vec<K> {
        if count == 0 {
            return Vec::new();
        }
        candidates.sort_by(|a, b| {
            a.last_accessed
                .cmp(&b.last_accessed)
                .then(a.seq.cmp(&b.seq))
        });
        candidates.into_iter().take(count).map(|c| c.key).collect()
    }
}
