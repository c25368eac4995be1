// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Read cache in front of the primary store.
//!
//! Entries are keyed by `(collection, id)` and carry a TTL. The cache is
//! bounded: inserting past `max_size` evicts the least recently used entries
//! (ties broken by insertion order). Misses are queued and filled from the
//! source adapter during the periodic cleanup cycle.

mod entry;
mod manager;

pub use entry::{CacheEntry, CacheKey};
pub use manager::{CacheManager, CacheStats, CleanupReport};
