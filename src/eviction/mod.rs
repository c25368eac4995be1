// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Eviction policies for the read cache.
//!
//! The cache evicts on two triggers:
//! - TTL expiry, checked lazily on `get` and eagerly during cleanup
//! - Size pressure, when the entry count exceeds `max_size`
//!
//! Size pressure is resolved by [`LruPolicy`]: entries are ranked by last
//! access time and the least recently used are dropped until the cache fits.

pub mod lru;

pub use lru::{EvictionCandidate, LruPolicy};
