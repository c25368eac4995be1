// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the orchestrator, cache and sync manager.
//!
//! # Example
//!
//! ```
//! use sync_orchestrator::OrchestratorConfig;
//!
//! // Minimal config (uses defaults)
//! let config = OrchestratorConfig::default();
//! assert_eq!(config.sync.sync_operations_collection, "_sync_operations");
//! assert_eq!(config.cache.max_size, 1000);
//!
//! // Overrides
//! let config: OrchestratorConfig = serde_json::from_str(r#"{
//!     "cache": { "max_size": 50, "default_ttl_ms": 1000 },
//!     "sync": { "batch_size": 10 }
//! }"#).unwrap();
//! assert_eq!(config.cache.max_size, 50);
//! assert_eq!(config.sync.batch_size, 10);
//! assert_eq!(config.sync.sync_interval_ms, 5_000);
//! ```

use std::time::Duration;
use serde::Deserialize;

/// Read cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// TTL applied when `set` is called without an explicit one (default: 5 min)
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,

    /// Max number of entries before LRU eviction kicks in
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Background cleanup interval (default: 30s)
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,

    /// Queue missed keys for background population
    #[serde(default = "default_prefetch_enabled")]
    pub prefetch_enabled: bool,

    /// Max keys waiting in the prefetch queue. Misses beyond this are not queued.
    #[serde(default = "default_prefetch_threshold")]
    pub prefetch_threshold: usize,

    /// Keys fetched per prefetch batch
    #[serde(default = "default_prefetch_batch_size")]
    pub prefetch_batch_size: usize,
}

fn default_ttl_ms() -> u64 { 300_000 }
fn default_max_size() -> usize { 1000 }
fn default_cleanup_interval_ms() -> u64 { 30_000 }
fn default_prefetch_enabled() -> bool { true }
fn default_prefetch_threshold() -> usize { 1000 }
fn default_prefetch_batch_size() -> usize { 10 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: default_ttl_ms(),
            max_size: default_max_size(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
            prefetch_enabled: default_prefetch_enabled(),
            prefetch_threshold: default_prefetch_threshold(),
            prefetch_batch_size: default_prefetch_batch_size(),
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms.max(1))
    }
}

/// Operation log and replicator settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Reserved collection on the primary that holds the operation log
    #[serde(default = "default_sync_operations_collection")]
    pub sync_operations_collection: String,

    /// Interval between sync cycles (default: 5s)
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,

    /// Max pending operations replayed per cycle
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Connection attempts when bringing adapters online.
    /// Replay of failed operations does not retry.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,

    /// Initial delay between connection attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_sync_operations_collection() -> String { "_sync_operations".to_string() }
fn default_sync_interval_ms() -> u64 { 5_000 }
fn default_batch_size() -> usize { 100 }
fn default_retry_attempts() -> usize { 3 }
fn default_retry_delay_ms() -> u64 { 1_000 }

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_operations_collection: default_sync_operations_collection(),
            sync_interval_ms: default_sync_interval_ms(),
            batch_size: default_batch_size(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms.max(1))
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Top-level configuration for the [`crate::Orchestrator`].
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Name recorded as `sourceAdapter` on every sync operation
    #[serde(default = "default_primary_name")]
    pub primary_name: String,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    /// Start the periodic sync loop in `start()`
    #[serde(default = "default_true")]
    pub auto_start_sync: bool,

    /// Start the periodic cache cleanup loop in `start()`
    #[serde(default = "default_true")]
    pub auto_start_cleanup: bool,

    /// Capacity of the change event broadcast channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_primary_name() -> String { "primary".to_string() }
fn default_true() -> bool { true }
fn default_event_buffer() -> usize { 256 }

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            primary_name: default_primary_name(),
            cache: CacheConfig::default(),
            sync: SyncConfig::default(),
            auto_start_sync: default_true(),
            auto_start_cleanup: default_true(),
            event_buffer: default_event_buffer(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.primary_name, "primary");
        assert_eq!(config.cache.cleanup_interval(), Duration::from_secs(30));
        assert_eq!(config.cache.prefetch_batch_size, 10);
        assert_eq!(config.sync.sync_interval(), Duration::from_secs(5));
        assert_eq!(config.sync.retry_attempts, 3);
        assert!(config.auto_start_sync);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: OrchestratorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.cache.default_ttl(), Duration::from_secs(300));
        assert_eq!(config.sync.batch_size, 100);
        assert_eq!(config.event_buffer, 256);
    }

    #[test]
    fn test_partial_override() {
        let config: OrchestratorConfig = serde_json::from_str(
            r#"{"primary_name": "github", "auto_start_sync": false, "cache": {"prefetch_enabled": false}}"#,
        ).unwrap();
        assert_eq!(config.primary_name, "github");
        assert!(!config.auto_start_sync);
        assert!(!config.cache.prefetch_enabled);
        assert_eq!(config.cache.max_size, 1000);
    }

    #[test]
    fn test_zero_intervals_clamped() {
        let cache = CacheConfig { cleanup_interval_ms: 0, ..Default::default() };
        assert_eq!(cache.cleanup_interval(), Duration::from_millis(1));
    }
}
