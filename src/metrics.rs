// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for sync-orchestrator.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `sync_orchestrator_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `component`: cache, sync, orchestrator
//! - `operation`: get, insert, update, delete, find, cycle
//! - `status`: hit, miss, completed, failed, success, error

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a cache lookup
pub fn record_cache_lookup(hit: bool) {
    counter!(
        "sync_orchestrator_cache_lookups_total",
        "status" => if hit { "hit" } else { "miss" }
    )
    .increment(1);
}

/// Record entries removed from the cache
pub fn record_cache_eviction(reason: &str, count: usize) {
    if count == 0 {
        return;
    }
    counter!(
        "sync_orchestrator_cache_evictions_total",
        "reason" => reason.to_string()
    )
    .increment(count as u64);
}

/// Record a prefetch attempt outcome (filled, missing, error)
pub fn record_prefetch(outcome: &str) {
    counter!(
        "sync_orchestrator_cache_prefetch_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Set current cache entry count
pub fn set_cache_entries(count: usize) {
    gauge!("sync_orchestrator_cache_entries").set(count as f64);
}

/// Set current prefetch queue depth
pub fn set_prefetch_queue(count: usize) {
    gauge!("sync_orchestrator_prefetch_queue").set(count as f64);
}

/// Record a sync operation reaching a final status
pub fn record_sync_operation(op_type: &str, status: &str) {
    counter!(
        "sync_orchestrator_sync_operations_total",
        "type" => op_type.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a sync operation appended to the log
pub fn record_sync_enqueued(op_type: &str, target: &str) {
    counter!(
        "sync_orchestrator_sync_enqueued_total",
        "type" => op_type.to_string(),
        "target" => target.to_string()
    )
    .increment(1);
}

/// Record a finished sync cycle
pub fn record_sync_cycle(duration: Duration, processed: usize) {
    histogram!("sync_orchestrator_sync_cycle_seconds").record(duration.as_secs_f64());
    histogram!("sync_orchestrator_sync_cycle_operations").record(processed as f64);
}

/// Record a sync cycle skipped because another was in flight
pub fn record_sync_skipped() {
    counter!("sync_orchestrator_sync_cycles_skipped_total").increment(1);
}

/// Record a fan-out enqueue outcome for one secondary
pub fn record_fanout(target: &str, success: bool) {
    counter!(
        "sync_orchestrator_fanout_total",
        "target" => target.to_string(),
        "status" => if success { "success" } else { "error" }
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(component: &str, operation: &str, duration: Duration) {
    histogram!(
        "sync_orchestrator_operation_seconds",
        "component" => component.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record an error
pub fn record_error(component: &str, operation: &str, error_type: &str) {
    counter!(
        "sync_orchestrator_errors_total",
        "component" => component.to_string(),
        "operation" => operation.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

/// Set a store's connection health
pub fn set_adapter_connected(adapter: &str, connected: bool) {
    gauge!(
        "sync_orchestrator_adapter_connected",
        "adapter" => adapter.to_string()
    )
    .set(if connected { 1.0 } else { 0.0 });
}

/// Set orchestrator lifecycle state
pub fn set_orchestrator_state(state: &str) {
    gauge!(
        "sync_orchestrator_state",
        "state" => state.to_string()
    )
    .set(1.0);
}

/// Latency timer that records on drop
pub struct LatencyTimer {
    component: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    pub fn new(component: &'static str, operation: &'static str) -> Self {
        Self {
            component,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.component, self.operation, self.start.elapsed());
    }
}
