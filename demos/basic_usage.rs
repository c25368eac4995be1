// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic sync-orchestrator usage example.
//!
//! Demonstrates:
//! 1. A primary store and two secondaries (in-memory)
//! 2. Writing a handful of entities through the orchestrator
//! 3. Cache-first reads and cache stats
//! 4. Replaying the operation log onto the secondaries
//! 5. Displaying metrics
//! 6. Clean shutdown
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;
use std::time::Duration;
use serde_json::json;
use sync_orchestrator::{
    Adapter, Entity, InMemoryAdapter, Orchestrator, OrchestratorConfig, Query, ReadOptions,
    SyncStatus, WriteOptions,
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║         sync-orchestrator: Basic Usage Example                ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure and start
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Configuring orchestrator...");

    let mut config = OrchestratorConfig::default();
    // Replicate quickly for the demo
    config.sync.sync_interval_ms = 200;
    config.cache.max_size = 100;

    let primary = Arc::new(InMemoryAdapter::new("primary"));
    let search = Arc::new(InMemoryAdapter::new("search"));
    let analytics = Arc::new(InMemoryAdapter::new("analytics"));

    let orchestrator = Orchestrator::new(config, primary.clone() as Arc<dyn Adapter>);
    println!("   State: {}", orchestrator.state());

    println!("\n🚀 Starting (connecting primary, initializing operation log)...");
    orchestrator.start().await?;
    orchestrator.add_secondary("search", search.clone() as Arc<dyn Adapter>).await?;
    orchestrator.add_secondary("analytics", analytics.clone() as Arc<dyn Adapter>).await?;
    println!("   ✅ Running with secondaries {:?}", orchestrator.secondaries());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Write entities
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Inserting 5 users...");
    let users = vec![
        json!({"name": "Alice", "role": "admin"}),
        json!({"name": "Bob", "role": "user"}),
        json!({"name": "Carol", "role": "user"}),
        json!({"name": "Dave", "role": "user"}),
        json!({"name": "Eve", "role": "auditor"}),
    ];

    let mut ids = Vec::new();
    for attrs in users {
        let mut entity = Entity::new("user");
        if let Some(map) = attrs.as_object() {
            entity.attributes = map.clone();
        }
        let start = std::time::Instant::now();
        let stored = orchestrator.insert("users", entity, WriteOptions::default()).await?;
        println!("   └─ {} → {} ({:?})", stored.id, json!(stored.attributes), start.elapsed());
        ids.push(stored.id);
    }

    let mut patch = serde_json::Map::new();
    patch.insert("role".into(), json!("owner"));
    let alice = orchestrator.update("users", &ids[0], patch, WriteOptions::default()).await?;
    println!("   └─ Promoted {} to {}", alice.id, alice.attr("role").unwrap_or(&json!(null)));

    orchestrator.delete("users", &ids[4], WriteOptions::default()).await?;
    println!("   └─ Deleted {}", ids[4]);

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Reads
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📖 Reading back (cache-first)...");
    for id in &ids {
        let found = orchestrator.find_by_id("users", id, ReadOptions::default()).await?;
        match found {
            Some(user) => println!("   └─ {} → {}", id, user.attr("name").unwrap_or(&json!(null))),
            None => println!("   └─ {} → NOT FOUND", id),
        }
    }

    let regular = orchestrator
        .count("users", &Query::field_eq("role", "user"))
        .await?;
    println!("   └─ Users with role=user: {}", regular);

    let stats = orchestrator.cache().stats();
    println!(
        "   ⚡ Cache: {} hits / {} misses (hit rate {:.0}%)",
        stats.hits,
        stats.misses,
        stats.hit_rate * 100.0
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Replication
    // ─────────────────────────────────────────────────────────────────────────
    let sync = orchestrator.sync_manager();
    println!("\n🔁 Pending operations: {}", sync.pending_count().await?);
    println!("   ⏳ Waiting for the background sync loop...");
    tokio::time::sleep(Duration::from_millis(500)).await;

    let completed = sync.operations_by_status(SyncStatus::Completed, None).await?;
    println!("   └─ Completed operations: {}", completed.len());
    println!("   └─ search:    {} users", search.len("users"));
    println!("   └─ analytics: {} users", analytics.len("users"));

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Raw Metrics:");
    dump_metrics(&snapshotter);

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Shutting down...");
    orchestrator.shutdown().await;
    println!("   ✅ Shutdown complete! State: {}", orchestrator.state());

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Dump all captured metrics, grouped by kind
fn dump_metrics(snapshotter: &Snapshotter) {
    let snapshot = snapshotter.snapshot();

    let mut counters: Vec<_> = vec![];
    let mut gauges: Vec<_> = vec![];
    let mut histograms: Vec<_> = vec![];

    for (composite_key, _, _, value) in snapshot.into_vec() {
        let (_, key) = composite_key.into_parts();
        let name = key.name().to_string();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        match value {
            DebugValue::Counter(v) => counters.push((name, label_str, v)),
            DebugValue::Gauge(v) => gauges.push((name, label_str, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                histograms.push((name, label_str, count, sum));
            }
        }
    }

    counters.sort_by(|a, b| a.0.cmp(&b.0));
    gauges.sort_by(|a, b| a.0.cmp(&b.0));
    histograms.sort_by(|a, b| a.0.cmp(&b.0));

    if !counters.is_empty() {
        println!("   ┌─ Counters");
        for (name, labels, value) in &counters {
            println!("   │  └─ {}{} = {}", name, labels, value);
        }
    }
    if !gauges.is_empty() {
        println!("   ├─ Gauges");
        for (name, labels, value) in &gauges {
            println!("   │  └─ {}{} = {:.2}", name, labels, value);
        }
    }
    if !histograms.is_empty() {
        println!("   └─ Histograms");
        for (name, labels, count, sum) in &histograms {
            let avg = if *count > 0 { sum / *count as f64 } else { 0.0 };
            println!("      └─ {}{} count={} avg={:.6}", name, labels, count, avg);
        }
    }
    if counters.is_empty() && gauges.is_empty() && histograms.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
}
