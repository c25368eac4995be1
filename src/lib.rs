//! # Sync Orchestrator
//!
//! Keeps one authoritative primary store and any number of secondary stores
//! approximately consistent through a durable operation log, with a
//! read-through cache in front of the primary.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Orchestrator                         │
//! │  • insert / update / delete / find_by_id / find             │
//! │  • Lifecycle: Created → Connecting → Ready → Running        │
//! └─────────────────────────────────────────────────────────────┘
//!          │ reads (cache-first)              │ writes
//!          ▼                                  ▼
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │       CacheManager       │   │       Primary Adapter        │
//! │  • TTL + LRU bound       │◄──│  • Ground truth              │
//! │  • Prefetch on miss      │   │  • Hosts the operation log   │
//! └──────────────────────────┘   └──────────────────────────────┘
//!                                             │
//!                              (one SyncOperation per secondary)
//!                                             ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        SyncManager                          │
//! │  • Periodic, non-overlapping replay cycles                  │
//! │  • pending → executing → completed | failed                 │
//! └─────────────────────────────────────────────────────────────┘
//!                                             │
//!                                             ▼
//!                                  Secondary Adapters (B, C, …)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use sync_orchestrator::{
//!     Adapter, Entity, InMemoryAdapter, Orchestrator, OrchestratorConfig, WriteOptions,
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let primary: Arc<dyn Adapter> = Arc::new(InMemoryAdapter::new("primary"));
//!     let search: Arc<dyn Adapter> = Arc::new(InMemoryAdapter::new("search"));
//!
//!     let orchestrator = Orchestrator::new(OrchestratorConfig::default(), primary);
//!     orchestrator.start().await.expect("Failed to start");
//!     orchestrator.add_secondary("search", search.clone()).await.expect("Failed to add secondary");
//!
//!     let issue = Entity::new("issue").with_attr("name", json!("Bug"));
//!     let stored = orchestrator.insert("issues", issue, WriteOptions::default()).await.unwrap();
//!
//!     // Replicate now instead of waiting for the next interval
//!     orchestrator.sync_manager().sync().await;
//!     assert!(search.find_by_id("issues", &stored.id).await.unwrap().is_some());
//!
//!     orchestrator.shutdown().await;
//! }
//! ```
//!
//! ## Features
//!
//! - **Typed queries**: equality, ranges, set membership, existence, and/or/not
//! - **Read cache**: TTL expiry, LRU bound, background prefetch of missed keys
//! - **Durable fan-out**: every write becomes a logged operation per secondary
//! - **Idempotent replay**: create and update replace or insert the whole entity on the target
//! - **Change events**: broadcast notifications after each primary write
//! - **Retry Logic**: exponential backoff when connecting adapters
//!
//! ## Configuration
//!
//! See [`OrchestratorConfig`] for all configuration options.
//!
//! ## Modules
//!
//! - [`orchestrator`]: The [`Orchestrator`] facade
//! - [`adapter`]: The [`Adapter`] contract and the in-memory backend
//! - [`cache`]: [`CacheManager`] and its entries
//! - [`sync`]: Operation log model and [`SyncManager`]
//! - [`query`]: Query AST and find options
//! - [`eviction`]: LRU victim selection
//! - [`resilience`]: Retry with backoff

pub mod config;
pub mod entity;
pub mod query;
pub mod adapter;
pub mod eviction;
pub mod cache;
pub mod sync;
pub mod orchestrator;
pub mod resilience;
pub mod metrics;

mod background;

pub use config::{CacheConfig, OrchestratorConfig, SyncConfig};
pub use entity::Entity;
pub use query::{FieldOperator, FindOptions, Query, QueryBuilder, QueryNode, QueryValue, SortDirection};
pub use adapter::{Adapter, AdapterError, InMemoryAdapter, Patch};
pub use cache::{CacheEntry, CacheKey, CacheManager, CacheStats, CleanupReport};
pub use sync::{
    BatchOperation, SyncCycleReport, SyncError, SyncManager, SyncOperation, SyncOperationType,
    SyncStats, SyncStatus,
};
pub use orchestrator::{
    ChangeEvent, Orchestrator, OrchestratorError, OrchestratorState, ReadOptions, WriteOptions,
};
pub use resilience::retry::RetryConfig;
pub use metrics::LatencyTimer;
