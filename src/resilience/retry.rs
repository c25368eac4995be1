// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry with exponential backoff, used when bringing adapters online.
//!
//! # Example
//!
//! ```
//! use sync_orchestrator::{RetryConfig, SyncConfig};
//! use std::time::Duration;
//!
//! let config = RetryConfig::from_sync_config(&SyncConfig::default());
//! assert_eq!(config.max_attempts, 3);
//! assert_eq!(config.initial_delay, Duration::from_secs(1));
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::adapter::{Adapter, AdapterError};
use crate::config::SyncConfig;

/// Backoff settings for a bounded retry loop.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    /// Total attempts including the first one (minimum 1)
    pub max_attempts: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from_sync_config(&SyncConfig::default())
    }
}

impl RetryConfig {
    /// Derive from `retry_attempts` / `retry_delay_ms`. The delay doubles
    /// per attempt, capped at 30x the initial delay.
    #[must_use]
    pub fn from_sync_config(config: &SyncConfig) -> Self {
        let initial_delay = config.retry_delay();
        Self {
            initial_delay,
            max_delay: initial_delay.saturating_mul(30),
            factor: 2.0,
            max_attempts: config.retry_attempts.max(1),
        }
    }

    /// Single attempt, no waiting.
    #[must_use]
    pub fn none() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            factor: 1.0,
            max_attempts: 1,
        }
    }

    /// Delay before retry number `retry` (0-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.factor.powi(retry as i32);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }
}

/// Run `operation` until it succeeds or `max_attempts` is reached.
/// Returns the last error on exhaustion.
pub async fn retry<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if attempt > 0 {
                    info!(operation = operation_name, retries = attempt, "Operation succeeded after retry");
                }
                return Ok(val);
            }
            Err(err) => {
                attempt += 1;
                if attempt >= max_attempts {
                    warn!(operation = operation_name, attempts = attempt, error = %err, "Giving up");
                    return Err(err);
                }

                let delay = config.delay_for(attempt as u32 - 1);
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    error = %err,
                    ?delay,
                    "Operation failed, retrying"
                );
                sleep(delay).await;
            }
        }
    }
}

/// Connect an adapter, retrying transient failures. No-op when already connected.
pub async fn connect_with_retry(adapter: &Arc<dyn Adapter>, config: &RetryConfig) -> Result<(), AdapterError> {
    if adapter.is_connected() {
        return Ok(());
    }
    let name = adapter.name().to_string();
    let result = retry(&format!("connect {}", name), config, move || adapter.connect()).await;
    crate::metrics::set_adapter_connected(&name, result.is_ok());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::InMemoryAdapter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast(max_attempts: usize) -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
            max_attempts,
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_try() {
        let result: Result<i32, String> = retry("op", &fast(3), || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let attempts = AtomicUsize::new(0);

        let result: Result<i32, String> = retry("op", &fast(3), || {
            let count = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if count < 3 {
                    Err(format!("fail {}", count))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempts() {
        let attempts = AtomicUsize::new(0);

        let result: Result<i32, String> = retry("op", &fast(3), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err("always fail".to_string()) }
        })
        .await;

        assert_eq!(result.unwrap_err(), "always fail");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let attempts = AtomicUsize::new(0);
        let _: Result<(), String> = retry("op", &fast(0), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err("nope".to_string()) }
        })
        .await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_from_sync_config() {
        let sync = SyncConfig {
            retry_attempts: 5,
            retry_delay_ms: 200,
            ..Default::default()
        };
        let config = RetryConfig::from_sync_config(&sync);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_delay, Duration::from_millis(200));
        assert_eq!(config.max_delay, Duration::from_secs(6));
    }

    #[test]
    fn test_delay_backoff_and_cap() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            factor: 2.0,
            max_attempts: 10,
        };
        assert_eq!(config.delay_for(0), Duration::from_millis(100));
        assert_eq!(config.delay_for(1), Duration::from_millis(200));
        assert_eq!(config.delay_for(2), Duration::from_millis(400));
        assert_eq!(config.delay_for(3), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_connect_with_retry() {
        let adapter: Arc<dyn Adapter> = Arc::new(InMemoryAdapter::new("store"));
        assert!(!adapter.is_connected());

        connect_with_retry(&adapter, &RetryConfig::none()).await.unwrap();
        assert!(adapter.is_connected());

        // Already connected is a no-op
        connect_with_retry(&adapter, &RetryConfig::none()).await.unwrap();
    }
}
