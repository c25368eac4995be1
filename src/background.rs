// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Periodic background loops.
//!
//! Both the cache cleanup cycle and the sync cycle run as a spawned task that
//! ticks on a fixed interval until a shutdown signal arrives over a `watch`
//! channel. Stopping never cancels a tick that is already running: the signal
//! is only observed between ticks.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

pub(crate) struct BackgroundTask {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// Spawn a loop that runs `tick` every `period`. The first tick fires
    /// one full period after spawning.
    pub(crate) fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(task = name, period_ms = period.as_millis() as u64, "Background loop started");

            loop {
                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => tick().await,
                }
            }
            debug!(task = name, "Background loop stopped");
        });

        Self { name, shutdown, handle }
    }

    /// Signal the loop to stop. A tick in flight runs to completion.
    pub(crate) fn stop(self) {
        let _ = self.shutdown.send(true);
        debug!(task = self.name, "Background loop stop requested");
    }

    /// Signal the loop to stop and wait until it has exited.
    pub(crate) async fn stop_and_wait(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}
