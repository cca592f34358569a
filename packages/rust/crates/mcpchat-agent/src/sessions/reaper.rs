//! Evicts sessions that have not been accessed for longer than the idle limit.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::registry::SessionRegistry;

pub struct IdleReaper {
    registry: Arc<SessionRegistry>,
    max_idle: Duration,
}

impl IdleReaper {
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, max_idle: Duration) -> Self {
        Self { registry, max_idle }
    }

    #[must_use]
    pub fn max_idle(&self) -> Duration {
        self.max_idle
    }

    /// One pass: remove and close every session idle longer than `max_idle`.
    ///
    /// Removal re-checks the idle time under the registry entry, so a session accessed
    /// between candidate selection and removal survives. Closes of different users run
    /// concurrently; each close waits for that user's in-flight calls. Returns the number
    /// of sessions evicted.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut closes = JoinSet::new();
        for session in self.registry.sessions() {
            let idle_for = session.idle_for(now);
            if idle_for <= self.max_idle {
                continue;
            }
            let Some(evicted) =
                self.registry
                    .remove_if_idle(session.user_id(), &session, now, self.max_idle)
            else {
                continue;
            };
            tracing::info!(
                event = "mcp.session.idle.evicted",
                user_id = %evicted.user_id(),
                idle_secs = idle_for.as_secs(),
                max_idle_secs = self.max_idle.as_secs(),
                "evicting idle mcp session"
            );
            closes.spawn(async move { evicted.close().await });
        }

        let mut evicted = 0;
        while let Some(joined) = closes.join_next().await {
            match joined {
                Ok(_) => evicted += 1,
                Err(error) => tracing::warn!(
                    event = "mcp.session.idle.close_failed",
                    error = %error,
                    "idle session close task failed"
                ),
            }
        }
        if evicted > 0 {
            tracing::debug!(
                event = "mcp.session.idle.sweep",
                evicted,
                remaining = self.registry.len(),
                "idle sweep completed"
            );
        }
        evicted
    }

    /// Sweep every `period` until `cancel` fires. The first sweep runs one period after start.
    pub async fn run(self: Arc<Self>, period: Duration, cancel: CancellationToken) {
        let period = period.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep().await;
                }
            }
        }
        tracing::debug!(event = "mcp.session.idle.stopped", "idle reaper stopped");
    }
}
