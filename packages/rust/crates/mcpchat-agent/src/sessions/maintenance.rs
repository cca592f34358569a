//! Background workers: idle reaper and health probe on independent timers.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::probe::HealthProbe;
use super::reaper::IdleReaper;

/// Owns the running maintenance tasks until [`SessionMaintenance::shutdown`].
pub struct SessionMaintenance {
    cancel: CancellationToken,
    workers: JoinSet<()>,
}

impl SessionMaintenance {
    /// Spawn both workers on the current runtime.
    #[must_use]
    pub fn spawn(
        reaper: Arc<IdleReaper>,
        sweep_interval: Duration,
        probe: Arc<HealthProbe>,
        probe_interval: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let mut workers = JoinSet::new();
        workers.spawn(reaper.run(sweep_interval, cancel.child_token()));
        workers.spawn(probe.run(probe_interval, cancel.child_token()));
        tracing::info!(
            event = "mcp.session.maintenance.started",
            sweep_interval_secs = sweep_interval.as_secs(),
            probe_interval_secs = probe_interval.as_secs(),
            "mcp session maintenance started"
        );
        Self { cancel, workers }
    }

    /// Stop both workers. A worker mid-sweep gets `grace` to finish before it is aborted.
    pub async fn shutdown(mut self, grace: Duration) {
        self.cancel.cancel();
        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = self.workers.join_next().await {
                if let Err(error) = joined {
                    tracing::warn!(
                        event = "mcp.session.maintenance.join_failed",
                        error = %error,
                        "maintenance worker ended abnormally"
                    );
                }
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                event = "mcp.session.maintenance.aborted",
                grace_ms = grace.as_millis(),
                "maintenance workers did not stop within grace; aborting"
            );
            self.workers.abort_all();
        }
    }
}
