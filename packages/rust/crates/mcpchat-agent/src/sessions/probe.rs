//! Periodic liveness check of connected sessions.
//!
//! A probe never removes a session and never counts as an access: it only clears the live
//! flag so the next use reconnects. It never waits on a session either. A session whose
//! check failed while calls were in flight stays live until a later pass finds it quiet.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::handle::ToolHandle;
use super::registry::SessionRegistry;
use super::session::Session;

/// Outcome of one probe pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeReport {
    /// Sessions whose handle was exercised.
    pub probed: usize,
    /// Sessions flipped to disconnected by this pass.
    pub failed: usize,
    /// Failed checks left live because other calls held the session.
    pub deferred: usize,
    /// Connected sessions skipped because a transition held them.
    pub skipped: usize,
}

pub struct HealthProbe {
    registry: Arc<SessionRegistry>,
    probe_timeout: Duration,
}

enum ProbeOutcome {
    Healthy,
    Failed,
    Deferred,
    Skipped,
}

impl HealthProbe {
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, probe_timeout: Duration) -> Self {
        Self {
            registry,
            probe_timeout: probe_timeout.max(Duration::from_millis(1)),
        }
    }

    /// Probe every connected session once, concurrently.
    pub async fn sweep(&self) -> ProbeReport {
        let mut probes = JoinSet::new();
        for session in self.registry.sessions() {
            if !session.is_connected() {
                continue;
            }
            let probe_timeout = self.probe_timeout;
            probes.spawn(async move { probe_one(&session, probe_timeout).await });
        }

        let mut report = ProbeReport::default();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(ProbeOutcome::Healthy) => report.probed += 1,
                Ok(ProbeOutcome::Failed) => {
                    report.probed += 1;
                    report.failed += 1;
                }
                Ok(ProbeOutcome::Deferred) => {
                    report.probed += 1;
                    report.deferred += 1;
                }
                Ok(ProbeOutcome::Skipped) => report.skipped += 1,
                Err(error) => tracing::warn!(
                    event = "mcp.session.probe.task_failed",
                    error = %error,
                    "health probe task failed"
                ),
            }
        }
        report
    }

    /// Probe every `period` until `cancel` fires.
    pub async fn run(self: Arc<Self>, period: Duration, cancel: CancellationToken) {
        let period = period.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.sweep().await;
                    if report.failed > 0 || report.deferred > 0 {
                        tracing::info!(
                            event = "mcp.session.probe.sweep",
                            probed = report.probed,
                            failed = report.failed,
                            deferred = report.deferred,
                            skipped = report.skipped,
                            "health probe marked sessions disconnected"
                        );
                    }
                }
            }
        }
        tracing::debug!(event = "mcp.session.probe.stopped", "health probe stopped");
    }
}

async fn probe_one(session: &Session, probe_timeout: Duration) -> ProbeOutcome {
    // A running transition (connect or close) already owns this session's state.
    let Some(lease) = session.try_lease() else {
        return ProbeOutcome::Skipped;
    };
    let generation = lease.generation();
    let outcome = tokio::time::timeout(probe_timeout, lease.list_tools()).await;
    drop(lease);
    let error = match outcome {
        Ok(Ok(_)) => return ProbeOutcome::Healthy,
        Ok(Err(error)) => format!("{error:#}"),
        Err(_) => format!("probe timed out after {}ms", probe_timeout.as_millis()),
    };
    let Some(flipped) = session.try_mark_disconnected(generation) else {
        tracing::debug!(
            event = "mcp.session.probe.deferred",
            user_id = %session.user_id(),
            generation,
            error = %error,
            "mcp health probe failed while calls were in flight; retrying next pass"
        );
        return ProbeOutcome::Deferred;
    };
    tracing::warn!(
        event = "mcp.session.probe.failed",
        user_id = %session.user_id(),
        generation,
        flipped,
        error = %error,
        "mcp health probe failed; session marked disconnected"
    );
    ProbeOutcome::Failed
}
