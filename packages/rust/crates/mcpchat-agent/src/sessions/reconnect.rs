//! Connection lifecycle: `Disconnected → Connecting → Connected`, bounded retries.
//!
//! Retry policy is exponential backoff: the delay after failed attempt `n` is
//! `base * 2^(n-1)`, capped at [`MAX_RETRY_BACKOFF_MS`]. No delay follows the last attempt.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::SessionError;
use super::handle::ConnectionFactory;
use super::session::Session;

pub(crate) const MAX_RETRY_BACKOFF_MS: u64 = 30_000;

/// Attempt budget plus backoff base for one retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// At least one attempt is always made.
    #[must_use]
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
        }
    }

    /// Delay to wait after failed attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let base_ms = u64::try_from(self.base_backoff.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(compute_retry_backoff_ms(
            base_ms,
            attempt,
            self.max_attempts,
        ))
    }
}

pub(crate) fn compute_retry_backoff_ms(base_ms: u64, attempt: u32, retries: u32) -> u64 {
    if retries <= 1 {
        return 0;
    }
    let shift = attempt.saturating_sub(1).min(8);
    let multiplier = 1_u64 << shift;
    base_ms
        .saturating_mul(multiplier)
        .min(MAX_RETRY_BACKOFF_MS)
}

/// Brings a session to `Connected` through the connection factory.
pub struct Reconnector {
    factory: Arc<dyn ConnectionFactory>,
    server_url: String,
    policy: RetryPolicy,
    handshake_timeout: Duration,
}

impl Reconnector {
    #[must_use]
    pub fn new(
        factory: Arc<dyn ConnectionFactory>,
        server_url: impl Into<String>,
        policy: RetryPolicy,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            factory,
            server_url: server_url.into(),
            policy,
            handshake_timeout: handshake_timeout.max(Duration::from_millis(1)),
        }
    }

    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    #[must_use]
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Connect `session` unless it already is.
    ///
    /// Only one reconnect per session runs at a time; callers that queued behind it
    /// return as soon as they see the session connected.
    ///
    /// # Errors
    /// `Closed` if the session was closed, `Unavailable` once every attempt failed.
    pub async fn ensure_connected(&self, session: &Session) -> Result<(), SessionError> {
        self.connect_with(session, self.policy).await
    }

    /// [`Reconnector::ensure_connected`] with a single factory attempt, for callers that
    /// run their own retry loop around it.
    ///
    /// # Errors
    /// `Closed` if the session was closed, `Unavailable` if the attempt failed.
    pub async fn connect_once(&self, session: &Session) -> Result<(), SessionError> {
        self.connect_with(session, RetryPolicy::new(1, Duration::ZERO)).await
    }

    async fn connect_with(
        &self,
        session: &Session,
        policy: RetryPolicy,
    ) -> Result<(), SessionError> {
        if session.is_connected() {
            return Ok(());
        }
        let mut transition = session.begin_transition().await;
        if transition.is_closed() {
            return Err(SessionError::Closed {
                user_id: session.user_id().to_string(),
            });
        }
        if transition.is_connected() {
            return Ok(());
        }
        if let Some(stale) = transition.take_stale_handle()
            && let Err(error) = stale.close().await
        {
            tracing::debug!(
                event = "mcp.session.stale_close.failed",
                user_id = %session.user_id(),
                error = %error,
                "closing stale mcp handle failed"
            );
        }

        let attempts = policy.max_attempts;
        let mut last_error = String::from("no connect attempt made");
        for attempt in 1..=attempts {
            tracing::debug!(
                event = "mcp.session.connect.attempt",
                url = %self.server_url,
                user_id = %session.user_id(),
                attempt,
                attempts,
                "mcp session connect attempt started"
            );
            let started = Instant::now();
            let connect = self.factory.connect(&self.server_url, session.credential());
            match tokio::time::timeout(self.handshake_timeout, connect).await {
                Ok(Ok(handle)) => {
                    transition.install(handle);
                    tracing::info!(
                        event = "mcp.session.connect.succeeded",
                        url = %self.server_url,
                        user_id = %session.user_id(),
                        attempt,
                        attempts,
                        duration_ms = started.elapsed().as_millis(),
                        "mcp session connected"
                    );
                    return Ok(());
                }
                Ok(Err(error)) => {
                    last_error = format!("{error:#}");
                }
                Err(_) => {
                    last_error = format!(
                        "MCP handshake timed out after {}ms",
                        self.handshake_timeout.as_millis()
                    );
                }
            }
            tracing::warn!(
                event = "mcp.session.connect.failed",
                url = %self.server_url,
                user_id = %session.user_id(),
                attempt,
                attempts,
                duration_ms = started.elapsed().as_millis(),
                error = %last_error,
                "mcp session connect failed"
            );
            if attempt < attempts {
                tokio::time::sleep(policy.delay_after(attempt)).await;
            }
        }

        tracing::error!(
            event = "mcp.session.connect.exhausted",
            url = %self.server_url,
            user_id = %session.user_id(),
            attempts,
            error = %last_error,
            "mcp session connect failed on every attempt; tool access unavailable"
        );
        Err(SessionError::Unavailable {
            user_id: session.user_id().to_string(),
            attempts,
            last_error,
        })
    }
}

#[cfg(test)]
#[path = "../../tests/sessions/retry_backoff.rs"]
mod tests;
