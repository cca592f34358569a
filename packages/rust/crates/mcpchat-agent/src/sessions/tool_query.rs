//! Retrying `tools/list` for one user, reconnecting between attempts.

use std::sync::Arc;
use std::time::Duration;

use super::error::SessionError;
use super::handle::{ToolHandle, ToolList};
use super::reconnect::{Reconnector, RetryPolicy};
use super::session::Session;

pub struct ToolQuery {
    reconnector: Arc<Reconnector>,
    policy: RetryPolicy,
    call_timeout: Duration,
}

impl ToolQuery {
    #[must_use]
    pub fn new(reconnector: Arc<Reconnector>, policy: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            reconnector,
            policy,
            call_timeout: call_timeout.max(Duration::from_millis(1)),
        }
    }

    /// List the tools visible to `session`'s credential.
    ///
    /// Each attempt makes at most one connect and one `tools/list`, so the attempt budget
    /// bounds the whole call. A failed call marks the session disconnected and the next
    /// attempt reconnects first. Never returns an empty list in place of a failure.
    ///
    /// # Errors
    /// `Closed` if the session was closed underneath the query (the caller should resolve a
    /// fresh session), `ListingFailed` once the attempt budget is spent.
    pub async fn list_tools(&self, session: &Session) -> Result<ToolList, SessionError> {
        let attempts = self.policy.max_attempts;
        let mut last_error = String::from("no listing attempt made");
        for attempt in 1..=attempts {
            match self.reconnector.connect_once(session).await {
                Ok(()) => match self.list_once(session).await {
                    Ok(tools) => {
                        session.touch();
                        if attempt > 1 {
                            tracing::info!(
                                event = "mcp.session.tools_list.recovered",
                                user_id = %session.user_id(),
                                attempt,
                                tool_count = tools.len(),
                                "mcp tools/list succeeded after retry"
                            );
                        }
                        return Ok(tools);
                    }
                    Err(error) => last_error = error,
                },
                Err(error @ SessionError::Closed { .. }) => return Err(error),
                Err(error) => last_error = error.to_string(),
            }
            if attempt < attempts {
                let delay = self.policy.delay_after(attempt);
                tracing::warn!(
                    event = "mcp.session.tools_list.retry",
                    user_id = %session.user_id(),
                    attempt,
                    attempts,
                    delay_ms = delay.as_millis(),
                    error = %last_error,
                    "mcp tools/list failed; reconnecting before retry"
                );
                tokio::time::sleep(delay).await;
            }
        }
        tracing::error!(
            event = "mcp.session.tools_list.failed",
            user_id = %session.user_id(),
            attempts,
            error = %last_error,
            "mcp tools/list failed on every attempt"
        );
        Err(SessionError::ListingFailed {
            user_id: session.user_id().to_string(),
            attempts,
            last_error,
        })
    }

    async fn list_once(&self, session: &Session) -> Result<ToolList, String> {
        let Some(lease) = session.lease().await else {
            return Err("session disconnected before tools/list started".to_string());
        };
        let generation = lease.generation();
        let outcome = tokio::time::timeout(self.call_timeout, lease.list_tools()).await;
        drop(lease);
        let error = match outcome {
            Ok(Ok(tools)) => return Ok(tools),
            Ok(Err(error)) => format!("{error:#}"),
            Err(_) => format!(
                "tools/list timed out after {}ms",
                self.call_timeout.as_millis()
            ),
        };
        session.mark_disconnected(generation);
        Err(error)
    }
}
