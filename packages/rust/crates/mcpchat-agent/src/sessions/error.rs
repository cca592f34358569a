//! Error types for the per-user session core.
//!
//! Transport failures stay `anyhow::Error` inside the retry loops; only the
//! exhausted outcome surfaces to callers, as one of these variants.

use thiserror::Error;

/// Failure surfaced to the caller that asked for a user's tool access.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// MCP integration is switched off in settings.
    #[error("MCP tool access is disabled")]
    Disabled,

    /// The session manager is stopping and accepts no new work.
    #[error("MCP session manager is shutting down")]
    ShuttingDown,

    /// Every connect attempt failed; the session stays disconnected.
    #[error(
        "tool access unavailable for user {user_id} after {attempts} connect attempts: {last_error}"
    )]
    Unavailable {
        user_id: String,
        attempts: u32,
        last_error: String,
    },

    /// `tools/list` kept failing across reconnects.
    #[error("tool listing failed for user {user_id} after {attempts} attempts: {last_error}")]
    ListingFailed {
        user_id: String,
        attempts: u32,
        last_error: String,
    },

    /// The session was closed (logout, idle eviction or shutdown) while in use.
    #[error("session for user {user_id} is closed")]
    Closed { user_id: String },

    /// A single `tools/call` failed on a live connection.
    #[error("tool call {tool} failed for user {user_id}: {error}")]
    ToolCall {
        user_id: String,
        tool: String,
        error: String,
    },
}

impl SessionError {
    /// True for the retry-exhausted family (`Unavailable`, `ListingFailed`).
    #[must_use]
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::ListingFailed { .. })
    }
}
