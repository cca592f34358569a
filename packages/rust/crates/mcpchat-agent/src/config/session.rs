//! Resolved session-manager configuration.

use std::time::Duration;

use super::settings::RuntimeSettings;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3002/mcp";
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;
pub const DEFAULT_CONNECT_BACKOFF_MS: u64 = 1_000;
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_LIST_TOOLS_ATTEMPTS: u32 = 3;
pub const DEFAULT_LIST_TOOLS_BACKOFF_MS: u64 = 1_000;
pub const DEFAULT_IDLE_SWEEP_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_MAX_IDLE_SECS: u64 = 1_800;
pub const DEFAULT_HEALTH_PROBE_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_HEALTH_PROBE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;
pub const DEFAULT_GATEWAY_BIND: &str = "0.0.0.0:8080";

const MAX_ATTEMPTS: u32 = 10;

/// Fully resolved knobs for [`crate::McpSessionService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpSessionConfig {
    pub enabled: bool,
    pub server_url: String,
    pub connect_attempts: u32,
    pub connect_backoff: Duration,
    pub handshake_timeout: Duration,
    pub tool_timeout: Duration,
    pub list_tools_attempts: u32,
    pub list_tools_backoff: Duration,
    pub idle_sweep_interval: Duration,
    pub max_idle: Duration,
    pub health_probe_interval: Duration,
    pub health_probe_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for McpSessionConfig {
    fn default() -> Self {
        Self::from_settings(&RuntimeSettings::default())
    }
}

impl McpSessionConfig {
    /// Apply defaults to unset fields and clamp the rest into usable ranges.
    #[must_use]
    pub fn from_settings(settings: &RuntimeSettings) -> Self {
        let mcp = &settings.mcp;
        let server_url = mcp
            .server_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_SERVER_URL)
            .to_string();
        Self {
            enabled: mcp.enabled.unwrap_or(true),
            server_url,
            connect_attempts: attempts(mcp.connect_attempts, DEFAULT_CONNECT_ATTEMPTS),
            connect_backoff: Duration::from_millis(
                mcp.connect_backoff_ms.unwrap_or(DEFAULT_CONNECT_BACKOFF_MS),
            ),
            handshake_timeout: secs(mcp.handshake_timeout_secs, DEFAULT_HANDSHAKE_TIMEOUT_SECS),
            tool_timeout: secs(mcp.tool_timeout_secs, DEFAULT_TOOL_TIMEOUT_SECS),
            list_tools_attempts: attempts(mcp.list_tools_attempts, DEFAULT_LIST_TOOLS_ATTEMPTS),
            list_tools_backoff: Duration::from_millis(
                mcp.list_tools_backoff_ms
                    .unwrap_or(DEFAULT_LIST_TOOLS_BACKOFF_MS),
            ),
            idle_sweep_interval: secs(
                mcp.idle_sweep_interval_secs,
                DEFAULT_IDLE_SWEEP_INTERVAL_SECS,
            ),
            max_idle: secs(mcp.max_idle_secs, DEFAULT_MAX_IDLE_SECS),
            health_probe_interval: secs(
                mcp.health_probe_interval_secs,
                DEFAULT_HEALTH_PROBE_INTERVAL_SECS,
            ),
            health_probe_timeout: Duration::from_millis(
                mcp.health_probe_timeout_ms
                    .unwrap_or(DEFAULT_HEALTH_PROBE_TIMEOUT_MS)
                    .max(1),
            ),
            shutdown_grace: Duration::from_secs(
                mcp.shutdown_grace_secs
                    .unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECS),
            ),
        }
    }
}

/// Gateway bind address from settings, falling back to [`DEFAULT_GATEWAY_BIND`].
#[must_use]
pub fn gateway_bind(settings: &RuntimeSettings) -> String {
    settings
        .gateway
        .bind
        .as_deref()
        .map(str::trim)
        .filter(|bind| !bind.is_empty())
        .unwrap_or(DEFAULT_GATEWAY_BIND)
        .to_string()
}

fn attempts(value: Option<u32>, default: u32) -> u32 {
    value.unwrap_or(default).clamp(1, MAX_ATTEMPTS)
}

fn secs(value: Option<u64>, default: u64) -> Duration {
    Duration::from_secs(value.unwrap_or(default).max(1))
}
