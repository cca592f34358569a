//! MCP server config: where the tool server lives.

use serde::{Deserialize, Serialize};

/// Transport for the tool server.
///
/// Only Streamable HTTP is supported: per-customer credentials travel as the
/// `Authorization` header, which a spawned stdio server has no equivalent for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct McpServerTransportConfig {
    /// MCP server URL (e.g. `http://127.0.0.1:3002/mcp`).
    pub url: String,
    /// Request timeout for a single MCP request, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

impl McpServerTransportConfig {
    /// Config for `url`, trimmed and without a trailing slash.
    #[must_use]
    pub fn streamable_http(url: &str) -> Self {
        Self {
            url: url.trim().trim_end_matches('/').to_string(),
            request_timeout_secs: None,
        }
    }
}
