//! Per-user MCP session manager for the chat backend.
//!
//! - **Sessions**: one authenticated tool-server connection per customer, connected on
//!   demand, retried with bounded backoff, probed for health and evicted when idle.
//! - **Gateway**: HTTP status and control endpoints over the session service.

#![allow(missing_docs)]

mod config;
mod gateway;
mod sessions;
#[doc(hidden)]
pub mod test_support;

pub use config::{
    DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_BACKOFF_MS, DEFAULT_GATEWAY_BIND,
    DEFAULT_HANDSHAKE_TIMEOUT_SECS, DEFAULT_HEALTH_PROBE_INTERVAL_SECS,
    DEFAULT_HEALTH_PROBE_TIMEOUT_MS, DEFAULT_IDLE_SWEEP_INTERVAL_SECS,
    DEFAULT_LIST_TOOLS_ATTEMPTS, DEFAULT_LIST_TOOLS_BACKOFF_MS, DEFAULT_MAX_IDLE_SECS,
    DEFAULT_SERVER_URL, DEFAULT_SHUTDOWN_GRACE_SECS, DEFAULT_TOOL_TIMEOUT_SECS, GatewaySettings,
    McpSessionConfig, McpSettings, RuntimeSettings, gateway_bind, load_runtime_settings,
    load_runtime_settings_from_paths, runtime_settings_paths, set_config_home_override,
};
pub use gateway::{
    ActionResponse, CustomerStatusResponse, CustomerToolsResponse, GatewayHealthResponse,
    GatewayState, ReconnectAllResponse, ToolSummary, bearer_credential, router, run_http,
};
pub use sessions::{
    ConnectionFactory, Credential, HealthProbe, IdleReaper, McpSessionService, McpStatusSnapshot,
    ProbeReport, ReconnectReport, Reconnector, RetryPolicy, Session, SessionError, SessionLease,
    SessionMaintenance, SessionRegistry, SharedSessionService, StreamableHttpConnectionFactory,
    ToolHandle, ToolList, ToolQuery,
};
