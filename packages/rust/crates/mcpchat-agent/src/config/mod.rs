//! Config namespace: layered settings and the resolved session config.

mod session;
mod settings;

pub use session::{
    DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_BACKOFF_MS, DEFAULT_GATEWAY_BIND,
    DEFAULT_HANDSHAKE_TIMEOUT_SECS, DEFAULT_HEALTH_PROBE_INTERVAL_SECS,
    DEFAULT_HEALTH_PROBE_TIMEOUT_MS, DEFAULT_IDLE_SWEEP_INTERVAL_SECS,
    DEFAULT_LIST_TOOLS_ATTEMPTS, DEFAULT_LIST_TOOLS_BACKOFF_MS, DEFAULT_MAX_IDLE_SECS,
    DEFAULT_SERVER_URL, DEFAULT_SHUTDOWN_GRACE_SECS, DEFAULT_TOOL_TIMEOUT_SECS,
    McpSessionConfig, gateway_bind,
};
pub use settings::{
    GatewaySettings, McpSettings, RuntimeSettings, load_runtime_settings,
    load_runtime_settings_from_paths, runtime_settings_paths, set_config_home_override,
};
