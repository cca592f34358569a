//! Runtime settings loader for mcpchat-agent.
//!
//! Loads and merges:
//! - System defaults: `<PRJ_ROOT>/packages/conf/settings.yaml`
//! - User overrides:  `<PRJ_CONFIG_HOME>/mcpchat/settings.yaml`
//!
//! Merge precedence is user over system.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::Deserialize;

const DEFAULT_SYSTEM_SETTINGS_RELATIVE_PATH: &str = "packages/conf/settings.yaml";
const DEFAULT_USER_SETTINGS_RELATIVE_PATH: &str = "mcpchat/settings.yaml";
const DEFAULT_CONFIG_HOME_RELATIVE_PATH: &str = ".config";
static CONFIG_HOME_OVERRIDE: OnceLock<PathBuf> = OnceLock::new();

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuntimeSettings {
    #[serde(default)]
    pub mcp: McpSettings,
    #[serde(default)]
    pub gateway: GatewaySettings,
}

/// Tool-server connection and session maintenance knobs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct McpSettings {
    pub enabled: Option<bool>,
    pub server_url: Option<String>,
    pub connect_attempts: Option<u32>,
    pub connect_backoff_ms: Option<u64>,
    pub handshake_timeout_secs: Option<u64>,
    pub tool_timeout_secs: Option<u64>,
    pub list_tools_attempts: Option<u32>,
    pub list_tools_backoff_ms: Option<u64>,
    pub idle_sweep_interval_secs: Option<u64>,
    pub max_idle_secs: Option<u64>,
    pub health_probe_interval_secs: Option<u64>,
    pub health_probe_timeout_ms: Option<u64>,
    pub shutdown_grace_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewaySettings {
    pub bind: Option<String>,
}

impl RuntimeSettings {
    fn merge(self, overlay: Self) -> Self {
        Self {
            mcp: self.mcp.merge(overlay.mcp),
            gateway: self.gateway.merge(overlay.gateway),
        }
    }
}

impl McpSettings {
    fn merge(self, overlay: Self) -> Self {
        Self {
            enabled: overlay.enabled.or(self.enabled),
            server_url: overlay.server_url.or(self.server_url),
            connect_attempts: overlay.connect_attempts.or(self.connect_attempts),
            connect_backoff_ms: overlay.connect_backoff_ms.or(self.connect_backoff_ms),
            handshake_timeout_secs: overlay
                .handshake_timeout_secs
                .or(self.handshake_timeout_secs),
            tool_timeout_secs: overlay.tool_timeout_secs.or(self.tool_timeout_secs),
            list_tools_attempts: overlay.list_tools_attempts.or(self.list_tools_attempts),
            list_tools_backoff_ms: overlay
                .list_tools_backoff_ms
                .or(self.list_tools_backoff_ms),
            idle_sweep_interval_secs: overlay
                .idle_sweep_interval_secs
                .or(self.idle_sweep_interval_secs),
            max_idle_secs: overlay.max_idle_secs.or(self.max_idle_secs),
            health_probe_interval_secs: overlay
                .health_probe_interval_secs
                .or(self.health_probe_interval_secs),
            health_probe_timeout_ms: overlay
                .health_probe_timeout_ms
                .or(self.health_probe_timeout_ms),
            shutdown_grace_secs: overlay.shutdown_grace_secs.or(self.shutdown_grace_secs),
        }
    }
}

impl GatewaySettings {
    fn merge(self, overlay: Self) -> Self {
        Self {
            bind: overlay.bind.or(self.bind),
        }
    }
}

pub fn load_runtime_settings() -> RuntimeSettings {
    let (system_path, user_path) = runtime_settings_paths();
    load_runtime_settings_from_paths(&system_path, &user_path)
}

#[doc(hidden)]
pub fn runtime_settings_paths() -> (PathBuf, PathBuf) {
    let root = project_root();
    let system_path = root.join(DEFAULT_SYSTEM_SETTINGS_RELATIVE_PATH);
    let user_path = resolve_config_home(&root).join(DEFAULT_USER_SETTINGS_RELATIVE_PATH);
    (system_path, user_path)
}

#[doc(hidden)]
pub fn load_runtime_settings_from_paths(system: &Path, user: &Path) -> RuntimeSettings {
    load_one(system).merge(load_one(user))
}

fn load_one(path: &Path) -> RuntimeSettings {
    if !path.exists() {
        return RuntimeSettings::default();
    }
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            tracing::warn!(
                path = %path.display(),
                error = %error,
                "failed to read settings file; ignoring"
            );
            return RuntimeSettings::default();
        }
    };
    if raw.trim().is_empty() {
        return RuntimeSettings::default();
    }
    serde_yaml::from_str::<RuntimeSettings>(&raw).unwrap_or_else(|error| {
        tracing::warn!(
            path = %path.display(),
            error = %error,
            "failed to parse settings yaml; ignoring file"
        );
        RuntimeSettings::default()
    })
}

fn project_root() -> PathBuf {
    std::env::var("PRJ_ROOT")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Set config-home override (used by CLI `--conf`).
///
/// The path can be absolute, or relative to `PRJ_ROOT`/cwd. First value wins.
pub fn set_config_home_override(path: impl Into<PathBuf>) {
    let path = path.into();
    if path.as_os_str().is_empty() {
        return;
    }
    if CONFIG_HOME_OVERRIDE.set(path.clone()).is_err()
        && let Some(current) = CONFIG_HOME_OVERRIDE.get()
        && current != &path
    {
        tracing::warn!(
            current = %current.display(),
            ignored = %path.display(),
            "config home override already set; ignoring subsequent value"
        );
    }
}

fn resolve_config_home(project_root: &Path) -> PathBuf {
    if let Some(path) = CONFIG_HOME_OVERRIDE.get() {
        return absolutize(project_root, path.clone());
    }
    let configured = std::env::var("PRJ_CONFIG_HOME")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_CONFIG_HOME_RELATIVE_PATH.to_string());
    absolutize(project_root, PathBuf::from(configured))
}

fn absolutize(project_root: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        project_root.join(path)
    }
}
