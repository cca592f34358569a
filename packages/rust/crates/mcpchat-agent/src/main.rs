//! mcpchat-agent CLI: HTTP gateway over the per-customer MCP session manager.
//!
//! Settings: `<PRJ_ROOT>/packages/conf/settings.yaml`, overridden by the user file.
//!
//! Logging: set `RUST_LOG=mcpchat_agent=debug` to see per-attempt session logs on stderr.

mod cli;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mcpchat_agent::{
    McpSessionConfig, McpSessionService, RuntimeSettings, gateway_bind, load_runtime_settings,
    run_http, set_config_home_override,
};

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Some(conf_dir) = cli.conf.clone() {
        set_config_home_override(conf_dir);
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mcpchat_agent=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let runtime_settings = load_runtime_settings();

    match cli.command {
        Command::Gateway { bind, server_url } => {
            run_gateway_mode(bind, server_url, runtime_settings).await
        }
    }
}

async fn run_gateway_mode(
    bind: Option<String>,
    server_url: Option<String>,
    mut settings: RuntimeSettings,
) -> anyhow::Result<()> {
    if let Some(url) = server_url {
        settings.mcp.server_url = Some(url);
    }
    let bind = bind.unwrap_or_else(|| gateway_bind(&settings));
    let config = McpSessionConfig::from_settings(&settings);
    let sessions = Arc::new(McpSessionService::from_config(config));
    run_http(sessions, &bind).await
}
