use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mcpchat-agent")]
#[command(about = "Per-customer MCP session manager with an HTTP status/control gateway.")]
pub(crate) struct Cli {
    /// Override config directory (user settings are read from `<DIR>/mcpchat/settings.yaml`).
    #[arg(long, global = true)]
    pub(crate) conf: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the HTTP gateway. Default bind comes from settings (`gateway.bind`).
    Gateway {
        /// Listen address (e.g. 0.0.0.0:8080)
        #[arg(long)]
        bind: Option<String>,

        /// Tool server endpoint (overrides `mcp.server_url`)
        #[arg(long)]
        server_url: Option<String>,
    },
}
