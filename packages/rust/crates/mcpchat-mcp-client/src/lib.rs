//! MCP client for mcpchat.
//!
//! Follows the [MCP protocol](https://spec.modelcontextprotocol.io/) over Streamable HTTP:
//! `serve_client(init_params, transport)` runs the handshake, then `list_tools` / `call_tool`
//! run on the live service. Every connection carries one customer's bearer token so the
//! tool server authorizes tool calls as that customer.

mod client;
mod config;

pub use client::{McpChatClient, init_params_mcpchat};
pub use config::McpServerTransportConfig;
