//! MCP client: authenticated handshake, tool listing and tool calls.
//!
//! **Protocol (MCP Streamable HTTP):**
//! 1. Build the transport with the customer's bearer token as the `Authorization` header.
//! 2. `serve_client(init_params, transport)` runs the handshake:
//!    - Client sends `initialize` (JSON-RPC) with protocolVersion, capabilities, clientInfo.
//!    - Server responds with `InitializeResult` and an `Mcp-Session-Id` header.
//!    - Client sends `notifications/initialized`; server answers **202 Accepted**.
//! 3. After the handshake, `list_tools` and `call_tool` run on the live service.
//! 4. `close` cancels the running service; the client is unusable afterwards.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use rmcp::model::{
    CallToolRequestParams, CallToolResult, ClientCapabilities, InitializeRequestParams,
    ProtocolVersion, Tool,
};
use rmcp::service::{RoleClient, RunningService, serve_client};
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use tokio::sync::Mutex;

use crate::config::McpServerTransportConfig;

/// Build init params for the tool server (protocol 2024-11-05).
#[must_use]
pub fn init_params_mcpchat() -> InitializeRequestParams {
    InitializeRequestParams {
        meta: None,
        protocol_version: ProtocolVersion::V_2024_11_05,
        capabilities: ClientCapabilities::default(),
        client_info: rmcp::model::Implementation::from_build_env(),
    }
}

type McpService = RunningService<RoleClient, InitializeRequestParams>;

enum ClientState {
    Ready { service: Arc<McpService> },
    Closed,
}

/// One authenticated MCP connection to one server.
pub struct McpChatClient {
    url: String,
    state: Mutex<ClientState>,
}

impl McpChatClient {
    /// Connect via Streamable HTTP, presenting `bearer_token` on every request.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built, the MCP handshake times out,
    /// or the server rejects initialization (including an unauthorized token).
    pub async fn connect_streamable_http(
        config: &McpServerTransportConfig,
        bearer_token: Option<&str>,
        init_params: InitializeRequestParams,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut http_config = StreamableHttpClientTransportConfig::with_uri(config.url.clone());
        if let Some(token) = bearer_token {
            http_config = http_config.auth_header(token.to_string());
        }
        let mut http_client = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            http_client = http_client.timeout(Duration::from_secs(secs.max(1)));
        }
        let http_client = http_client
            .build()
            .map_err(|e| anyhow!("reqwest client: {e}"))?;
        let transport = StreamableHttpClientTransport::with_client(http_client, http_config);
        let service = match timeout {
            Some(d) => tokio::time::timeout(d, serve_client(init_params, transport))
                .await
                .map_err(|_| anyhow!("MCP handshake timeout"))?
                .map_err(|e| anyhow!("MCP handshake: {e}"))?,
            None => serve_client(init_params, transport)
                .await
                .map_err(|e| anyhow!("MCP handshake: {e}"))?,
        };
        tracing::debug!(
            event = "mcp.client.connected",
            url = %config.url,
            "mcp client handshake completed"
        );
        Ok(Self {
            url: config.url.clone(),
            state: Mutex::new(ClientState::Ready {
                service: Arc::new(service),
            }),
        })
    }

    /// Server URL this client is connected to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether `close` has been called.
    pub async fn is_closed(&self) -> bool {
        matches!(*self.state.lock().await, ClientState::Closed)
    }

    async fn service(&self) -> Result<Arc<McpService>> {
        let guard = self.state.lock().await;
        match &*guard {
            ClientState::Ready { service } => Ok(Arc::clone(service)),
            ClientState::Closed => Err(anyhow!("MCP client closed")),
        }
    }

    /// List every tool the server exposes to this connection, following pagination.
    ///
    /// # Errors
    /// Returns an error if the client is closed or the server fails `tools/list`.
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        let service = self.service().await?;
        service
            .list_all_tools()
            .await
            .map_err(|e| anyhow!("tools/list: {e}"))
    }

    /// Call a tool by name with optional JSON object arguments.
    ///
    /// # Errors
    /// Returns an error if the client is closed or the server fails `tools/call`.
    pub async fn call_tool(
        &self,
        name: String,
        arguments: Option<serde_json::Value>,
    ) -> Result<CallToolResult> {
        let service = self.service().await?;
        let args = arguments.and_then(|v| v.as_object().cloned());
        let params = CallToolRequestParams {
            meta: None,
            name: name.into(),
            arguments: args,
            task: None,
        };
        service
            .call_tool(params)
            .await
            .map_err(|e| anyhow!("tools/call: {e}"))
    }

    /// Cancel the running service. Idempotent.
    ///
    /// # Errors
    /// Currently infallible; the `Result` keeps room for transports whose shutdown can fail.
    pub async fn close(&self) -> Result<()> {
        let previous = {
            let mut guard = self.state.lock().await;
            std::mem::replace(&mut *guard, ClientState::Closed)
        };
        if let ClientState::Ready { service } = previous {
            service.cancellation_token().cancel();
            tracing::debug!(
                event = "mcp.client.closed",
                url = %self.url,
                "mcp client service cancelled"
            );
        }
        Ok(())
    }
}
