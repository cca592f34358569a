//! Collaborator seams: the live connection handle and the factory that opens one.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use mcpchat_mcp_client::{McpChatClient, McpServerTransportConfig, init_params_mcpchat};
use rmcp::model::{CallToolResult, Tool};

/// Tools a user may invoke, as reported by the tool server.
pub type ToolList = Vec<Tool>;

/// Per-user token presented to the tool server.
///
/// `Debug` and `Display` redact the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token, for the transport only.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// A live, authenticated connection to the tool server.
#[async_trait]
pub trait ToolHandle: Send + Sync {
    /// `tools/list`, all pages.
    async fn list_tools(&self) -> Result<ToolList>;

    /// `tools/call`.
    async fn call_tool(
        &self,
        name: &str,
        _arguments: Option<serde_json::Value>,
    ) -> Result<CallToolResult> {
        Err(anyhow!("tools/call not supported by this handle: {name}"))
    }

    /// Release the connection. Called at most once per handle by the session core.
    async fn close(&self) -> Result<()>;
}

/// Opens one connection for one credential.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self, server_url: &str, credential: &Credential)
    -> Result<Arc<dyn ToolHandle>>;
}

#[async_trait]
impl ToolHandle for McpChatClient {
    async fn list_tools(&self) -> Result<ToolList> {
        McpChatClient::list_tools(self).await
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<CallToolResult> {
        McpChatClient::call_tool(self, name.to_string(), arguments).await
    }

    async fn close(&self) -> Result<()> {
        McpChatClient::close(self).await
    }
}

/// Production factory: Streamable HTTP with the credential as bearer token.
///
/// The HTTP client carries no request timeout; per-call deadlines come from the session core.
#[derive(Debug, Clone)]
pub struct StreamableHttpConnectionFactory {
    handshake_timeout: Duration,
}

impl StreamableHttpConnectionFactory {
    #[must_use]
    pub fn new(handshake_timeout: Duration) -> Self {
        Self { handshake_timeout }
    }
}

#[async_trait]
impl ConnectionFactory for StreamableHttpConnectionFactory {
    async fn connect(
        &self,
        server_url: &str,
        credential: &Credential,
    ) -> Result<Arc<dyn ToolHandle>> {
        let transport = McpServerTransportConfig::streamable_http(server_url);
        let client = McpChatClient::connect_streamable_http(
            &transport,
            Some(credential.expose()),
            init_params_mcpchat(),
            Some(self.handshake_timeout),
        )
        .await?;
        Ok(Arc::new(client))
    }
}
