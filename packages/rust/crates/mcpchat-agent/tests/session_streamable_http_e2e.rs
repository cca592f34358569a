//! End-to-end session manager tests against an in-process MCP server (rmcp
//! `StreamableHttpService` on axum) that authorizes each customer by bearer token.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use mcpchat_agent::{Credential, McpSessionConfig, McpSessionService, SessionError};
use rmcp::ServerHandler;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, ErrorData, ListToolsResult,
    PaginatedRequestParams, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use tokio_util::sync::CancellationToken;

const ACCEPTED_TOKENS: [&str; 2] = ["alice-token", "bob-token"];

#[derive(Clone, Default)]
struct MockBankingServer;

impl MockBankingServer {
    fn tool(name: &str, description: &str) -> Tool {
        let input_schema = serde_json::json!({
            "type": "object",
            "properties": { "account_id": { "type": "string" } }
        });
        let map = input_schema.as_object().cloned().unwrap_or_default();
        Tool {
            name: name.to_string().into(),
            title: None,
            description: Some(description.to_string().into()),
            input_schema: Arc::new(map),
            output_schema: None,
            annotations: None,
            execution: None,
            icons: None,
            meta: None,
        }
    }
}

impl ServerHandler for MockBankingServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult::with_all_items(vec![
            Self::tool("get_balance", "Current balance"),
            Self::tool("list_transactions", "Recent transactions"),
        ])))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        let account = request
            .arguments
            .as_ref()
            .and_then(|m| m.get("account_id"))
            .and_then(|v| v.as_str())
            .unwrap_or("default");
        std::future::ready(Ok(CallToolResult::success(vec![Content::text(format!(
            "{}({account}): 100",
            request.name
        ))])))
    }
}

async fn require_bearer(request: Request, next: Next) -> Response {
    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| ACCEPTED_TOKENS.contains(&token));
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    next.run(request).await
}

async fn spawn_server() -> (String, CancellationToken, tokio::task::JoinHandle<()>) {
    let ct = CancellationToken::new();
    let service: StreamableHttpService<MockBankingServer, LocalSessionManager> =
        StreamableHttpService::new(
            || Ok(MockBankingServer),
            Arc::new(LocalSessionManager::default()),
            StreamableHttpServerConfig {
                stateful_mode: true,
                sse_keep_alive: None,
                cancellation_token: ct.child_token(),
                ..Default::default()
            },
        );
    let router = Router::new()
        .nest_service("/mcp", service)
        .layer(middleware::from_fn(require_bearer));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock mcp listener");
    let addr = listener.local_addr().expect("local_addr");
    let handle = tokio::spawn({
        let ct = ct.clone();
        async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(async move { ct.cancelled_owned().await })
                .await;
        }
    });
    (format!("http://{addr}/mcp"), ct, handle)
}

fn e2e_config(server_url: &str) -> McpSessionConfig {
    McpSessionConfig {
        server_url: server_url.to_string(),
        connect_attempts: 2,
        connect_backoff: Duration::from_millis(20),
        handshake_timeout: Duration::from_secs(5),
        tool_timeout: Duration::from_secs(10),
        list_tools_attempts: 2,
        list_tools_backoff: Duration::from_millis(20),
        ..McpSessionConfig::default()
    }
}

#[tokio::test]
async fn each_customer_lists_and_calls_tools_with_own_credential() {
    let (url, ct, handle) = spawn_server().await;
    let service = McpSessionService::from_config(e2e_config(&url));

    let alice = Credential::new("alice-token");
    let bob = Credential::new("bob-token");
    let alice_tools = service
        .list_tools_for_user("alice", &alice)
        .await
        .expect("alice tools");
    let bob_tools = service
        .list_tools_for_user("bob", &bob)
        .await
        .expect("bob tools");
    assert_eq!(alice_tools.len(), 2);
    assert_eq!(bob_tools.len(), 2);
    assert_eq!(service.status_snapshot().active_session_count, 2);

    let result = service
        .call_tool_for_user(
            "alice",
            &alice,
            "get_balance",
            Some(serde_json::json!({ "account_id": "acc-7" })),
        )
        .await
        .expect("call_tool");
    assert!(!result.content.is_empty());

    let definitions = service
        .tools_for_llm("bob", &bob)
        .await
        .expect("llm tool definitions");
    assert_eq!(definitions[1]["name"], "list_transactions");

    service.shutdown().await;
    assert!(!service.is_connected("alice"));
    ct.cancel();
    let _ = handle.await;
}

#[tokio::test]
async fn rejected_credential_surfaces_typed_failure() {
    let (url, ct, handle) = spawn_server().await;
    let service = McpSessionService::from_config(e2e_config(&url));
    let mallory = Credential::new("stolen-token");

    let error = service
        .get_client_for_user("mallory", &mallory)
        .await
        .expect_err("unauthorized handshake");
    assert!(matches!(error, SessionError::Unavailable { attempts: 2, .. }));

    let listing = service.list_tools_for_user("mallory", &mallory).await;
    assert!(matches!(listing, Err(SessionError::ListingFailed { .. })));
    assert!(service.tools_for_llm("mallory", &mallory).await.is_none());
    assert!(!service.is_connected("mallory"));

    ct.cancel();
    let _ = handle.await;
}

#[tokio::test]
async fn close_session_then_reconnect_on_next_use() {
    let (url, ct, handle) = spawn_server().await;
    let service = McpSessionService::from_config(e2e_config(&url));
    let alice = Credential::new("alice-token");

    service
        .list_tools_for_user("alice", &alice)
        .await
        .expect("first listing");
    assert!(service.is_connected("alice"));
    assert!(service.close_session("alice").await);
    assert!(!service.is_connected("alice"));

    let tools = service
        .list_tools_for_user("alice", &alice)
        .await
        .expect("listing after close");
    assert_eq!(tools.len(), 2);
    assert!(service.is_connected("alice"));

    let report = service.refresh_tools().await;
    assert_eq!(report.failed, 0);

    service.shutdown().await;
    ct.cancel();
    let _ = handle.await;
}
