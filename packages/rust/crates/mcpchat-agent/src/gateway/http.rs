//! HTTP gateway: session status and control for the chat backend.
//!
//! The bearer token on connect and tools requests is forwarded as the customer's tool-server
//! credential. 401 without one, 502 when tools cannot be listed, never an empty list on failure.

use anyhow::Result;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    routing::{get, post},
};
use serde::Serialize;
use tokio::net::TcpListener;

use crate::sessions::{
    Credential, McpStatusSnapshot, ReconnectReport, SessionError, SharedSessionService,
};

/// Shared state for the HTTP server.
#[derive(Clone)]
pub struct GatewayState {
    pub sessions: SharedSessionService,
}

/// Response body for the health endpoint.
#[derive(Debug, Serialize)]
pub struct GatewayHealthResponse {
    pub status: &'static str,
    pub mcp: McpStatusSnapshot,
}

/// Status for one customer plus the global snapshot.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerStatusResponse {
    pub customer_id: String,
    pub user_connected: bool,
    #[serde(flatten)]
    pub mcp: McpStatusSnapshot,
}

/// `{status, message}` body shared by control endpoints and error replies.
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub status: &'static str,
    pub message: String,
}

impl ActionResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ToolSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerToolsResponse {
    pub customer_id: String,
    pub tools: Vec<ToolSummary>,
}

#[derive(Debug, Serialize)]
pub struct ReconnectAllResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub report: ReconnectReport,
}

type ApiError = (StatusCode, Json<ActionResponse>);

/// Token from `Authorization: Bearer <token>`; `None` when absent, malformed or empty.
pub fn bearer_credential(headers: &HeaderMap) -> Option<Credential> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| Credential::new(token))
}

fn require_bearer(headers: &HeaderMap) -> Result<Credential, ApiError> {
    bearer_credential(headers).ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(ActionResponse::error("missing bearer token")),
        )
    })
}

fn session_error_status(error: &SessionError, fallback: StatusCode) -> StatusCode {
    match error {
        SessionError::Disabled | SessionError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        _ => fallback,
    }
}

async fn handle_health(State(state): State<GatewayState>) -> Json<GatewayHealthResponse> {
    Json(GatewayHealthResponse {
        status: "healthy",
        mcp: state.sessions.status_snapshot(),
    })
}

async fn handle_status(
    State(state): State<GatewayState>,
    Path(customer_id): Path<String>,
) -> Json<CustomerStatusResponse> {
    Json(CustomerStatusResponse {
        user_connected: state.sessions.is_connected(&customer_id),
        customer_id,
        mcp: state.sessions.status_snapshot(),
    })
}

async fn handle_connect(
    State(state): State<GatewayState>,
    Path(customer_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ActionResponse>, ApiError> {
    let credential = require_bearer(&headers)?;
    match state
        .sessions
        .get_client_for_user(&customer_id, &credential)
        .await
    {
        Ok(lease) => {
            drop(lease);
            Ok(Json(ActionResponse::success(format!(
                "MCP session connected for customer {customer_id}"
            ))))
        }
        Err(error) => Err((
            session_error_status(&error, StatusCode::INTERNAL_SERVER_ERROR),
            Json(ActionResponse::error(error.to_string())),
        )),
    }
}

async fn handle_disconnect(
    State(state): State<GatewayState>,
    Path(customer_id): Path<String>,
) -> Json<ActionResponse> {
    let closed = state.sessions.close_session(&customer_id).await;
    let message = if closed {
        format!("MCP session closed for customer {customer_id}")
    } else {
        format!("no MCP session for customer {customer_id}")
    };
    Json(ActionResponse::success(message))
}

async fn handle_tools(
    State(state): State<GatewayState>,
    Path(customer_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<CustomerToolsResponse>, ApiError> {
    let credential = require_bearer(&headers)?;
    let tools = state
        .sessions
        .list_tools_for_user(&customer_id, &credential)
        .await
        .map_err(|error| {
            (
                session_error_status(&error, StatusCode::BAD_GATEWAY),
                Json(ActionResponse::error(error.to_string())),
            )
        })?;
    let tools = tools
        .into_iter()
        .map(|tool| ToolSummary {
            name: tool.name.to_string(),
            description: tool.description.map(|d| d.to_string()),
        })
        .collect();
    Ok(Json(CustomerToolsResponse { customer_id, tools }))
}

async fn handle_reconnect_all(State(state): State<GatewayState>) -> Json<ReconnectAllResponse> {
    let report = state.sessions.reconnect_all().await;
    Json(ReconnectAllResponse {
        status: if report.failed == 0 { "success" } else { "partial" },
        report,
    })
}

/// Build the gateway router.
pub fn router(sessions: SharedSessionService) -> Router {
    let state = GatewayState { sessions };
    Router::new()
        .route("/health", get(handle_health))
        .route("/api/session/mcp/status/{customer_id}", get(handle_status))
        .route("/api/session/mcp/connect/{customer_id}", post(handle_connect))
        .route(
            "/api/session/mcp/disconnect/{customer_id}",
            post(handle_disconnect),
        )
        .route("/api/session/mcp/tools/{customer_id}", get(handle_tools))
        .route("/api/session/mcp/reconnect", post(handle_reconnect_all))
        .with_state(state)
}

/// Run the HTTP server on `bind_addr` (e.g. `0.0.0.0:8080`).
///
/// Starts session maintenance first. On Ctrl+C or SIGTERM in-flight requests complete, then
/// every session is closed.
pub async fn run_http(sessions: SharedSessionService, bind_addr: &str) -> Result<()> {
    sessions.start_maintenance().await;
    let app = router(sessions.clone());
    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!(
        bind = bind_addr,
        server_url = %sessions.config().server_url,
        enabled = sessions.enabled(),
        "gateway listening (Ctrl+C/SIGTERM to stop)"
    );
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    sessions.shutdown().await;
    served?;
    tracing::info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(error) => {
                tracing::warn!(error = %error, "failed to listen for SIGTERM; Ctrl+C only");
                wait_for_ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %error, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
