//! Facade the chat orchestration and status layers call into.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rmcp::model::CallToolResult;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use super::error::SessionError;
use super::handle::{
    ConnectionFactory, Credential, StreamableHttpConnectionFactory, ToolHandle, ToolList,
};
use super::maintenance::SessionMaintenance;
use super::probe::{HealthProbe, ProbeReport};
use super::reaper::IdleReaper;
use super::reconnect::{Reconnector, RetryPolicy};
use super::registry::SessionRegistry;
use super::session::{Session, SessionLease};
use super::tool_query::ToolQuery;
use crate::config::McpSessionConfig;

/// Closed sessions are re-resolved from the registry at most this many times per call.
const RESOLVE_ROUNDS: u32 = 3;

/// Point-in-time status for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct McpStatusSnapshot {
    pub enabled: bool,
    pub active_session_count: usize,
    pub per_user_connected: BTreeMap<String, bool>,
}

/// Outcome of [`McpSessionService::reconnect_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconnectReport {
    pub reconnected: usize,
    pub failed: usize,
}

/// Per-user tool-server sessions: lookup, connect on demand, retrying listing, and the
/// background reaper and probe.
pub struct McpSessionService {
    config: McpSessionConfig,
    registry: Arc<SessionRegistry>,
    reconnector: Arc<Reconnector>,
    tool_query: ToolQuery,
    reaper: Arc<IdleReaper>,
    probe: Arc<HealthProbe>,
    maintenance: Mutex<Option<SessionMaintenance>>,
    shutting_down: AtomicBool,
}

impl McpSessionService {
    #[must_use]
    pub fn new(config: McpSessionConfig, factory: Arc<dyn ConnectionFactory>) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let reconnector = Arc::new(Reconnector::new(
            factory,
            config.server_url.clone(),
            RetryPolicy::new(config.connect_attempts, config.connect_backoff),
            config.handshake_timeout,
        ));
        let tool_query = ToolQuery::new(
            Arc::clone(&reconnector),
            RetryPolicy::new(config.list_tools_attempts, config.list_tools_backoff),
            config.tool_timeout,
        );
        let reaper = Arc::new(IdleReaper::new(Arc::clone(&registry), config.max_idle));
        let probe = Arc::new(HealthProbe::new(
            Arc::clone(&registry),
            config.health_probe_timeout,
        ));
        Self {
            config,
            registry,
            reconnector,
            tool_query,
            reaper,
            probe,
            maintenance: Mutex::new(None),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Service backed by the Streamable HTTP client.
    #[must_use]
    pub fn from_config(config: McpSessionConfig) -> Self {
        let factory = Arc::new(StreamableHttpConnectionFactory::new(config.handshake_timeout));
        Self::new(config, factory)
    }

    #[must_use]
    pub fn config(&self) -> &McpSessionConfig {
        &self.config
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Start the idle reaper and health probe. No-op when disabled or already running.
    pub async fn start_maintenance(&self) {
        if !self.config.enabled {
            tracing::info!(
                event = "mcp.session.maintenance.skipped",
                "mcp tool access disabled; session maintenance not started"
            );
            return;
        }
        let mut maintenance = self.maintenance.lock().await;
        if maintenance.is_some() {
            return;
        }
        *maintenance = Some(SessionMaintenance::spawn(
            Arc::clone(&self.reaper),
            self.config.idle_sweep_interval,
            Arc::clone(&self.probe),
            self.config.health_probe_interval,
        ));
    }

    /// Live handle for `user_id`, connecting first if needed.
    ///
    /// The returned lease keeps the session from being closed or reconnected underneath the
    /// caller; drop it as soon as the calls it covers are done.
    ///
    /// # Errors
    /// `Disabled` when tool access is switched off, `Unavailable` once connecting exhausted
    /// its attempts.
    pub async fn get_client_for_user(
        &self,
        user_id: &str,
        credential: &Credential,
    ) -> Result<SessionLease, SessionError> {
        self.resolve(user_id, credential)
            .await
            .map(|(_, lease)| lease)
    }

    /// Tools visible to `user_id`, retrying through reconnects.
    ///
    /// # Errors
    /// `Disabled` when tool access is switched off, `ListingFailed` once every attempt
    /// failed. An empty `Ok` means the server really exposes no tools.
    pub async fn list_tools_for_user(
        &self,
        user_id: &str,
        credential: &Credential,
    ) -> Result<ToolList, SessionError> {
        self.ensure_accepting()?;
        for _ in 0..RESOLVE_ROUNDS {
            let session = self.admit(user_id, credential).await?;
            match self.tool_query.list_tools(&session).await {
                Err(SessionError::Closed { .. }) => continue,
                outcome => return outcome,
            }
        }
        Err(SessionError::ListingFailed {
            user_id: user_id.to_string(),
            attempts: self.config.list_tools_attempts,
            last_error: "session closed while listing tools".to_string(),
        })
    }

    /// Run one tool on the user's live handle.
    ///
    /// Tool calls are not retried. A transport failure marks the session disconnected so
    /// the next use reconnects.
    ///
    /// # Errors
    /// Anything [`McpSessionService::get_client_for_user`] returns, or `ToolCall` when the
    /// call fails or exceeds the tool timeout.
    pub async fn call_tool_for_user(
        &self,
        user_id: &str,
        credential: &Credential,
        tool: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<CallToolResult, SessionError> {
        let (session, lease) = self.resolve(user_id, credential).await?;
        let generation = lease.generation();
        let outcome =
            tokio::time::timeout(self.config.tool_timeout, lease.call_tool(tool, arguments)).await;
        drop(lease);
        let error = match outcome {
            Ok(Ok(result)) => return Ok(result),
            Ok(Err(error)) => format!("{error:#}"),
            Err(_) => format!(
                "tools/call timed out after {}s",
                self.config.tool_timeout.as_secs()
            ),
        };
        session.mark_disconnected(generation);
        tracing::warn!(
            event = "mcp.session.tool_call.failed",
            user_id,
            tool,
            error = %error,
            "mcp tool call failed"
        );
        Err(SessionError::ToolCall {
            user_id: user_id.to_string(),
            tool: tool.to_string(),
            error,
        })
    }

    /// Tools as function-calling definitions (`name`, `description`, `parameters`).
    ///
    /// Returns `None` when no tools are available for any reason, so the chat turn goes on
    /// without tools instead of failing.
    pub async fn tools_for_llm(
        &self,
        user_id: &str,
        credential: &Credential,
    ) -> Option<Vec<serde_json::Value>> {
        let tools = match self.list_tools_for_user(user_id, credential).await {
            Ok(tools) => tools,
            Err(SessionError::Disabled | SessionError::ShuttingDown) => return None,
            Err(error) => {
                tracing::warn!(
                    event = "mcp.session.tools_for_llm.unavailable",
                    user_id,
                    error = %error,
                    "proceeding without mcp tools"
                );
                return None;
            }
        };
        let definitions: Vec<serde_json::Value> = tools
            .iter()
            .map(|tool| {
                let mut obj = serde_json::Map::new();
                obj.insert(
                    "name".to_string(),
                    serde_json::Value::String(tool.name.to_string()),
                );
                if let Some(ref description) = tool.description {
                    obj.insert(
                        "description".to_string(),
                        serde_json::Value::String(description.to_string()),
                    );
                }
                let schema = serde_json::Value::Object(tool.input_schema.as_ref().clone());
                obj.insert("parameters".to_string(), schema);
                serde_json::Value::Object(obj)
            })
            .collect();
        if definitions.is_empty() {
            return None;
        }
        Some(definitions)
    }

    /// Whether `user_id` has a live session. Never creates one.
    #[must_use]
    pub fn is_connected(&self, user_id: &str) -> bool {
        self.config.enabled
            && self
                .registry
                .get(user_id)
                .is_some_and(|session| session.is_connected())
    }

    /// Remove and close the user's session. A user without a session is a no-op.
    pub async fn close_session(&self, user_id: &str) -> bool {
        let closed = self.registry.remove(user_id).await;
        if closed {
            tracing::info!(
                event = "mcp.session.logout",
                user_id,
                "mcp session closed on request"
            );
        }
        closed
    }

    #[must_use]
    pub fn status_snapshot(&self) -> McpStatusSnapshot {
        let per_user_connected = self.registry.snapshot();
        McpStatusSnapshot {
            enabled: self.config.enabled,
            active_session_count: per_user_connected.len(),
            per_user_connected,
        }
    }

    /// Force a fresh connection for every registered session, concurrently.
    pub async fn reconnect_all(&self) -> ReconnectReport {
        let mut reconnects = JoinSet::new();
        for session in self.registry.sessions() {
            let reconnector = Arc::clone(&self.reconnector);
            reconnects.spawn(async move {
                session.invalidate().await;
                reconnector.ensure_connected(&session).await
            });
        }
        let mut report = ReconnectReport::default();
        while let Some(joined) = reconnects.join_next().await {
            match joined {
                Ok(Ok(())) => report.reconnected += 1,
                Ok(Err(SessionError::Closed { .. })) => {}
                Ok(Err(error)) => {
                    report.failed += 1;
                    tracing::warn!(
                        event = "mcp.session.reconnect_all.failed",
                        error = %error,
                        "manual reconnect failed"
                    );
                }
                Err(error) => {
                    report.failed += 1;
                    tracing::warn!(
                        event = "mcp.session.reconnect_all.task_failed",
                        error = %error,
                        "manual reconnect task failed"
                    );
                }
            }
        }
        tracing::info!(
            event = "mcp.session.reconnect_all.completed",
            reconnected = report.reconnected,
            failed = report.failed,
            "manual reconnect of all mcp sessions completed"
        );
        report
    }

    /// One health-probe pass on demand.
    pub async fn refresh_tools(&self) -> ProbeReport {
        self.probe.sweep().await
    }

    /// Stop background workers, then close every session. Sessions still closing after the
    /// grace period are abandoned. Calls arriving afterwards fail with `ShuttingDown`.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        let grace = self.config.shutdown_grace;
        if let Some(maintenance) = self.maintenance.lock().await.take() {
            maintenance.shutdown(grace).await;
        }
        let mut closes = JoinSet::new();
        for session in self.registry.drain() {
            closes.spawn(close_on_shutdown(session));
        }
        let pending = closes.len();
        let drained = tokio::time::timeout(grace, async {
            while closes.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                event = "mcp.session.shutdown.aborted",
                remaining = closes.len(),
                grace_ms = grace.as_millis(),
                "mcp sessions still closing after grace; aborting"
            );
            closes.abort_all();
        }
        tracing::info!(
            event = "mcp.session.shutdown.completed",
            closed = pending,
            "mcp session manager stopped"
        );
    }

    async fn resolve(
        &self,
        user_id: &str,
        credential: &Credential,
    ) -> Result<(Arc<Session>, SessionLease), SessionError> {
        self.ensure_accepting()?;
        for _ in 0..RESOLVE_ROUNDS {
            let session = self.admit(user_id, credential).await?;
            match self.reconnector.ensure_connected(&session).await {
                Ok(()) => {}
                Err(SessionError::Closed { .. }) => continue,
                Err(error) => return Err(error),
            }
            if let Some(lease) = session.lease().await {
                session.touch();
                return Ok((session, lease));
            }
        }
        Err(SessionError::Unavailable {
            user_id: user_id.to_string(),
            attempts: self.reconnector.policy().max_attempts,
            last_error: "session closed while connecting".to_string(),
        })
    }

    fn ensure_accepting(&self) -> Result<(), SessionError> {
        if !self.config.enabled {
            return Err(SessionError::Disabled);
        }
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(SessionError::ShuttingDown);
        }
        Ok(())
    }

    /// Registry lookup that backs out if shutdown drained the registry in the meantime.
    async fn admit(
        &self,
        user_id: &str,
        credential: &Credential,
    ) -> Result<Arc<Session>, SessionError> {
        let session = self.registry.get_or_create(user_id, credential);
        if !self.shutting_down.load(Ordering::Acquire) {
            return Ok(session);
        }
        if let Some(late) = self.registry.remove_if_current(user_id, &session) {
            late.close().await;
        }
        Err(SessionError::ShuttingDown)
    }
}

async fn close_on_shutdown(session: Arc<Session>) {
    session.close().await;
}

impl std::fmt::Debug for McpSessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpSessionService")
            .field("enabled", &self.config.enabled)
            .field("server_url", &self.config.server_url)
            .field("sessions", &self.registry.len())
            .finish_non_exhaustive()
    }
}

/// Shared handle for the gateway and the binary.
pub type SharedSessionService = Arc<McpSessionService>;
