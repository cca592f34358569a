//! Per-user MCP session manager.
//!
//! Leaves first: [`handle`] seams, [`Session`] lifecycle, [`SessionRegistry`], the
//! [`Reconnector`] retry loop, [`ToolQuery`], the background [`IdleReaper`] and
//! [`HealthProbe`], and the [`McpSessionService`] facade on top.

mod error;
mod handle;
mod maintenance;
mod probe;
mod reaper;
mod reconnect;
mod registry;
mod service;
mod session;
mod tool_query;

pub use error::SessionError;
pub use handle::{
    ConnectionFactory, Credential, StreamableHttpConnectionFactory, ToolHandle, ToolList,
};
pub use maintenance::SessionMaintenance;
pub use probe::{HealthProbe, ProbeReport};
pub use reaper::IdleReaper;
pub use reconnect::{Reconnector, RetryPolicy};
pub use registry::SessionRegistry;
pub use service::{McpSessionService, McpStatusSnapshot, ReconnectReport, SharedSessionService};
pub use session::{Session, SessionLease};
pub use tool_query::ToolQuery;
