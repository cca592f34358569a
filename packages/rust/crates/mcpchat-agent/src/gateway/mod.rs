//! Gateway namespace: HTTP entrypoint.

mod http;

pub use http::{
    ActionResponse, CustomerStatusResponse, CustomerToolsResponse, GatewayHealthResponse,
    GatewayState, ReconnectAllResponse, ToolSummary, bearer_credential, router, run_http,
};
