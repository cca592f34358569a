//! Tests for `McpChatClient` failure paths that need no running server.

use std::time::Duration;

use mcpchat_mcp_client::{McpChatClient, McpServerTransportConfig, init_params_mcpchat};

async fn reserve_unused_addr() -> std::net::SocketAddr {
    let probe = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("reserve local addr");
    let addr = probe.local_addr().expect("read reserved local addr");
    drop(probe);
    addr
}

#[test]
fn init_params_use_2024_11_05_protocol() {
    let params = init_params_mcpchat();
    assert_eq!(
        params.protocol_version,
        rmcp::model::ProtocolVersion::V_2024_11_05
    );
}

#[tokio::test]
async fn connect_to_closed_port_fails() {
    let addr = reserve_unused_addr().await;
    let config = McpServerTransportConfig::streamable_http(&format!("http://{addr}/mcp"));
    let result = McpChatClient::connect_streamable_http(
        &config,
        Some("token"),
        init_params_mcpchat(),
        Some(Duration::from_secs(2)),
    )
    .await;
    let Err(error) = result else {
        panic!("connect should fail when nothing listens on {addr}");
    };
    let msg = format!("{error:#}");
    assert!(
        msg.contains("MCP handshake"),
        "expected handshake failure, got: {msg}"
    );
}
