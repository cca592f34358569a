//! HTTP gateway integration tests: bearer handling, status shape, failure codes.
//! Backed by the scripted connection factory so no tool server is required.

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use mcpchat_agent::test_support::MockConnectionFactory;
use mcpchat_agent::{McpSessionConfig, McpSessionService, bearer_credential, router};
use serde_json::Value;
use tower::ServiceExt;

fn app(factory: &Arc<MockConnectionFactory>) -> (axum::Router, Arc<McpSessionService>) {
    let config = McpSessionConfig {
        connect_attempts: 1,
        list_tools_attempts: 1,
        ..McpSessionConfig::default()
    };
    let service = Arc::new(McpSessionService::new(config, factory.clone()));
    (router(Arc::clone(&service)), service)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn post(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_reports_session_snapshot() {
    let factory = Arc::new(MockConnectionFactory::new());
    let (app, _) = app(&factory);

    let response = app.oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["mcp"]["enabled"], true);
    assert_eq!(body["mcp"]["activeSessionCount"], 0);
}

#[tokio::test]
async fn connect_requires_bearer_token() {
    let factory = Arc::new(MockConnectionFactory::new());
    let (app, _) = app(&factory);

    let response = app
        .oneshot(post("/api/session/mcp/connect/42", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "error");
    assert_eq!(factory.connect_count(), 0);
}

#[tokio::test]
async fn connect_then_status_shows_customer_connected() {
    let factory = Arc::new(MockConnectionFactory::new());
    let (app, service) = app(&factory);

    let response = app
        .clone()
        .oneshot(post("/api/session/mcp/connect/42", Some("customer-42")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "success");
    assert!(service.is_connected("42"));

    let response = app
        .oneshot(get("/api/session/mcp/status/42", None))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["customerId"], "42");
    assert_eq!(body["userConnected"], true);
    assert_eq!(body["activeSessionCount"], 1);
    assert_eq!(body["perUserConnected"]["42"], true);
}

#[tokio::test]
async fn connect_failure_is_500_with_error_status() {
    let factory = Arc::new(MockConnectionFactory::new());
    factory.set_fail_connect(true);
    let (app, _) = app(&factory);

    let response = app
        .oneshot(post("/api/session/mcp/connect/42", Some("customer-42")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["status"], "error");
    assert!(
        body["message"]
            .as_str()
            .is_some_and(|m| m.contains("unavailable"))
    );
}

#[tokio::test]
async fn tools_lists_names_or_reports_bad_gateway() {
    let factory = Arc::new(MockConnectionFactory::new());
    let (app, _) = app(&factory);

    let response = app
        .clone()
        .oneshot(get("/api/session/mcp/tools/7", Some("customer-7")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["customerId"], "7");
    assert_eq!(body["tools"][0]["name"], "get_balance");

    factory.set_fail_list(true);
    factory.set_fail_connect(true);
    let response = app
        .oneshot(get("/api/session/mcp/tools/7", Some("customer-7")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["status"], "error");
}

#[tokio::test]
async fn disconnect_is_idempotent_and_reconnect_reports_counts() {
    let factory = Arc::new(MockConnectionFactory::new());
    let (app, service) = app(&factory);

    for customer in ["1", "2"] {
        let response = app
            .clone()
            .oneshot(post(
                &format!("/api/session/mcp/connect/{customer}"),
                Some(customer),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(post("/api/session/mcp/reconnect", None))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["reconnected"], 2);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post("/api/session/mcp/disconnect/1", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "success");
    }
    assert!(!service.is_connected("1"));
    assert!(service.is_connected("2"));
}

#[tokio::test]
async fn disabled_service_answers_503() {
    let factory = Arc::new(MockConnectionFactory::new());
    let config = McpSessionConfig {
        enabled: false,
        ..McpSessionConfig::default()
    };
    let app = router(Arc::new(McpSessionService::new(config, factory.clone())));

    let response = app
        .oneshot(post("/api/session/mcp/connect/42", Some("customer-42")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[test]
fn bearer_credential_parses_authorization_header() {
    let mut headers = axum::http::HeaderMap::new();
    assert!(bearer_credential(&headers).is_none());

    headers.insert("authorization", "Basic abc".parse().unwrap());
    assert!(bearer_credential(&headers).is_none());

    headers.insert("authorization", "Bearer   ".parse().unwrap());
    assert!(bearer_credential(&headers).is_none());

    headers.insert("authorization", "bearer tok-1".parse().unwrap());
    let credential = bearer_credential(&headers).expect("credential");
    assert_eq!(credential.expose(), "tok-1");
}
