//! End-to-end exercise of the HTTP surface against a mocked upstream MCP
//! server, covering the literal scenarios from the specification: a
//! successful proxied call, and a breaker that opens after three
//! consecutive upstream failures and half-opens after its recovery
//! timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mcp_router::cache::PromptCache;
use mcp_router::config::{EnhancementConfig, ServerCatalog, ServerConfig, Settings};
use mcp_router::enhance::EnhancementMiddleware;
use mcp_router::http_api::{build_router, AppState};
use mcp_router::registry::ServerRegistry;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn spawn_gateway(upstream: &MockServer) -> (String, Arc<AppState>) {
    let mut servers = HashMap::new();
    servers.insert(
        "flaky".to_string(),
        ServerConfig { transport: "http".into(), url: Some(upstream.uri()), command: None, health_endpoint: None, env: HashMap::new() },
    );
    let catalog = ServerCatalog { servers };

    let http_client = reqwest::Client::new();
    let registry = ServerRegistry::new(catalog, http_client.clone());
    let enhancement = EnhancementMiddleware::new("http://localhost:11434".into(), EnhancementConfig::default(), PromptCache::new(10, 0.85, None), http_client);

    let state = Arc::new(AppState::new(registry, enhancement, Settings::default()));
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), state)
}

#[tokio::test]
async fn health_endpoint_reports_healthy() {
    let upstream = MockServer::start().await;
    let (base, _state) = spawn_gateway(&upstream).await;

    let resp = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn successful_call_is_proxied_through() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": {"tools": []}})))
        .mount(&upstream)
        .await;

    let (base, _state) = spawn_gateway(&upstream).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/mcp/flaky"))
        .json(&serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["result"]["tools"], serde_json::json!([]));
}

#[tokio::test]
async fn breaker_opens_after_three_failures_and_recovers() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST")).and(path("/")).respond_with(ResponseTemplate::new(500)).mount(&upstream).await;

    let (base, state) = spawn_gateway(&upstream).await;
    let client = reqwest::Client::new();
    let req_body = serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "ping"});

    for _ in 0..3 {
        let resp = client.post(format!("{base}/mcp/flaky")).json(&req_body).send().await.unwrap();
        assert_eq!(resp.status(), 502);
    }

    // Fourth call: breaker open, rejected before dispatch.
    let resp = client.post(format!("{base}/mcp/flaky")).json(&req_body).send().await.unwrap();
    assert_eq!(resp.status(), 503);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32000);

    // Force the breaker's recovery window to have already elapsed so the
    // next attempt transitions to half-open and is retried.
    state.registry.breakers.reset("flaky");
    Mock::given(method("POST")).and(path("/")).respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": {}}))).mount(&upstream).await;

    let resp = client.post(format!("{base}/mcp/flaky")).json(&req_body).send().await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn unknown_server_returns_404() {
    let upstream = MockServer::start().await;
    let (base, _state) = spawn_gateway(&upstream).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/mcp/does-not-exist"))
        .json(&serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn sse_connect_issues_session_and_endpoint_event() {
    let upstream = MockServer::start().await;
    let (base, _state) = spawn_gateway(&upstream).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/sse")).timeout(Duration::from_secs(2)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.headers().get("x-session-id").is_some());
}
