//! HTTP/SSE surface: axum routes, shared [`AppState`], and the JSON-RPC
//! request-log ring buffer that backs `GET /stats`.
//!
//! Routes and their wire shapes are carried over from
//! `original_source/router/main.py` and `router/sse.py`. The `AppState`
//! pattern (one struct injected via `axum::extract::State` rather than
//! module-level globals) replaces the original's global `http_client` and
//! `sessions` dict — a deliberate REDESIGN recorded in DESIGN.md.

use std::collections::VecDeque;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Settings;
use crate::enhance::EnhancementMiddleware;
use crate::error::GatewayError;
use crate::registry::ServerRegistry;
use crate::rpc::{error_code, JsonRpcRequest, JsonRpcResponse};
use crate::sse::SseSessionManager;

const REQUEST_LOG_CAPACITY: usize = 100;

#[derive(Debug, Clone, serde::Serialize)]
struct RequestLogEntry {
    path: String,
    server: Option<String>,
    status: &'static str,
    at: chrono::DateTime<chrono::Utc>,
}

/// Bounded, append-only ring buffer of recent `/mcp/*` and
/// `/ollama/enhance` calls, surfaced read-only via `GET /stats`.
#[derive(Default)]
struct RequestLog {
    entries: Mutex<VecDeque<RequestLogEntry>>,
}

impl RequestLog {
    async fn push(&self, entry: RequestLogEntry) {
        let mut entries = self.entries.lock().await;
        if entries.len() >= REQUEST_LOG_CAPACITY {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    async fn recent(&self, n: usize) -> Vec<RequestLogEntry> {
        let entries = self.entries.lock().await;
        entries.iter().rev().take(n).cloned().collect()
    }
}

pub struct AppState {
    pub registry: ServerRegistry,
    pub enhancement: EnhancementMiddleware,
    pub sessions: SseSessionManager,
    pub settings: Settings,
    request_log: RequestLog,
}

impl AppState {
    pub fn new(registry: ServerRegistry, enhancement: EnhancementMiddleware, settings: Settings) -> Self {
        Self { registry, enhancement, sessions: SseSessionManager::new(), settings, request_log: RequestLog::default() }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", get(root))
        .route("/ollama/enhance", post(enhance_prompt))
        .route("/mcp/:server", get(proxy_mcp_get).post(proxy_mcp_post))
        .route("/sse", get(sse_connect))
        .route("/message", post(sse_message))
        .route("/sse/:session_id", delete(sse_disconnect))
        .route("/sse/sessions", get(list_sessions))
        .route("/actions/clear-cache", post(clear_cache))
        .route("/actions/reset-breakers", post(reset_breakers))
        .route("/stats", get(stats))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let services = state.registry.all_health().await;
    let overall = if services.iter().all(|s| s["status"] == "healthy") { "healthy" } else { "degraded" };
    Json(serde_json::json!({
        "status": overall,
        "services": services,
        "circuit_breakers": state.registry.breakers.all_status(),
    }))
}

async fn root(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "MCP Router",
        "version": env!("CARGO_PKG_VERSION"),
        "ollama": {
            "url": state.settings.ollama_url(),
            "model": state.settings.ollama_model,
        },
        "endpoints": ["/health", "/ollama/enhance", "/mcp/{server}", "/sse", "/message", "/stats"],
    }))
}

#[derive(Debug, Deserialize)]
struct EnhanceRequest {
    prompt: String,
    #[serde(default)]
    client: Option<String>,
}

async fn enhance_prompt(State(state): State<Arc<AppState>>, Json(body): Json<EnhanceRequest>) -> impl IntoResponse {
    if body.prompt.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({"detail": "prompt is required"}))).into_response();
    }

    let result = state.enhancement.enhance(&body.prompt, body.client.as_deref()).await;
    state
        .request_log
        .push(RequestLogEntry {
            path: "/ollama/enhance".to_string(),
            server: None,
            status: if result.error.is_some() { "error" } else { "ok" },
            at: chrono::Utc::now(),
        })
        .await;

    (StatusCode::OK, Json(result)).into_response()
}

async fn proxy_mcp_get(state: State<Arc<AppState>>, server: Path<String>) -> impl IntoResponse {
    dispatch_mcp(state, server, JsonRpcRequest::new(None, "ping", None)).await
}

async fn proxy_mcp_post(state: State<Arc<AppState>>, server: Path<String>, Json(body): Json<JsonRpcRequest>) -> impl IntoResponse {
    dispatch_mcp(state, server, body).await
}

async fn dispatch_mcp(State(state): State<Arc<AppState>>, Path(server): Path<String>, request: JsonRpcRequest) -> impl IntoResponse {
    metrics::counter!("mcp_router_requests_total", "server" => server.clone()).increment(1);
    let response = state.registry.call(&server, request).await;
    let status = if response.error.is_some() { "error" } else { "ok" };
    state.request_log.push(RequestLogEntry { path: format!("/mcp/{server}"), server: Some(server.clone()), status, at: chrono::Utc::now() }).await;

    let status_code = match &response.error {
        Some(e) if e.code == error_code::INVALID_REQUEST => GatewayError::UnknownServer(server.clone()).status_code(),
        Some(e) if e.code == error_code::SERVER_ERROR => GatewayError::BreakerOpen(server.clone()).status_code(),
        Some(e) => GatewayError::HttpTransport { server: server.clone(), message: e.message.clone() }.status_code(),
        None => 200,
    };
    let http_status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (http_status, Json(response))
}

async fn sse_connect(State(state): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
    let (session, mut rx) = state.sessions.connect().await;
    let session_id = session.id.clone();

    let base_url = headers
        .get("host")
        .and_then(|v| v.to_str().ok())
        .map(|h| format!("http://{h}"))
        .unwrap_or_else(|| "http://localhost".to_string());
    let message_url = format!("{base_url}/message?session_id={session_id}");
    session.send_event("endpoint", serde_json::json!(message_url)).await;

    let stream = crate::sse::into_frame_stream(rx).map(|frame| {
        let event = if let Some(data) = frame.strip_prefix("event: message\ndata: ") {
            Event::default().event("message").data(data.trim_end_matches("\n\n"))
        } else if let Some(data) = frame.strip_prefix("event: endpoint\ndata: ") {
            Event::default().event("endpoint").data(data.trim_end_matches("\n\n"))
        } else {
            Event::default().comment("keepalive")
        };
        Ok::<_, std::convert::Infallible>(event)
    });

    let mut response_headers = HeaderMap::new();
    response_headers.insert("X-Session-Id", session_id.parse().unwrap());
    (response_headers, Sse::new(stream)).into_response()
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    session_id: String,
}

async fn sse_message(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessageQuery>,
    headers: HeaderMap,
    body: bytes::Bytes,
) -> impl IntoResponse {
    let Some(session) = state.sessions.get(&query.session_id).await else {
        return (StatusCode::NOT_FOUND, Json(serde_json::json!({"detail": "Session not found or expired"}))).into_response();
    };
    if !session.is_active() {
        return (StatusCode::NOT_FOUND, Json(serde_json::json!({"detail": "Session not found or expired"}))).into_response();
    }

    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            let error_response = JsonRpcResponse::failure(None, error_code::PARSE_ERROR, format!("Parse error: {e}"), None);
            session.send_json_rpc(&error_response).await;
            return (StatusCode::OK, Json(serde_json::json!({"status": "error_sent"}))).into_response();
        }
    };

    // X-MCP-Server selects the target backend; if absent, fall back to the
    // first registered server (original_source §sse.py literal behavior —
    // an explicit Open Question, resolved this way in DESIGN.md).
    let target_server = headers
        .get("X-MCP-Server")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .or_else(|| state.registry.first_server());

    let Some(target_server) = target_server else {
        let error_response = JsonRpcResponse::failure(request.id.clone(), error_code::INVALID_REQUEST, "No target server specified", None);
        session.send_json_rpc(&error_response).await;
        return (StatusCode::OK, Json(serde_json::json!({"status": "error_sent"}))).into_response();
    };

    let response = state.registry.call(&target_server, request).await;
    session.send_json_rpc(&response).await;
    (StatusCode::OK, Json(serde_json::json!({"status": "response_sent"}))).into_response()
}

async fn sse_disconnect(State(state): State<Arc<AppState>>, Path(session_id): Path<String>) -> impl IntoResponse {
    match state.sessions.disconnect(&session_id).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"status": "closed"}))).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, Json(serde_json::json!({"detail": "Session not found"}))).into_response(),
    }
}

async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let sessions = state.sessions.list().await;
    Json(serde_json::json!({"count": sessions.len(), "sessions": sessions}))
}

async fn clear_cache(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.enhancement.clear_cache().await;
    Json(serde_json::json!({"status": "cleared"}))
}

async fn reset_breakers(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.registry.breakers.reset_all();
    Json(serde_json::json!({"status": "reset"}))
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let recent = state.request_log.recent(50).await;
    Json(serde_json::json!({
        "cache": state.enhancement.cache_stats(),
        "circuit_breakers": state.registry.breakers.all_status(),
        "recent_requests": recent,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnhancementConfig, ServerCatalog, Settings};
    use crate::registry::ServerRegistry;

    #[tokio::test]
    async fn health_reports_healthy_with_no_servers() {
        let registry = ServerRegistry::new(ServerCatalog::default(), reqwest::Client::new());
        let enhancement = EnhancementMiddleware::new(
            "http://localhost:11434".into(),
            EnhancementConfig::default(),
            crate::cache::PromptCache::new(10, 0.85, None),
            reqwest::Client::new(),
        );
        let state = Arc::new(AppState::new(registry, enhancement, Settings::default()));

        let Json(body) = health(State(state)).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["services"], serde_json::json!([]));
    }
}
