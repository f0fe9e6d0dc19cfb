//! Server registry: holds the immutable server catalog, lazily-started
//! stdio adapters, and the per-server circuit breakers, and routes JSON-RPC
//! calls to the right transport.
//!
//! Grounded on `original_source/router/registry.py::ServerRegistry`; the
//! breaker-wrapping-every-call pattern (`can_execute` gate, `record_success`
//! / `record_failure` on the way out) is carried over unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;

use crate::breaker::BreakerRegistry;
use crate::config::ServerCatalog;
use crate::error::Result;
use crate::rpc::{error_code, JsonRpcRequest, JsonRpcResponse};
use crate::transport::http::HttpBackend;
use crate::transport::stdio::StdioAdapter;
use crate::transport::BackendTransport;

enum Backend {
    Http(HttpBackend),
    Stdio(Arc<StdioAdapter>),
}

impl Backend {
    async fn call(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        match self {
            Backend::Http(b) => b.call(request).await,
            Backend::Stdio(a) => a.call(request).await,
        }
    }

    fn is_healthy(&self) -> bool {
        match self {
            Backend::Http(b) => b.is_healthy(),
            Backend::Stdio(a) => a.is_healthy(),
        }
    }
}

/// Routes JSON-RPC requests across configured backend servers.
pub struct ServerRegistry {
    catalog: ServerCatalog,
    backends: HashMap<String, Backend>,
    pub breakers: BreakerRegistry,
}

impl ServerRegistry {
    /// Build the registry from a loaded catalog. HTTP backends are
    /// constructed eagerly (cheap, no connection); stdio backends are
    /// constructed here but their child process is only spawned by
    /// [`ServerRegistry::initialize`].
    pub fn new(catalog: ServerCatalog, http_client: Client) -> Self {
        let mut backends = HashMap::new();
        for (name, cfg) in &catalog.servers {
            match cfg.transport.as_str() {
                "stdio" => {
                    if let Some(command) = &cfg.command {
                        let adapter = StdioAdapter::new(name.clone(), command.clone(), cfg.env.clone());
                        backends.insert(name.clone(), Backend::Stdio(Arc::new(adapter)));
                    } else {
                        tracing::warn!(server = %name, "stdio server missing command, skipping");
                    }
                }
                "http" => match &cfg.url {
                    Some(url) if url::Url::parse(url).is_ok() => {
                        let backend = HttpBackend::new(name.clone(), url.clone(), cfg.health_endpoint.clone(), http_client.clone());
                        backends.insert(name.clone(), Backend::Http(backend));
                    }
                    Some(url) => tracing::warn!(server = %name, url, "invalid http server url, skipping"),
                    None => tracing::warn!(server = %name, "http server missing url, skipping"),
                },
                other => tracing::warn!(server = %name, transport = other, "unknown transport, skipping"),
            }
        }

        Self { catalog, backends, breakers: BreakerRegistry::default() }
    }

    /// Start every stdio adapter. A failure to start one server is logged
    /// and recorded against its breaker, but does not prevent the others
    /// from starting (§7, partial-degradation policy).
    pub async fn initialize(&self) {
        for (name, backend) in &self.backends {
            if let Backend::Stdio(adapter) = backend {
                if let Err(e) = adapter.start().await {
                    tracing::error!(server = %name, error = %e, "failed to start stdio server");
                    self.breakers.get(name).record_failure();
                }
            }
        }
    }

    pub async fn shutdown(&self) {
        for backend in self.backends.values() {
            if let Backend::Stdio(adapter) = backend {
                adapter.stop().await;
            }
        }
    }

    pub fn list_servers(&self) -> Vec<String> {
        self.catalog.servers.keys().cloned().collect()
    }

    pub fn first_server(&self) -> Option<String> {
        self.catalog.servers.keys().next().cloned()
    }

    /// Route a JSON-RPC request to `server`, gated by its circuit breaker.
    pub async fn call(&self, server: &str, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();

        let Some(backend) = self.backends.get(server) else {
            return JsonRpcResponse::failure(
                id,
                error_code::INVALID_REQUEST,
                format!("Unknown server: {server}"),
                Some(serde_json::json!({"available": self.list_servers()})),
            );
        };

        let breaker = self.breakers.get(server);
        if !breaker.can_execute() {
            return JsonRpcResponse::failure(
                id,
                error_code::SERVER_ERROR,
                format!("Server {server} circuit breaker open"),
                Some(serde_json::json!({"state": breaker.status()})),
            );
        }

        match backend.call(request).await {
            Ok(mut resp) => {
                breaker.record_success();
                resp.id = id.clone();
                resp
            }
            Err(e) => {
                tracing::error!(server, error = %e, "request to server failed");
                breaker.record_failure();
                JsonRpcResponse::failure(id, error_code::UPSTREAM_ERROR, e.to_string(), None)
            }
        }
    }

    pub async fn health_check(&self, server: &str) -> serde_json::Value {
        let Some(backend) = self.backends.get(server) else {
            return serde_json::json!({"name": server, "status": "unknown", "error": "Not registered"});
        };
        let breaker_status = self.breakers.get(server).status();

        match backend {
            Backend::Stdio(adapter) => serde_json::json!({
                "name": server,
                "status": if adapter.is_healthy() { "healthy" } else { "down" },
                "transport": "stdio",
                "circuit_breaker": breaker_status,
            }),
            Backend::Http(http_backend) => {
                let mut status = http_backend.health_check().await;
                status["circuit_breaker"] = serde_json::to_value(&breaker_status).unwrap();
                status
            }
        }
    }

    pub async fn all_health(&self) -> Vec<serde_json::Value> {
        let mut results = Vec::new();
        for server in self.list_servers() {
            results.push(self.health_check(&server).await);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn catalog_with(name: &str, cfg: ServerConfig) -> ServerCatalog {
        let mut servers = HashMap::new();
        servers.insert(name.to_string(), cfg);
        ServerCatalog { servers }
    }

    #[tokio::test]
    async fn unknown_server_returns_invalid_request() {
        let registry = ServerRegistry::new(ServerCatalog::default(), Client::new());
        let resp = registry.call("nope", JsonRpcRequest::new(Some(serde_json::json!(1)), "ping", None)).await;
        assert_eq!(resp.error.unwrap().code, error_code::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn breaker_open_short_circuits_before_dispatch() {
        let catalog = catalog_with(
            "flaky",
            ServerConfig { transport: "http".into(), url: Some("http://127.0.0.1:1".into()), command: None, health_endpoint: None, env: HashMap::new() },
        );
        let registry = ServerRegistry::new(catalog, Client::new());
        registry.breakers.get("flaky").record_failure();
        registry.breakers.get("flaky").record_failure();
        registry.breakers.get("flaky").record_failure();

        let resp = registry.call("flaky", JsonRpcRequest::new(Some(serde_json::json!(1)), "ping", None)).await;
        assert_eq!(resp.error.unwrap().code, error_code::SERVER_ERROR);
    }

    #[test]
    fn list_servers_reflects_catalog() {
        let catalog = catalog_with(
            "svc",
            ServerConfig { transport: "http".into(), url: Some("http://x".into()), command: None, health_endpoint: None, env: HashMap::new() },
        );
        let registry = ServerRegistry::new(catalog, Client::new());
        assert_eq!(registry.list_servers(), vec!["svc".to_string()]);
    }
}
