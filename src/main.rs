//! Entry point: parse CLI flags, load configuration, wire up the shared
//! application state, and serve the HTTP/SSE surface.
//!
//! Structured the way the teacher's `main.rs` does (tracing init, then
//! config load, then dispatch) but collapsed to a single long-running
//! "serve" action instead of the teacher's multi-subcommand agent CLI.

use std::sync::Arc;

use clap::Parser;
use mcp_router::cache::l2::QdrantStore;
use mcp_router::cache::PromptCache;
use mcp_router::cli::Cli;
use mcp_router::config::{EnhancementConfig, ServerCatalog, Settings};
use mcp_router::enhance::EnhancementMiddleware;
use mcp_router::http_api::{build_router, AppState};
use mcp_router::registry::ServerRegistry;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(override_level: Option<&str>) {
    let env_filter = override_level
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("mcp_router=info"));

    tracing_subscriber::registry().with(env_filter).with(tracing_subscriber::fmt::layer()).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let settings = Settings::from_env();
    tracing::info!(host = %settings.router_host, port = settings.router_port, "starting mcp router");
    tracing::info!(ollama_url = %settings.ollama_url(), "ollama endpoint configured");

    let http_client = reqwest::Client::builder().timeout(std::time::Duration::from_secs(60)).build()?;

    let server_catalog = ServerCatalog::load(&cli.servers_config)?;
    let registry = ServerRegistry::new(server_catalog, http_client.clone());
    registry.initialize().await;

    let enhancement_config = EnhancementConfig::load(&cli.enhancement_config)?;
    let l2 = match &settings.qdrant_url {
        Some(url) => QdrantStore::connect(url).await.map(|s| Box::new(s) as Box<dyn mcp_router::cache::l2::VectorStore>),
        None => None,
    };
    let cache = PromptCache::new(settings.cache_max_size, settings.cache_similarity_threshold, l2);
    let enhancement = EnhancementMiddleware::new(settings.ollama_url(), enhancement_config, cache, http_client);

    let bind_addr = cli.bind.clone().unwrap_or_else(|| format!("{}:{}", settings.router_host, settings.router_port));

    let state = Arc::new(AppState::new(registry, enhancement, settings));
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "mcp router listening");

    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
            shutdown_state.registry.shutdown().await;
        })
        .await?;

    tracing::info!("mcp router shutdown complete");
    Ok(())
}
