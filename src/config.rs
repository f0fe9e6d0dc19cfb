//! Runtime configuration: environment-driven [`Settings`] plus the two
//! JSON config files (server catalog, enhancement rules) loaded at startup.
//!
//! Grounded on the teacher's `Config` (env-backed settings with
//! `#[serde(default = "default_fn")]`-style fallbacks) and on the original
//! Python `Settings` (`pydantic_settings.BaseSettings`) in
//! `original_source/router/config.py`, reimplemented as a plain struct with
//! `from_env()` rather than a pydantic translation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

fn default_ollama_host() -> String {
    "localhost".to_string()
}
fn default_ollama_port() -> u16 {
    11434
}
fn default_ollama_model() -> String {
    "deepseek-r1".to_string()
}
fn default_router_host() -> String {
    "0.0.0.0".to_string()
}
fn default_router_port() -> u16 {
    9090
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_cache_max_size() -> usize {
    1000
}
fn default_cache_similarity_threshold() -> f32 {
    0.85
}

/// Environment-driven application settings.
///
/// Mirrors the original `Settings` model field-for-field; loaded with
/// [`Settings::from_env`] rather than a derive macro because the source is
/// plain `std::env::var`, matching the teacher's `Config::load` convention
/// of explicit env lookups with documented defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_ollama_host")]
    pub ollama_host: String,
    #[serde(default = "default_ollama_port")]
    pub ollama_port: u16,
    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,

    #[serde(default = "default_router_host")]
    pub router_host: String,
    #[serde(default = "default_router_port")]
    pub router_port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_cache_max_size")]
    pub cache_max_size: usize,
    #[serde(default = "default_cache_similarity_threshold")]
    pub cache_similarity_threshold: f32,

    /// Qdrant-compatible vector store URL; `None` disables the L2 cache.
    pub qdrant_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ollama_host: default_ollama_host(),
            ollama_port: default_ollama_port(),
            ollama_model: default_ollama_model(),
            router_host: default_router_host(),
            router_port: default_router_port(),
            log_level: default_log_level(),
            cache_max_size: default_cache_max_size(),
            cache_similarity_threshold: default_cache_similarity_threshold(),
            qdrant_url: None,
        }
    }
}

impl Settings {
    /// Build settings from environment variables, falling back to the
    /// documented defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ollama_host: std::env::var("OLLAMA_HOST").unwrap_or(defaults.ollama_host),
            ollama_port: std::env::var("OLLAMA_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.ollama_port),
            ollama_model: std::env::var("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            router_host: std::env::var("ROUTER_HOST").unwrap_or(defaults.router_host),
            router_port: std::env::var("ROUTER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.router_port),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            cache_max_size: std::env::var("CACHE_MAX_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cache_max_size),
            cache_similarity_threshold: std::env::var("CACHE_SIMILARITY_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cache_similarity_threshold),
            qdrant_url: std::env::var("QDRANT_URL").ok(),
        }
    }

    /// Construct the Ollama base URL, handling a host value that already
    /// carries a scheme (matches the original's `ollama_url` property).
    pub fn ollama_url(&self) -> String {
        if self.ollama_host.starts_with("http://") || self.ollama_host.starts_with("https://") {
            self.ollama_host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}:{}", self.ollama_host, self.ollama_port)
        }
    }
}

/// Declares how a single backend MCP server is reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// `"http"` or `"stdio"`.
    pub transport: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub command: Option<Vec<String>>,
    #[serde(default)]
    pub health_endpoint: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Top-level shape of the server catalog config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCatalog {
    #[serde(default)]
    pub servers: HashMap<String, ServerConfig>,
}

impl ServerCatalog {
    /// Load the catalog from `path`. A missing file is a warning, not a
    /// fatal error (§7): an empty catalog is returned instead.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "server catalog not found, starting with no backends");
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let catalog: Self = serde_json::from_str(&data)
            .map_err(|e| GatewayError::Config(format!("invalid server catalog {}: {e}", path.display())))?;
        tracing::info!(path = %path.display(), count = catalog.servers.len(), "loaded server catalog");
        Ok(catalog)
    }
}

/// Per-client (or default) enhancement behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancementRule {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub model: String,
    pub system_prompt: String,
}

fn default_true() -> bool {
    true
}

impl Default for EnhancementRule {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "llama3.2:3b".to_string(),
            system_prompt: "Improve clarity and structure. Preserve intent.".to_string(),
        }
    }
}

/// Full enhancement rule set: a default plus per-client overrides and a
/// shared fallback model chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancementConfig {
    pub default: EnhancementRule,
    #[serde(default)]
    pub clients: HashMap<String, EnhancementRule>,
    #[serde(default)]
    pub fallback_chain: Vec<Option<String>>,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self { default: EnhancementRule::default(), clients: HashMap::new(), fallback_chain: Vec::new() }
    }
}

impl EnhancementConfig {
    /// Load enhancement rules from `path`, falling back to built-in
    /// defaults if the file is absent (§7, same "missing config is a
    /// warning" policy as the server catalog).
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "enhancement config not found, using defaults");
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)
            .map_err(|e| GatewayError::Config(format!("invalid enhancement config {}: {e}", path.display())))?;
        tracing::info!(path = %path.display(), "loaded enhancement rules");
        Ok(config)
    }

    pub fn rule_for(&self, client: Option<&str>) -> &EnhancementRule {
        match client {
            Some(name) => self.clients.get(name).unwrap_or(&self.default),
            None => &self.default,
        }
    }
}

/// Paths to the two JSON config files, resolved from CLI flags or defaults.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub servers: PathBuf,
    pub enhancement: PathBuf,
}
