//! Ollama-backed prompt enhancement middleware.
//!
//! Per-client rule lookup, cache probe before the upstream call, a model
//! fallback chain gated by a rough token-budget check, and never-fatal
//! degradation back to the original prompt on failure. Grounded on
//! `original_source/router/middleware/enhance.py::EnhancementMiddleware`.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

use crate::cache::PromptCache;
use crate::config::EnhancementConfig;
use crate::error::Result;

/// Rough per-model context limits in tokens, used for a cheap pre-call
/// budget check (`len(prompt) / 4` estimated tokens vs. 90% of the limit).
fn model_limits() -> HashMap<&'static str, u32> {
    HashMap::from([
        ("llama3.2:3b", 128_000),
        ("llama3", 8_000),
        ("deepseek-r1:14b", 64_000),
        ("deepseek-r1", 64_000),
        ("qwen2.5-coder:7b", 128_000),
        ("phi3:mini", 128_000),
        ("nomic-embed-text", 8_000),
    ])
}

const DEFAULT_MODEL_LIMIT: u32 = 8_000;
const SAFETY_MARGIN: f64 = 0.9;

#[derive(Debug, Serialize)]
pub struct EnhanceResult {
    pub original: String,
    pub enhanced: String,
    pub model: Option<String>,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(serde::Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(serde::Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

pub struct EnhancementMiddleware {
    ollama_url: String,
    client: Client,
    config: EnhancementConfig,
    cache: PromptCache,
}

impl EnhancementMiddleware {
    pub fn new(ollama_url: String, config: EnhancementConfig, cache: PromptCache, client: Client) -> Self {
        Self { ollama_url: ollama_url.trim_end_matches('/').to_string(), client, config, cache }
    }

    /// Enhance `prompt` for `client`. Never returns an error: an upstream
    /// failure degrades to the original prompt with an `error` field set,
    /// matching the original's `except Exception` fallback.
    pub async fn enhance(&self, prompt: &str, client: Option<&str>) -> EnhanceResult {
        let rule = self.config.rule_for(client);

        if !rule.enabled {
            return EnhanceResult { original: prompt.to_string(), enhanced: prompt.to_string(), model: None, cached: false, skipped: Some(true), error: None };
        }

        if let Some(entry) = self.cache.get(prompt, None).await {
            return EnhanceResult { original: prompt.to_string(), enhanced: entry.response, model: Some(entry.model), cached: true, skipped: None, error: None };
        }

        let mut models_to_try = vec![rule.model.clone()];
        for candidate in self.config.fallback_chain.iter().flatten() {
            if !models_to_try.contains(candidate) {
                models_to_try.push(candidate.clone());
            }
        }

        let mut last_error: Option<String> = None;
        for model in &models_to_try {
            if !Self::fits_context_limit(prompt, model) {
                tracing::warn!(model, "prompt too large for model, trying next");
                continue;
            }

            match self.call_generate(prompt, model, &rule.system_prompt).await {
                Ok(enhanced) => {
                    self.cache.put(prompt, &enhanced, model, None).await;
                    return EnhanceResult { original: prompt.to_string(), enhanced, model: Some(model.clone()), cached: false, skipped: None, error: None };
                }
                Err(e) => {
                    tracing::warn!(model, error = %e, "ollama model failed, trying next");
                    last_error = Some(e.to_string());
                }
            }
        }

        tracing::error!(error = ?last_error, "enhancement exhausted fallback chain");
        EnhanceResult {
            original: prompt.to_string(),
            enhanced: prompt.to_string(),
            model: Some(rule.model.clone()),
            cached: false,
            skipped: None,
            error: last_error.or_else(|| Some("no model available".to_string())),
        }
    }

    fn fits_context_limit(prompt: &str, model: &str) -> bool {
        let estimated_tokens = prompt.len() as f64 / 4.0;
        let limit = *model_limits().get(model).unwrap_or(&DEFAULT_MODEL_LIMIT) as f64;
        estimated_tokens < limit * SAFETY_MARGIN
    }

    async fn call_generate(&self, prompt: &str, model: &str, system_prompt: &str) -> Result<String> {
        let resp = self
            .client
            .post(format!("{}/api/generate", self.ollama_url))
            .timeout(Duration::from_secs(60))
            .json(&serde_json::json!({
                "model": model,
                "prompt": format!("Enhance this prompt:\n\n{prompt}"),
                "system": system_prompt,
                "stream": false,
            }))
            .send()
            .await?
            .error_for_status()?
            .json::<GenerateResponse>()
            .await?;

        Ok(resp.response.trim().to_string())
    }

    /// Request an embedding vector for `text` from the Ollama embeddings
    /// endpoint. Returns `None` on any failure rather than propagating —
    /// the L2 cache is best-effort.
    pub async fn embed(&self, text: &str, model: &str) -> Option<Vec<f32>> {
        let result = self
            .client
            .post(format!("{}/api/embeddings", self.ollama_url))
            .timeout(Duration::from_secs(30))
            .json(&serde_json::json!({"model": model, "prompt": text}))
            .send()
            .await
            .ok()?
            .error_for_status()
            .ok()?
            .json::<EmbeddingResponse>()
            .await
            .ok()?;

        result.embedding
    }

    pub fn cache_stats(&self) -> serde_json::Value {
        self.cache.stats()
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await
    }
}
