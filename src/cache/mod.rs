//! Two-tier prompt cache.
//!
//! L1 is an exact-match, SHA-256-prefix-keyed, insertion-ordered LRU map
//! (always present). L2 is an optional vector-similarity store behind
//! [`l2::VectorStore`], so tests can substitute a fake without a live
//! Qdrant-compatible server. Grounded on
//! `original_source/router/cache.py::PromptCache`; the decision that an L2
//! hit does *not* get promoted into L1 is a deliberate choice (the original
//! never does this either) recorded as an Open Question resolution in
//! DESIGN.md.

pub mod l1;
pub mod l2;

use std::sync::Mutex;

use serde::Serialize;

use l1::L1Cache;
use l2::VectorStore;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub prompt: String,
    pub response: String,
    pub model: String,
    pub hits: u64,
}

#[derive(Debug, Default, Serialize)]
pub struct CacheStats {
    pub l1_hits: u64,
    pub l1_misses: u64,
    pub l2_hits: u64,
    pub l2_misses: u64,
    pub total_entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.l1_hits + self.l1_misses + self.l2_hits + self.l2_misses;
        if total == 0 {
            0.0
        } else {
            (self.l1_hits + self.l2_hits) as f64 / total as f64
        }
    }
}

/// Coordinates the L1 exact cache and an optional L2 similarity store.
pub struct PromptCache {
    l1: Mutex<L1Cache>,
    l2: Option<Box<dyn VectorStore>>,
    similarity_threshold: f32,
    stats: Mutex<CacheStats>,
}

impl std::fmt::Debug for PromptCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptCache").field("has_l2", &self.l2.is_some()).finish()
    }
}

impl PromptCache {
    pub fn new(max_size: usize, similarity_threshold: f32, l2: Option<Box<dyn VectorStore>>) -> Self {
        Self { l1: Mutex::new(L1Cache::new(max_size)), l2, similarity_threshold, stats: Mutex::new(CacheStats::default()) }
    }

    /// Look up `prompt` in L1, falling back to L2 if an `embedding` is
    /// supplied and an L2 store is configured. An L2 hit is returned
    /// as-is; it is deliberately not copied back into L1 (see module docs).
    pub async fn get(&self, prompt: &str, embedding: Option<&[f32]>) -> Option<CacheEntry> {
        {
            let mut l1 = self.l1.lock().expect("l1 mutex poisoned");
            if let Some(entry) = l1.get(prompt) {
                self.stats.lock().expect("stats mutex poisoned").l1_hits += 1;
                return Some(entry);
            }
        }
        self.stats.lock().expect("stats mutex poisoned").l1_misses += 1;

        if let (Some(embedding), Some(store)) = (embedding, self.l2.as_ref()) {
            match store.search(embedding, self.similarity_threshold).await {
                Ok(Some(entry)) => {
                    self.stats.lock().expect("stats mutex poisoned").l2_hits += 1;
                    return Some(entry);
                }
                Ok(None) => {
                    self.stats.lock().expect("stats mutex poisoned").l2_misses += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "l2 cache search failed");
                    self.stats.lock().expect("stats mutex poisoned").l2_misses += 1;
                }
            }
        }
        None
    }

    pub async fn put(&self, prompt: &str, response: &str, model: &str, embedding: Option<&[f32]>) {
        {
            let mut l1 = self.l1.lock().expect("l1 mutex poisoned");
            l1.put(prompt, response, model);
            self.stats.lock().expect("stats mutex poisoned").total_entries = l1.len();
        }

        if let (Some(embedding), Some(store)) = (embedding, self.l2.as_ref()) {
            let entry = CacheEntry { prompt: prompt.to_string(), response: response.to_string(), model: model.to_string(), hits: 0 };
            if let Err(e) = store.upsert(embedding, &entry).await {
                tracing::warn!(error = %e, "failed to store in l2 cache");
            }
        }
    }

    pub async fn clear(&self) {
        self.l1.lock().expect("l1 mutex poisoned").clear();
        *self.stats.lock().expect("stats mutex poisoned") = CacheStats::default();

        if let Some(store) = self.l2.as_ref() {
            if let Err(e) = store.recreate_collection().await {
                tracing::warn!(error = %e, "failed to recreate l2 collection on clear");
            }
        }
    }

    pub fn stats(&self) -> serde_json::Value {
        let stats = self.stats.lock().expect("stats mutex poisoned");
        serde_json::json!({
            "l1_hits": stats.l1_hits,
            "l1_misses": stats.l1_misses,
            "l2_hits": stats.l2_hits,
            "l2_misses": stats.l2_misses,
            "total_entries": stats.total_entries,
            "hit_rate": (stats.hit_rate() * 100.0 * 100.0).round() / 100.0,
            "l2_available": self.l2.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn l1_only_put_then_get() {
        let cache = PromptCache::new(10, 0.85, None);
        cache.put("hello", "world", "llama3.2:3b", None).await;
        let entry = cache.get("hello", None).await.unwrap();
        assert_eq!(entry.response, "world");
        assert_eq!(cache.stats()["l1_hits"], 1);
    }

    #[tokio::test]
    async fn miss_without_l2_is_none() {
        let cache = PromptCache::new(10, 0.85, None);
        assert!(cache.get("missing", None).await.is_none());
        assert_eq!(cache.stats()["l1_misses"], 1);
    }
}
