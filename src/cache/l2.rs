//! L2 semantic-similarity cache backed by a Qdrant-compatible vector store.
//!
//! [`VectorStore`] is a narrow trait so tests can substitute an in-memory
//! fake instead of driving a real server, the way the teacher's transport
//! layer gets a `fake::FakeTransport` test double. [`QdrantStore`] speaks
//! the subset of the Qdrant HTTP API the original Python client uses:
//! collection creation, point upsert, and nearest-neighbor search with a
//! score threshold (`original_source/router/cache.py::_init_qdrant`,
//! `_find_similar_qdrant`, `_store_in_qdrant`).

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::CacheEntry;

pub const COLLECTION_NAME: &str = "prompt_cache";
pub const EMBEDDING_DIM: usize = 768;

#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    async fn search(&self, embedding: &[f32], score_threshold: f32) -> Result<Option<CacheEntry>>;
    async fn upsert(&self, embedding: &[f32], entry: &CacheEntry) -> Result<()>;

    /// Drop and re-create the collection, discarding all stored points.
    /// Called by `PromptCache::clear()`.
    async fn recreate_collection(&self) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct VectorParams {
    size: usize,
    distance: &'static str,
}

#[derive(Debug, Serialize)]
struct CreateCollectionBody {
    vectors: VectorParams,
}

#[derive(Debug, Deserialize)]
struct CollectionsResponse {
    result: CollectionsResult,
}

#[derive(Debug, Deserialize)]
struct CollectionsResult {
    collections: Vec<CollectionDescriptor>,
}

#[derive(Debug, Deserialize)]
struct CollectionDescriptor {
    name: String,
}

#[derive(Debug, Serialize)]
struct Point {
    id: String,
    vector: Vec<f32>,
    payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct UpsertBody {
    points: Vec<Point>,
}

#[derive(Debug, Serialize)]
struct SearchBody<'a> {
    vector: &'a [f32],
    limit: u32,
    score_threshold: f32,
    with_payload: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    payload: serde_json::Value,
}

/// Talks to a Qdrant-compatible HTTP API. Construction ensures the
/// `prompt_cache` collection exists (creating it with `size=768`,
/// `distance=Cosine` if absent); failure to do so disables L2 rather than
/// aborting startup, matching the original's "Qdrant not available, L2
/// cache disabled" fallback.
#[derive(Debug)]
pub struct QdrantStore {
    base_url: String,
    client: Client,
}

impl QdrantStore {
    /// Attempt to connect and ensure the collection exists. Returns `None`
    /// (not an error) if the store is unreachable, so callers can run with
    /// L2 disabled.
    pub async fn connect(base_url: &str) -> Option<Self> {
        let client = Client::builder().timeout(std::time::Duration::from_secs(5)).build().ok()?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let store = Self { base_url, client };
        match store.ensure_collection().await {
            Ok(()) => Some(store),
            Err(e) => {
                tracing::warn!(error = %e, "qdrant not available, l2 cache disabled");
                None
            }
        }
    }

    async fn ensure_collection(&self) -> Result<()> {
        let collections: CollectionsResponse = self.client.get(format!("{}/collections", self.base_url)).send().await?.json().await?;

        if collections.result.collections.iter().any(|c| c.name == COLLECTION_NAME) {
            tracing::info!(collection = COLLECTION_NAME, "using existing qdrant collection");
            return Ok(());
        }

        self.create_collection().await?;
        tracing::info!(collection = COLLECTION_NAME, "created qdrant collection");
        Ok(())
    }

    async fn create_collection(&self) -> Result<()> {
        let body = CreateCollectionBody { vectors: VectorParams { size: EMBEDDING_DIM, distance: "Cosine" } };
        self.client.put(format!("{}/collections/{}", self.base_url, COLLECTION_NAME)).json(&body).send().await?.error_for_status()?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl VectorStore for QdrantStore {
    async fn search(&self, embedding: &[f32], score_threshold: f32) -> Result<Option<CacheEntry>> {
        let body = SearchBody { vector: embedding, limit: 1, score_threshold, with_payload: true };
        let resp: SearchResponse = self
            .client
            .post(format!("{}/collections/{}/points/search", self.base_url, COLLECTION_NAME))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        Ok(resp.result.into_iter().next().map(|hit| CacheEntry {
            prompt: hit.payload.get("prompt").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            response: hit.payload.get("response").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            model: hit.payload.get("model").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            hits: hit.payload.get("hits").and_then(|v| v.as_u64()).unwrap_or(0),
        }))
    }

    async fn upsert(&self, embedding: &[f32], entry: &CacheEntry) -> Result<()> {
        let point = Point {
            id: uuid::Uuid::new_v4().to_string(),
            vector: embedding.to_vec(),
            payload: serde_json::json!({
                "prompt": entry.prompt,
                "response": entry.response,
                "model": entry.model,
                "hits": entry.hits,
            }),
        };
        let body = UpsertBody { points: vec![point] };
        self.client
            .put(format!("{}/collections/{}/points", self.base_url, COLLECTION_NAME))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn recreate_collection(&self) -> Result<()> {
        let resp = self.client.delete(format!("{}/collections/{}", self.base_url, COLLECTION_NAME)).send().await?;
        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            resp.error_for_status()?;
        }
        self.create_collection().await?;
        tracing::info!(collection = COLLECTION_NAME, "recreated qdrant collection");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn connect_creates_collection_when_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"result": {"collections": []}})))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(format!("/collections/{COLLECTION_NAME}")))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let store = QdrantStore::connect(&server.uri()).await;
        assert!(store.is_some());
    }

    #[tokio::test]
    async fn connect_returns_none_on_unreachable_server() {
        let store = QdrantStore::connect("http://127.0.0.1:1").await;
        assert!(store.is_none());
    }
}
