//! Embedding seam, the Gemini `embedContent` client, and an LRU cache
//! wrapper for repeated texts.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lru::LruCache;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::RagError;

/// Converts text into a fixed-dimensionality embedding vector.
///
/// The dimensionality is a property of the remote model and stays constant
/// for the lifetime of the process; the vector store enforces it on write.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds one text. Remote failure or timeout is [`RagError::Embedding`].
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;
}

/// Gemini embedding client (`embedContent` endpoint, `?key=` auth).
pub struct GeminiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiEmbedder {
    /// Builds a client for the given endpoint, e.g.
    /// `https://generativelanguage.googleapis.com/v1beta/models/text-embedding-004:embedContent`.
    pub fn new(api_key: String, endpoint: String, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Gemini API key");
        anyhow::ensure!(
            endpoint.starts_with("http://") || endpoint.starts_with("https://"),
            "embedding endpoint must be an http(s) URL"
        );
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self {
            client,
            endpoint,
            api_key: api_key.trim().to_string(),
        })
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        debug!(length = text.len(), "requesting embedding");
        let request = EmbedRequest::from_text(text);
        let url = format!("{}?key={}", self.endpoint, self.api_key);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(embed_err)?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(RagError::Embedding(format!(
                "Gemini embedding request failed ({status}): {body}"
            )));
        }

        let parsed: EmbedResponse = response.json().await.map_err(embed_err)?;
        let values = parsed.embedding.values;
        if values.is_empty() {
            return Err(RagError::Embedding(
                "Gemini returned an empty embedding".to_string(),
            ));
        }
        debug!(dimensions = values.len(), "embedding generated");
        Ok(values)
    }
}

/// Embedder decorator that memoizes vectors by exact text.
///
/// Queries repeat far more often than documents, so fronting the remote
/// embedder with a small LRU saves a round trip per repeated question.
pub struct CachingEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl CachingEmbedder {
    /// Wraps `inner` with a cache holding up to `capacity` entries.
    /// Returns `None` when `capacity` is zero, meaning caching is disabled.
    pub fn new(inner: Arc<dyn Embedder>, capacity: usize) -> Option<Self> {
        NonZeroUsize::new(capacity).map(|capacity| Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }
}

#[async_trait]
impl Embedder for CachingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        if let Some(hit) = self.cache.lock().await.get(text).cloned() {
            debug!(length = text.len(), "embedding cache hit");
            return Ok(hit);
        }
        let embedding = self.inner.embed(text).await?;
        self.cache
            .lock()
            .await
            .put(text.to_string(), embedding.clone());
        Ok(embedding)
    }
}

fn embed_err(err: reqwest::Error) -> RagError {
    if err.is_timeout() {
        RagError::Embedding(format!("embedding request timed out: {err}"))
    } else {
        RagError::Embedding(err.to_string())
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    content: EmbedContent<'a>,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: Vec<EmbedPart<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

impl<'a> EmbedRequest<'a> {
    fn from_text(text: &'a str) -> Self {
        Self {
            content: EmbedContent {
                parts: vec![EmbedPart { text }],
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embedding: EmbeddingValues,
}

#[derive(Debug, Default, Deserialize)]
struct EmbeddingValues {
    #[serde(default)]
    values: Vec<f32>,
}
