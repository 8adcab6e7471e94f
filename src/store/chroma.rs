//! ChromaDB-backed vector store delegate.
//!
//! Talks to the ChromaDB v2 REST API: collection lookup/create on first
//! use, bulk upsert, nearest-neighbor query, count, and delete. Similarity
//! ranking happens inside Chroma; this module only translates records.
//!
//! Consistency: read-after-write visibility follows the backend. For the
//! single-node deployments this client targets, writes are visible to the
//! next query; treat anything else as backend-dependent.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::RagError;
use crate::store::{ChunkRecord, EmbeddedChunk, ScoredChunk, VectorStore};

const TENANT: &str = "default_tenant";
const DATABASE: &str = "default_database";
const ADMIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Vector store that delegates storage and search to a remote ChromaDB.
pub struct ChromaStore {
    client: reqwest::Client,
    collections_url: String,
    collection_name: String,
    collection_id: OnceCell<String>,
    dims: Mutex<Option<usize>>,
}

impl ChromaStore {
    /// Builds a client for `base_url` (e.g. `http://localhost:8000`) and the
    /// named collection. The collection is created lazily on first use.
    pub fn new(base_url: &str, collection_name: &str) -> Result<Self> {
        anyhow::ensure!(
            base_url.starts_with("http://") || base_url.starts_with("https://"),
            "Chroma URL must be an http(s) URL"
        );
        anyhow::ensure!(
            !collection_name.trim().is_empty(),
            "missing Chroma collection name"
        );
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()
            .context("failed to build Chroma HTTP client")?;
        let collections_url = format!(
            "{}/api/v2/tenants/{TENANT}/databases/{DATABASE}/collections",
            base_url.trim_end_matches('/')
        );
        Ok(Self {
            client,
            collections_url,
            collection_name: collection_name.to_string(),
            collection_id: OnceCell::new(),
            dims: Mutex::new(None),
        })
    }

    /// Resolves the collection id, creating the collection if absent.
    async fn collection_id(&self) -> Result<&str, RagError> {
        self.collection_id
            .get_or_try_init(|| self.lookup_or_create_collection())
            .await
            .map(String::as_str)
    }

    async fn lookup_or_create_collection(&self) -> Result<String, RagError> {
        let existing: Vec<CollectionInfo> = self
            .client
            .get(&self.collections_url)
            .timeout(ADMIN_TIMEOUT)
            .send()
            .await
            .map_err(storage_err)?
            .error_for_status()
            .map_err(storage_err)?
            .json()
            .await
            .map_err(storage_err)?;

        if let Some(found) = existing.into_iter().find(|c| c.name == self.collection_name) {
            info!(collection = %self.collection_name, id = %found.id, "found existing Chroma collection");
            return Ok(found.id);
        }

        let body = CreateCollectionRequest {
            name: &self.collection_name,
        };
        let created: CollectionInfo = self
            .client
            .post(&self.collections_url)
            .timeout(ADMIN_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(storage_err)?
            .error_for_status()
            .map_err(storage_err)?
            .json()
            .await
            .map_err(storage_err)?;
        info!(collection = %self.collection_name, id = %created.id, "created Chroma collection");
        Ok(created.id)
    }

    fn collection_url(&self, id: &str, suffix: &str) -> String {
        format!("{}/{id}/{suffix}", self.collections_url)
    }

    fn check_dimensions(&self, items: &[EmbeddedChunk]) -> Result<(), RagError> {
        let mut dims = self.dims.lock().expect("dims lock poisoned");
        let expected = dims.unwrap_or_else(|| items[0].embedding.len());
        for item in items {
            if item.embedding.len() != expected {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: item.embedding.len(),
                });
            }
        }
        *dims = Some(expected);
        Ok(())
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn upsert(&self, items: Vec<EmbeddedChunk>) -> Result<(), RagError> {
        if items.is_empty() {
            warn!("no chunks to upsert");
            return Ok(());
        }
        self.check_dimensions(&items)?;

        let id = self.collection_id().await?;
        let mut payload = UpsertRequest::default();
        for item in &items {
            payload.ids.push(item.chunk.id.clone());
            payload.documents.push(item.chunk.text.clone());
            payload.embeddings.push(item.embedding.clone());
            payload.metadatas.push(ChunkMetadata::from(&item.chunk));
        }

        let url = self.collection_url(id, "upsert");
        debug!(count = payload.ids.len(), %url, "upserting chunks into Chroma");
        self.client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(storage_err)?
            .error_for_status()
            .map_err(storage_err)?;
        info!(count = items.len(), "added chunks to Chroma");
        Ok(())
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>, RagError> {
        if top_k < 1 {
            return Err(RagError::Validation("top_k must be at least 1".into()));
        }

        let id = self.collection_id().await?;
        let request = QueryRequest {
            query_embeddings: vec![query.to_vec()],
            n_results: top_k,
            include: vec!["documents", "metadatas", "distances"],
        };
        let response: QueryResponse = self
            .client
            .post(self.collection_url(id, "query"))
            .json(&request)
            .send()
            .await
            .map_err(storage_err)?
            .error_for_status()
            .map_err(storage_err)?
            .json()
            .await
            .map_err(storage_err)?;

        // Chroma returns parallel arrays, one row per query embedding.
        let ids = response.ids.into_iter().next().unwrap_or_default();
        let documents = response.documents.into_iter().next().unwrap_or_default();
        let metadatas = response.metadatas.into_iter().next().unwrap_or_default();
        let distances = response.distances.into_iter().next().unwrap_or_default();

        let mut results = Vec::with_capacity(ids.len());
        for (i, chunk_id) in ids.into_iter().enumerate() {
            let meta = metadatas.get(i).cloned().unwrap_or_default();
            let text = documents.get(i).cloned().unwrap_or_default();
            let distance = distances.get(i).copied().unwrap_or(0.0);
            results.push(ScoredChunk {
                chunk: meta.into_record(chunk_id, text),
                // Cosine distance from Chroma; report the similarity scale
                // the in-memory store uses.
                score: 1.0 - distance,
            });
        }
        Ok(results)
    }

    async fn count(&self) -> Result<usize, RagError> {
        let id = self.collection_id().await?;
        let count: usize = self
            .client
            .get(self.collection_url(id, "count"))
            .timeout(ADMIN_TIMEOUT)
            .send()
            .await
            .map_err(storage_err)?
            .error_for_status()
            .map_err(storage_err)?
            .json()
            .await
            .map_err(storage_err)?;
        Ok(count)
    }

    async fn delete(&self, chunk_id: &str) -> Result<bool, RagError> {
        let id = self.collection_id().await?;
        let probe = IdsPayload {
            ids: vec![chunk_id.to_string()],
        };
        let found: GetResponse = self
            .client
            .post(self.collection_url(id, "get"))
            .json(&probe)
            .send()
            .await
            .map_err(storage_err)?
            .error_for_status()
            .map_err(storage_err)?
            .json()
            .await
            .map_err(storage_err)?;
        if found.ids.is_empty() {
            return Ok(false);
        }

        self.client
            .post(self.collection_url(id, "delete"))
            .json(&probe)
            .send()
            .await
            .map_err(storage_err)?
            .error_for_status()
            .map_err(storage_err)?;
        debug!(%chunk_id, "deleted chunk from Chroma");
        Ok(true)
    }
}

fn storage_err(err: reqwest::Error) -> RagError {
    RagError::Storage(err.to_string())
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    id: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct CreateCollectionRequest<'a> {
    name: &'a str,
}

#[derive(Debug, Default, Serialize)]
struct UpsertRequest {
    ids: Vec<String>,
    documents: Vec<String>,
    embeddings: Vec<Vec<f32>>,
    metadatas: Vec<ChunkMetadata>,
}

#[derive(Debug, Serialize)]
struct QueryRequest {
    query_embeddings: Vec<Vec<f32>>,
    n_results: usize,
    include: Vec<&'static str>,
}

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Vec<Vec<String>>,
    #[serde(default)]
    metadatas: Vec<Vec<ChunkMetadata>>,
    #[serde(default)]
    distances: Vec<Vec<f64>>,
}

#[derive(Debug, Serialize)]
struct IdsPayload {
    ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GetResponse {
    #[serde(default)]
    ids: Vec<String>,
}

/// Denormalized chunk metadata stored alongside each Chroma document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ChunkMetadata {
    #[serde(default)]
    title: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    chunk_index: usize,
    #[serde(default)]
    total_chunks: usize,
    #[serde(default)]
    created_at: String,
}

impl From<&ChunkRecord> for ChunkMetadata {
    fn from(chunk: &ChunkRecord) -> Self {
        Self {
            title: chunk.source_title.clone(),
            source: chunk.source_tag.clone(),
            chunk_index: chunk.ordinal,
            total_chunks: chunk.total_chunks,
            created_at: chunk.created_at.to_rfc3339(),
        }
    }
}

impl ChunkMetadata {
    fn into_record(self, id: String, text: String) -> ChunkRecord {
        let created_at = self
            .created_at
            .parse::<DateTime<Utc>>()
            .unwrap_or_else(|_| Utc::now());
        ChunkRecord {
            id,
            ordinal: self.chunk_index,
            total_chunks: self.total_chunks,
            text,
            source_title: self.title,
            source_tag: self.source,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_urls() {
        assert!(ChromaStore::new("ftp://nope", "docs").is_err());
        assert!(ChromaStore::new("http://localhost:8000", "  ").is_err());
    }

    #[test]
    fn metadata_round_trips_record_fields() {
        let record = ChunkRecord {
            id: "c1".to_string(),
            ordinal: 2,
            total_chunks: 5,
            text: "body".to_string(),
            source_title: "Title A".to_string(),
            source_tag: "upload".to_string(),
            created_at: Utc::now(),
        };
        let meta = ChunkMetadata::from(&record);
        let rebuilt = meta.into_record("c1".to_string(), "body".to_string());
        assert_eq!(rebuilt.ordinal, 2);
        assert_eq!(rebuilt.total_chunks, 5);
        assert_eq!(rebuilt.source_title, "Title A");
        assert_eq!(rebuilt.source_tag, "upload");
    }
}
