//! Vector store abstraction and the records flowing through it.
//!
//! Two interchangeable implementations exist: [`memory::MemoryStore`], a
//! brute-force exact-search store for demonstration-scale corpora, and
//! [`chroma::ChromaStore`], a delegate to a remote ChromaDB instance. The
//! implementation is selected at construction time by the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RagError;

pub mod chroma;
pub mod memory;

pub use chroma::ChromaStore;
pub use memory::MemoryStore;

/// An immutable chunk of a source document plus its provenance metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Opaque unique identifier assigned at ingestion.
    pub id: String,
    /// Zero-based position of this chunk within its document.
    pub ordinal: usize,
    /// Number of chunks the document was split into.
    pub total_chunks: usize,
    /// Chunk body text.
    pub text: String,
    /// Title of the source document.
    pub source_title: String,
    /// Caller-supplied source tag (origin, collection, URL).
    pub source_tag: String,
    /// When the chunk was created.
    pub created_at: DateTime<Utc>,
}

/// A chunk paired with its embedding vector, as persisted by a store.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    /// The chunk and its metadata.
    pub chunk: ChunkRecord,
    /// Fixed-dimensionality embedding produced by the embedder.
    pub embedding: Vec<f32>,
}

/// A chunk scored against a query vector. Produced only as search output.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    /// The matching chunk.
    pub chunk: ChunkRecord,
    /// Cosine similarity in `[-1, 1]`, higher is closer.
    pub score: f64,
}

/// Storage and top-K similarity search over embedded chunks.
///
/// Mutations and reads on one store are mutually exclusive; concurrent
/// searches may proceed in parallel but never observe a half-applied
/// upsert or delete.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Writes a batch of chunks, replacing any records with matching ids.
    ///
    /// Fails with [`RagError::DimensionMismatch`] when a vector disagrees
    /// with the store's established dimensionality and with
    /// [`RagError::Storage`] when the backend is unreachable. On failure
    /// nothing from the batch is committed.
    async fn upsert(&self, items: Vec<EmbeddedChunk>) -> Result<(), RagError>;

    /// Returns up to `top_k` chunks ordered by descending similarity to
    /// `query`. An empty store yields an empty vector; `top_k < 1` is a
    /// [`RagError::Validation`]. Equal scores are broken by insertion
    /// order, earliest first.
    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>, RagError>;

    /// Number of stored chunks. Used for health and stats reporting.
    async fn count(&self) -> Result<usize, RagError>;

    /// Removes one chunk by id, reporting whether it existed.
    async fn delete(&self, id: &str) -> Result<bool, RagError>;
}
