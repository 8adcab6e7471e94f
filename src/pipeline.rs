//! Document ingestion: chunk, embed, and persist in one batch.

use std::sync::Arc;

use chrono::Utc;
use futures_util::future::try_join_all;
use tracing::info;
use uuid::Uuid;

use crate::chunker::Chunker;
use crate::embedder::Embedder;
use crate::error::RagError;
use crate::store::{ChunkRecord, EmbeddedChunk, VectorStore};

/// Splits a document, embeds every chunk, and writes the batch to the
/// vector store.
pub struct IngestionPipeline {
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl IngestionPipeline {
    /// Wires a pipeline from its collaborators.
    pub fn new(chunker: Chunker, embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            chunker,
            embedder,
            store,
        }
    }

    /// Ingests one document, returning the created chunk ids in ordinal
    /// order.
    ///
    /// Chunk embeddings are requested concurrently since chunks are
    /// independent; the first failure aborts the batch and cancels the
    /// in-flight calls, and nothing is written to the store. A document
    /// that normalizes to nothing produces no chunks and no error.
    pub async fn ingest(
        &self,
        title: &str,
        content: &str,
        source: &str,
    ) -> Result<Vec<String>, RagError> {
        if title.trim().is_empty() {
            return Err(RagError::Validation("document title must not be empty".into()));
        }

        info!(%title, length = content.len(), "ingesting document");
        let chunks = self.chunker.chunk_text(content);
        if chunks.is_empty() {
            info!(%title, "document produced no chunks");
            return Ok(Vec::new());
        }
        let total_chunks = chunks.len();

        // try_join_all preserves input order, so embeddings line up with
        // their chunks by ordinal.
        let embeddings =
            try_join_all(chunks.iter().map(|chunk| self.embedder.embed(chunk))).await?;

        let created_at = Utc::now();
        let items: Vec<EmbeddedChunk> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(ordinal, (text, embedding))| EmbeddedChunk {
                chunk: ChunkRecord {
                    id: Uuid::new_v4().to_string(),
                    ordinal,
                    total_chunks,
                    text,
                    source_title: title.to_string(),
                    source_tag: source.to_string(),
                    created_at,
                },
                embedding,
            })
            .collect();
        let ids: Vec<String> = items.iter().map(|item| item.chunk.id.clone()).collect();

        self.store.upsert(items).await?;
        info!(%title, chunks = total_chunks, "document ingested");
        Ok(ids)
    }
}
