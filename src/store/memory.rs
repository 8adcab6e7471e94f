//! Brute-force in-memory vector store.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::RagError;
use crate::similarity::cosine_similarity;
use crate::store::{EmbeddedChunk, ScoredChunk, VectorStore};

/// Exact-search vector store holding every chunk in process memory.
///
/// Search compares the query against every stored vector, O(N * D) per
/// query with O(N) scratch space for scores. That is the scalability
/// ceiling by design: this store exists for demonstration-scale corpora,
/// and a production-scale index is an external collaborator.
///
/// The embedding dimensionality is pinned by the first upsert; any later
/// vector with a different length is rejected. A reader never observes a
/// partially applied write: the collection and its pinned dimensionality
/// sit behind a single read-write lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    dims: Option<usize>,
    entries: Vec<EmbeddedChunk>,
}

impl MemoryStore {
    /// Creates an empty store. Dimensionality is established on first write.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn upsert(&self, items: Vec<EmbeddedChunk>) -> Result<(), RagError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.write().await;
        let expected = inner.dims.unwrap_or(items[0].embedding.len());
        for item in &items {
            if item.embedding.len() != expected {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: item.embedding.len(),
                });
            }
        }

        inner.dims = Some(expected);
        for item in items {
            // Replace in place to keep the original insertion position for
            // tie-breaking; append otherwise.
            match inner.entries.iter_mut().find(|e| e.chunk.id == item.chunk.id) {
                Some(existing) => *existing = item,
                None => inner.entries.push(item),
            }
        }
        debug!(total = inner.entries.len(), "memory store upsert complete");
        Ok(())
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>, RagError> {
        if top_k < 1 {
            return Err(RagError::Validation("top_k must be at least 1".into()));
        }

        let inner = self.inner.read().await;
        if inner.entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored = Vec::with_capacity(inner.entries.len());
        for entry in inner.entries.iter() {
            let score = cosine_similarity(query, &entry.embedding)?;
            scored.push(ScoredChunk {
                chunk: entry.chunk.clone(),
                score,
            });
        }
        // Stable sort keeps equal scores in insertion order.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn count(&self) -> Result<usize, RagError> {
        Ok(self.inner.read().await.entries.len())
    }

    async fn delete(&self, id: &str) -> Result<bool, RagError> {
        let mut inner = self.inner.write().await;
        let before = inner.entries.len();
        inner.entries.retain(|e| e.chunk.id != id);
        Ok(inner.entries.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChunkRecord;
    use chrono::Utc;

    fn chunk(id: &str, title: &str, embedding: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: ChunkRecord {
                id: id.to_string(),
                ordinal: 0,
                total_chunks: 1,
                text: format!("text for {id}"),
                source_title: title.to_string(),
                source_tag: "test".to_string(),
                created_at: Utc::now(),
            },
            embedding,
        }
    }

    #[tokio::test]
    async fn empty_store_returns_no_results() {
        let store = MemoryStore::new();
        let results = store.search(&[1.0, 0.0], 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn search_ranks_by_similarity() {
        let store = MemoryStore::new();
        store
            .upsert(vec![
                chunk("a", "A", vec![1.0, 0.0, 0.0]),
                chunk("b", "B", vec![0.0, 1.0, 0.0]),
                chunk("c", "C", vec![0.9, 0.1, 0.0]),
            ])
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.id, "a");
        assert_eq!(results[1].chunk.id, "c");
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn search_never_exceeds_top_k() {
        let store = MemoryStore::new();
        let items: Vec<_> = (0..10)
            .map(|i| chunk(&format!("id{i}"), "T", vec![1.0, i as f32]))
            .collect();
        store.upsert(items).await.unwrap();

        let results = store.search(&[1.0, 1.0], 3).await.unwrap();
        assert_eq!(results.len(), 3);
        let results = store.search(&[1.0, 1.0], 50).await.unwrap();
        assert_eq!(results.len(), 10);
    }

    #[tokio::test]
    async fn equal_scores_break_ties_by_insertion_order() {
        let store = MemoryStore::new();
        // Identical vectors: every score ties.
        store
            .upsert(vec![
                chunk("first", "T", vec![1.0, 1.0]),
                chunk("second", "T", vec![1.0, 1.0]),
                chunk("third", "T", vec![1.0, 1.0]),
            ])
            .await
            .unwrap();

        let results = store.search(&[1.0, 1.0], 3).await.unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn top_k_of_zero_is_rejected() {
        let store = MemoryStore::new();
        match store.search(&[1.0], 0).await {
            Err(RagError::Validation(_)) => {}
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mismatched_upsert_dimension_commits_nothing() {
        let store = MemoryStore::new();
        store
            .upsert(vec![chunk("a", "A", vec![1.0, 0.0])])
            .await
            .unwrap();

        let result = store
            .upsert(vec![
                chunk("b", "B", vec![0.0, 1.0]),
                chunk("c", "C", vec![0.0, 1.0, 2.0]),
            ])
            .await;
        match result {
            Err(RagError::DimensionMismatch { expected, actual }) => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 3);
            }
            other => panic!("expected dimension mismatch, got {other:?}"),
        }
        // The whole batch was rejected, including the well-formed record.
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn upsert_replaces_existing_id_in_place() {
        let store = MemoryStore::new();
        store
            .upsert(vec![
                chunk("a", "Old", vec![1.0, 0.0]),
                chunk("b", "B", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        store
            .upsert(vec![chunk("a", "New", vec![1.0, 0.0])])
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        let results = store.search(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(results[0].chunk.source_title, "New");
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let store = MemoryStore::new();
        store
            .upsert(vec![chunk("a", "A", vec![1.0, 0.0])])
            .await
            .unwrap();

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
