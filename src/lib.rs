#![warn(missing_docs)]
//! Core library entry points for the ragline retrieval pipeline.

pub mod chunker;
pub mod embedder;
pub mod error;
pub mod generator;
pub mod pipeline;
pub mod rag;
pub mod rate_limit;
pub mod research;
mod similarity;
pub mod store;

pub use chunker::{Chunker, ChunkerConfig, ChunkingReport};
pub use embedder::{CachingEmbedder, Embedder, GeminiEmbedder};
pub use error::RagError;
pub use generator::{GeminiGenerator, Generator, GENERATOR_FALLBACK};
pub use pipeline::IngestionPipeline;
pub use rag::{RagAnswer, RagEngine, NO_DOCUMENTS_ANSWER};
pub use rate_limit::{RateLimiter, DEFAULT_MAX_REQUESTS_PER_MINUTE};
pub use research::ResearchAssistant;
pub use similarity::cosine_similarity;
pub use store::{ChromaStore, ChunkRecord, EmbeddedChunk, MemoryStore, ScoredChunk, VectorStore};
