//! Retrieval-augmented question answering.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::embedder::Embedder;
use crate::error::RagError;
use crate::generator::Generator;
use crate::store::{ScoredChunk, VectorStore};

/// Fixed reply returned without calling the generator when the store has
/// nothing to retrieve.
pub const NO_DOCUMENTS_ANSWER: &str =
    "I don't have any documents to reference. Please add some documents first.";

/// Separator between context entries in the grounded prompt.
const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

/// Number of chunks retrieved per question.
const RETRIEVAL_TOP_K: usize = 3;

/// Answer plus provenance for one question.
#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    /// The generator's reply, verbatim.
    pub answer: String,
    /// Titles of the retrieved chunks in search order. Duplicates appear
    /// when multiple chunks of one document were used.
    pub sources_used: Vec<String>,
    /// Number of chunks fed to the generator as context.
    pub documents_retrieved: usize,
}

/// Answers questions by retrieving relevant chunks and grounding a single
/// generation call on them.
pub struct RagEngine {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn Generator>,
}

impl RagEngine {
    /// Wires an engine from its collaborators.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            embedder,
            store,
            generator,
        }
    }

    /// Answers `question` from stored documents.
    ///
    /// When retrieval comes back empty the fixed [`NO_DOCUMENTS_ANSWER`] is
    /// returned and the generator is never called. Embedder failure
    /// surfaces as [`RagError::Embedding`] and generator failure as
    /// [`RagError::Generation`]; no partial answer is fabricated.
    pub async fn answer(&self, question: &str) -> Result<RagAnswer, RagError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::Validation("question must not be empty".into()));
        }
        info!(%question, "RAG query");

        let embedding = self.embedder.embed(question).await?;
        let hits = self.store.search(&embedding, RETRIEVAL_TOP_K).await?;

        if hits.is_empty() {
            info!("no documents retrieved, skipping generation");
            return Ok(RagAnswer {
                answer: NO_DOCUMENTS_ANSWER.to_string(),
                sources_used: Vec::new(),
                documents_retrieved: 0,
            });
        }

        let context = render_context(&hits);
        let prompt = build_prompt(&context, question);
        let answer = self.generator.generate_checked(&prompt).await?;

        let sources_used = hits
            .iter()
            .map(|hit| hit.chunk.source_title.clone())
            .collect();
        Ok(RagAnswer {
            answer,
            sources_used,
            documents_retrieved: hits.len(),
        })
    }
}

/// Renders retrieved chunks as `Title: ...\nContent: ...` entries in search
/// order, highest similarity first.
fn render_context(hits: &[ScoredChunk]) -> String {
    hits.iter()
        .map(|hit| {
            format!(
                "Title: {}\nContent: {}",
                hit.chunk.source_title, hit.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_DELIMITER)
}

/// Builds the grounded prompt: answer only from context, admit when the
/// context is insufficient.
fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a helpful assistant. Answer the question based ONLY on the provided context.\n\
         If the context doesn't contain enough information to answer, say so.\n\
         \n\
         CONTEXT:\n\
         {context}\n\
         \n\
         QUESTION: {question}\n\
         \n\
         ANSWER:\n"
    )
}
