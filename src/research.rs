//! Retrieval-free research helpers: topic overviews and summaries
//! produced by a single generation call with a fixed prompt.

use std::sync::Arc;

use tracing::info;

use crate::error::RagError;
use crate::generator::Generator;

/// Generation-only assistant for topic research and summarization.
///
/// Unlike [`crate::rag::RagEngine`] this never touches the vector store;
/// answers come from the model's own knowledge. Failures degrade to the
/// generator's fallback string rather than an error, so a flaky upstream
/// yields a readable reply instead of a 5xx.
pub struct ResearchAssistant {
    generator: Arc<dyn Generator>,
}

impl ResearchAssistant {
    /// Wraps a generator.
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Produces a structured overview of `topic`.
    pub async fn research_topic(&self, topic: &str) -> Result<String, RagError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(RagError::Validation("topic must not be empty".into()));
        }
        info!(%topic, "researching topic");
        Ok(self.generator.generate(&research_prompt(topic)).await)
    }

    /// Summarizes `content` into a handful of bullet points.
    pub async fn summarize(&self, content: &str) -> Result<String, RagError> {
        if content.trim().is_empty() {
            return Err(RagError::Validation("content must not be empty".into()));
        }
        info!(length = content.len(), "summarizing content");
        Ok(self.generator.generate(&summarize_prompt(content)).await)
    }
}

fn research_prompt(topic: &str) -> String {
    format!(
        "You are a research assistant. Provide a comprehensive but concise overview of the following topic.\n\
         \n\
         Topic: {topic}\n\
         \n\
         Please include:\n\
         1. A brief definition/explanation\n\
         2. Key concepts or components\n\
         3. Why it matters / real-world applications\n\
         4. Current trends or recent developments\n\
         \n\
         Keep the response informative but concise (around 300-400 words).\n"
    )
}

fn summarize_prompt(content: &str) -> String {
    format!(
        "Summarize the following content in a clear and concise manner.\n\
         Highlight the key points and main takeaways.\n\
         \n\
         Content:\n\
         {content}\n\
         \n\
         Provide a summary in 3-5 bullet points.\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::GENERATOR_FALLBACK;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubGenerator {
        last_prompt: Mutex<Option<String>>,
        fail: bool,
    }

    impl StubGenerator {
        fn new(fail: bool) -> Self {
            Self {
                last_prompt: Mutex::new(None),
                fail,
            }
        }
    }

    #[async_trait]
    impl Generator for StubGenerator {
        async fn generate_checked(&self, prompt: &str) -> Result<String, RagError> {
            *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
            if self.fail {
                return Err(RagError::Generation("stub generator down".into()));
            }
            Ok("stub reply".to_string())
        }
    }

    #[tokio::test]
    async fn research_prompt_embeds_topic_verbatim() {
        let generator = Arc::new(StubGenerator::new(false));
        let assistant = ResearchAssistant::new(generator.clone());

        let reply = assistant.research_topic("vector databases").await.unwrap();
        assert_eq!(reply, "stub reply");
        let prompt = generator.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("Topic: vector databases"));
        assert!(prompt.contains("research assistant"));
    }

    #[tokio::test]
    async fn summarize_prompt_embeds_content_verbatim() {
        let generator = Arc::new(StubGenerator::new(false));
        let assistant = ResearchAssistant::new(generator.clone());

        assistant.summarize("Long article body.").await.unwrap();
        let prompt = generator.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("Content:\nLong article body."));
        assert!(prompt.contains("3-5 bullet points"));
    }

    #[tokio::test]
    async fn generation_failure_degrades_to_fallback_text() {
        let assistant = ResearchAssistant::new(Arc::new(StubGenerator::new(true)));
        let reply = assistant.research_topic("anything").await.unwrap();
        assert_eq!(reply, GENERATOR_FALLBACK);
    }

    #[tokio::test]
    async fn blank_inputs_are_rejected() {
        let assistant = ResearchAssistant::new(Arc::new(StubGenerator::new(false)));
        assert!(matches!(
            assistant.research_topic(" ").await,
            Err(RagError::Validation(_))
        ));
        assert!(matches!(
            assistant.summarize("").await,
            Err(RagError::Validation(_))
        ));
    }
}
