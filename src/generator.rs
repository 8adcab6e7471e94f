//! Generation seam and the Gemini `generateContent` client.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::RagError;

/// Fixed reply returned by the lenient path when generation fails outright.
pub const GENERATOR_FALLBACK: &str = "The language model is currently unavailable.";

/// Turns a prompt into generated text.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generates text, propagating remote failure as
    /// [`RagError::Generation`]. Used by programmatic callers that must not
    /// receive a fabricated answer.
    async fn generate_checked(&self, prompt: &str) -> Result<String, RagError>;

    /// Lenient variant for conversational callers: on total failure the
    /// fixed [`GENERATOR_FALLBACK`] string is returned instead of an error.
    async fn generate(&self, prompt: &str) -> String {
        match self.generate_checked(prompt).await {
            Ok(answer) => answer,
            Err(err) => {
                error!(%err, "generation failed, returning fallback answer");
                GENERATOR_FALLBACK.to_string()
            }
        }
    }
}

/// Gemini text generation client (`generateContent`, `x-goog-api-key` auth).
pub struct GeminiGenerator {
    client: reqwest::Client,
    endpoint: String,
}

impl GeminiGenerator {
    /// Builds a client for the given endpoint, e.g.
    /// `https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent`.
    pub fn new(api_key: String, endpoint: String, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Gemini API key");
        anyhow::ensure!(
            endpoint.starts_with("http://") || endpoint.starts_with("https://"),
            "generation endpoint must be an http(s) URL"
        );
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(api_key.trim()).context("invalid Gemini API key")?,
        );
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate_checked(&self, prompt: &str) -> Result<String, RagError> {
        info!("calling Gemini generation API");
        let request = GenerateRequest::from_text(prompt);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(generation_err)?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(RagError::Generation(format!(
                "Gemini generation request failed ({status}): {body}"
            )));
        }

        let parsed: GenerateResponse = response.json().await.map_err(generation_err)?;
        Ok(parsed.extract_text())
    }
}

fn generation_err(err: reqwest::Error) -> RagError {
    if err.is_timeout() {
        RagError::Generation(format!("generation request timed out: {err}"))
    } else {
        RagError::Generation(err.to_string())
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<GenerateContent<'a>>,
}

#[derive(Debug, Serialize)]
struct GenerateContent<'a> {
    parts: Vec<GeneratePart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeneratePart<'a> {
    text: &'a str,
}

impl<'a> GenerateRequest<'a> {
    fn from_text(text: &'a str) -> Self {
        Self {
            contents: vec![GenerateContent {
                parts: vec![GeneratePart { text }],
            }],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    /// First candidate's first part, or a fixed placeholder when the
    /// response carried no text.
    fn extract_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text)
            .unwrap_or_else(|| "No response generated".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_text_takes_first_candidate_part() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"hello"},{"text":"ignored"}],"role":"model"}}]}"#,
        )
        .unwrap();
        assert_eq!(response.extract_text(), "hello");
    }

    #[test]
    fn extract_text_handles_empty_response() {
        let response: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response.extract_text(), "No response generated");
    }

    #[test]
    fn request_payload_nests_contents_parts() {
        let request = GenerateRequest::from_text("prompt here");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "prompt here");
    }
}
