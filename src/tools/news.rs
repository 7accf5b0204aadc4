//! News headline digest
//!
//! Asks a text model with search grounding for a short, spoken-style summary
//! of the day's top world news.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use crate::{Error, Result};

/// Default REST base for text generation
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const NEWS_PROMPT: &str = "Please provide a concise summary of the top 3-5 world news headlines \
for today. Read it as if you are a radio host starting a news segment.";

/// Produces a headline digest
#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Fetch today's digest
    ///
    /// # Errors
    ///
    /// Returns error if the collaborator fails or returns no text
    async fn headlines(&self) -> Result<String>;
}

/// Digest generated by a Gemini text model with Google Search grounding
pub struct GeminiNews {
    client: reqwest::Client,
    api_base: String,
    model: String,
    api_key: SecretString,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GeminiNews {
    /// Create a news source using `model`
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        api_base: impl Into<String>,
        model: impl Into<String>,
        api_key: SecretString,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            model: model.into(),
            api_key,
        }
    }
}

fn digest_text(response: GenerateResponse) -> Option<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[async_trait]
impl NewsSource for GeminiNews {
    async fn headlines(&self) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.api_base, self.model);
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": NEWS_PROMPT}]}],
            "tools": [{"google_search": {}}],
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Collaborator(format!("news request returned {status}: {detail}")));
        }

        let parsed: GenerateResponse = response.json().await?;
        digest_text(parsed).ok_or_else(|| Error::Collaborator("news digest was empty".to_string()))
    }
}
