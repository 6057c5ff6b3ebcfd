//! OpenAI provider: chat completions plus a real moderation endpoint.

use async_trait::async_trait;
use reqwest::Client;

use super::error::LLMError;
use super::provider::LLMProvider;
use super::types::{ChatRequest, ChatResponse, ModerationResult};

pub struct OpenAIProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAIProvider {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(LLMError::Api { status, message });
        }

        Ok(response.json().await?)
    }

    async fn moderate(&self, text: &str) -> Result<ModerationResult, LLMError> {
        let url = format!("{}/moderations", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&ModerationRequest { input: text })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(LLMError::Api { status, message });
        }

        let body: ModerationResponse = response.json().await?;
        let Some(first) = body.results.into_iter().next() else {
            // An empty result set is a malformed backend response.
            return Err(LLMError::Api {
                status: 200,
                message: "moderation response contained no results".to_string(),
            });
        };

        Ok(ModerationResult {
            flagged: first.flagged,
            supported: true,
            detail: Some(first.categories),
        })
    }

    fn supports_moderation(&self) -> bool {
        true
    }
}

// --- Moderation wire types ---

#[derive(serde::Serialize)]
struct ModerationRequest<'a> {
    input: &'a str,
}

#[derive(serde::Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationEntry>,
}

#[derive(serde::Deserialize)]
struct ModerationEntry {
    flagged: bool,
    #[serde(default)]
    categories: serde_json::Value,
}
