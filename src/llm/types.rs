//! Common types for LLM chat completions and moderation.

use serde::{Deserialize, Serialize};

/// A chat completion request (OpenAI-compatible format).
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
}

/// A message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat completion response.
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
}

/// A single completion choice.
#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: Message,
}

impl ChatResponse {
    /// Content of the first choice, if any.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// Outcome of a moderation check.
///
/// `supported: false` means the provider has no moderation endpoint and the
/// check was skipped. Callers must treat that as "not checked", never as
/// "content approved".
#[derive(Debug, Clone)]
pub struct ModerationResult {
    pub flagged: bool,
    pub supported: bool,
    /// Raw category detail from the backend, when available.
    pub detail: Option<serde_json::Value>,
}

impl ModerationResult {
    /// Result returned by providers without a moderation capability.
    pub fn unsupported() -> Self {
        Self {
            flagged: false,
            supported: false,
            detail: None,
        }
    }
}
