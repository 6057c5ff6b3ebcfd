//! LLM provider adapters for chat completions and content moderation.

mod error;
mod groq;
mod ollama;
mod openai;
mod provider;
mod registry;
mod types;

pub use error::LLMError;
pub use groq::GroqProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;
pub use provider::{LLMProvider, ProviderKind, UnknownProvider};
pub use registry::{ProviderRegistry, SelectionError};
pub use types::{ChatRequest, ChatResponse, Message, ModerationResult, Role};
