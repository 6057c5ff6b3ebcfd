use std::io::ErrorKind;
use std::path::Path;

use tokio::fs;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::ProviderKind;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    /// Shared secret clients must present as `Authorization: Bearer <token>`.
    /// Required to serve; `chatrelay init` writes one on first run.
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_provider")]
    pub default_provider: ProviderKindName,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default)]
    pub moderation: ModerationConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth_token: None,
            default_provider: default_provider(),
            system_prompt: default_system_prompt(),
            moderation: ModerationConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Ok(serde_saphyr::from_str(&contents)?)
    }

    /// Environment variables take precedence over file values.
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("CHATRELAY_AUTH_TOKEN") {
            self.auth_token = Some(token);
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.providers.openai.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("GROQ_API_KEY") {
            self.providers.groq.api_key = Some(key);
        }
    }
}

/// Provider identifier as written in the config file.
///
/// Kept as a newtype over [`ProviderKind`] so an unknown name fails at parse
/// time with the kind's own error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProviderKindName(pub ProviderKind);

impl TryFrom<String> for ProviderKindName {
    type Error = crate::llm::UnknownProvider;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse().map(ProviderKindName)
    }
}

impl From<ProviderKindName> for String {
    fn from(name: ProviderKindName) -> Self {
        name.0.to_string()
    }
}

fn default_provider() -> ProviderKindName {
    ProviderKindName(ProviderKind::OpenAI)
}

fn default_system_prompt() -> String {
    "You are a friendly and helpful AI assistant.".to_string()
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    300
}

// ============================================================================
// ModerationConfig
// ============================================================================

/// Toggles for content screening around the completion call.
#[derive(Debug, Default, Deserialize)]
pub struct ModerationConfig {
    /// Moderate the latest user message before calling the provider.
    #[serde(default)]
    pub before: bool,
    /// Moderate the assistant reply before returning it.
    #[serde(default)]
    pub after: bool,
}

// ============================================================================
// ProvidersConfig
// ============================================================================

/// Per-provider connection settings. Read-only after startup.
///
/// Every field has a default so a config file can set just an API key.
#[derive(Debug, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: OpenAIConfig,
    #[serde(default)]
    pub groq: GroqConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIConfig {
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            model: default_openai_model(),
            base_url: default_openai_base_url(),
            api_key: None,
        }
    }
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

#[derive(Debug, Deserialize)]
pub struct GroqConfig {
    #[serde(default = "default_groq_model")]
    pub model: String,
    #[serde(default = "default_groq_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for GroqConfig {
    fn default() -> Self {
        Self {
            model: default_groq_model(),
            base_url: default_groq_base_url(),
            api_key: None,
        }
    }
}

fn default_groq_model() -> String {
    "llama3-8b-8192".to_string()
}

fn default_groq_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

#[derive(Debug, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_model")]
    pub model: String,
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            model: default_ollama_model(),
            base_url: default_ollama_base_url(),
        }
    }
}

fn default_ollama_model() -> String {
    "llama3".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),
}

// ============================================================================
// Tests
// ============================================================================
