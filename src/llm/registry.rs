//! Provider registry: maps provider identifiers to configured adapters.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use super::groq::GroqProvider;
use super::ollama::OllamaProvider;
use super::openai::OpenAIProvider;
use super::provider::{LLMProvider, ProviderKind};
use crate::config::Config;

/// Registry of provider adapters, keyed by provider kind.
///
/// Built once at startup; adapters whose required configuration is missing
/// are simply not registered, and selecting them later fails with
/// [`SelectionError::NotConfigured`].
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, ProviderEntry>,
    default: ProviderKind,
}

#[derive(Clone)]
struct ProviderEntry {
    model: String,
    adapter: Arc<dyn LLMProvider>,
}

/// A resolved provider together with the model it should be called with.
pub struct SelectedProvider {
    pub kind: ProviderKind,
    pub model: String,
    pub adapter: Arc<dyn LLMProvider>,
}

// Manual impl: the adapter trait object has no Debug bound.
impl fmt::Debug for SelectedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedProvider")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl ProviderRegistry {
    pub fn new(default: ProviderKind) -> Self {
        Self {
            providers: HashMap::new(),
            default,
        }
    }

    /// Build the registry from startup configuration.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new(config.default_provider.0);

        if let Some(ref api_key) = config.providers.openai.api_key {
            let provider = OpenAIProvider::new(
                config.providers.openai.base_url.clone(),
                api_key.clone(),
            );
            registry.register(
                ProviderKind::OpenAI,
                config.providers.openai.model.clone(),
                Arc::new(provider),
            );
            info!("Registered OpenAI provider");
        }

        if let Some(ref api_key) = config.providers.groq.api_key {
            let provider =
                GroqProvider::new(config.providers.groq.base_url.clone(), api_key.clone());
            registry.register(
                ProviderKind::Groq,
                config.providers.groq.model.clone(),
                Arc::new(provider),
            );
            info!("Registered Groq provider");
        }

        // Ollama needs no credentials, always available if running locally
        let ollama = OllamaProvider::new(config.providers.ollama.base_url.clone());
        registry.register(
            ProviderKind::Ollama,
            config.providers.ollama.model.clone(),
            Arc::new(ollama),
        );
        info!("Registered Ollama provider");

        if registry.get(ProviderKind::OpenAI).is_none() && registry.get(ProviderKind::Groq).is_none()
        {
            warn!("No hosted LLM providers configured. Set OPENAI_API_KEY or GROQ_API_KEY.");
        }

        registry
    }

    /// Register an adapter implementation.
    pub fn register(&mut self, kind: ProviderKind, model: String, adapter: Arc<dyn LLMProvider>) {
        self.providers.insert(kind, ProviderEntry { model, adapter });
    }

    fn get(&self, kind: ProviderKind) -> Option<&ProviderEntry> {
        self.providers.get(&kind)
    }

    /// Resolve a caller-supplied identifier to a configured adapter.
    ///
    /// An empty identifier resolves to the default provider.
    pub fn select(&self, identifier: &str) -> Result<SelectedProvider, SelectionError> {
        let kind = if identifier.is_empty() {
            self.default
        } else {
            identifier
                .parse::<ProviderKind>()
                .map_err(|e| SelectionError::Unknown(e.0))?
        };

        let entry = self
            .get(kind)
            .ok_or(SelectionError::NotConfigured(kind))?;

        Ok(SelectedProvider {
            kind,
            model: entry.model.clone(),
            adapter: Arc::clone(&entry.adapter),
        })
    }
}

/// Errors from resolving a provider identifier.
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("unknown provider '{0}'")]
    Unknown(String),

    #[error("provider '{0}' is not configured; set its API key")]
    NotConfigured(ProviderKind),
}
