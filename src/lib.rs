//! chatrelay - A minimal HTTP relay between a chat UI and interchangeable LLM providers.

pub mod config;
pub mod handlers;
pub mod llm;
pub mod response;
pub mod server;
pub mod setup;
