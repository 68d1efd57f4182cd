//! Entry summarization through a chat-style language model.

pub mod ollama;
pub mod service;

use async_trait::async_trait;

use crate::error::Result;

pub use ollama::OllamaClient;
pub use service::{summary_key, SummaryService, SUMMARY_TAG};

/// A model that answers a single user message.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, message: &str) -> Result<String>;
}
