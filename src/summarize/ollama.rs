//! Ollama `/api/chat` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SummarizerConfig;
use crate::error::{Error, Result};
use crate::summarize::ChatModel;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

pub struct OllamaClient {
    model: String,
    host: String,
    client: Client,
}

impl OllamaClient {
    pub fn new(model: &str, host: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::HttpError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            model: model.to_string(),
            host: host.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &SummarizerConfig) -> Result<Self> {
        Self::new(&config.model, &config.host, Duration::from_secs(config.timeout))
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatModel for OllamaClient {
    async fn chat(&self, message: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.host);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: message }],
            stream: false,
        };

        debug!("Sending {} chars to {} ({})", message.len(), url, self.model);
        let started = std::time::Instant::now();

        let resp = self.client.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(format!("Ollama request to {} timed out", url))
            } else {
                Error::HttpError(format!("Ollama request failed: {}", e))
            }
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            return Err(Error::HttpError(format!("Ollama returned {}: {}", status, detail.trim())));
        }

        let data: ChatResponse = resp
            .json()
            .await
            .map_err(|e| Error::Summarize(format!("Unexpected Ollama response: {}", e)))?;

        let content = data.message.content.trim().to_string();
        if content.is_empty() {
            return Err(Error::Summarize("Ollama returned an empty response".to_string()));
        }

        info!("Summarized {} chars → {} chars ({:.0}ms)", message.len(), content.len(), started.elapsed().as_secs_f64() * 1000.0);
        Ok(content)
    }
}
