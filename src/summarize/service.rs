use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::Result;
use crate::storage::CacheSession;
use crate::summarize::ChatModel;

pub const SUMMARY_TAG: &str = "summary";

/// Cache key for a (text, prompt) pair. A changed prompt yields a different key.
pub fn summary_key(text: &str, prompt: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(text.as_bytes());
    hasher.update(&[0]);
    hasher.update(prompt.as_bytes());
    format!("summary:{}", hasher.finalize().to_hex())
}

pub struct SummaryService {
    model: Box<dyn ChatModel>,
    cache: Arc<CacheSession>,
    prompt: String,
    ttl: Duration,
}

impl SummaryService {
    pub fn new(model: Box<dyn ChatModel>, cache: Arc<CacheSession>, prompt: String, ttl: Duration) -> Self {
        Self { model, cache, prompt, ttl }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub async fn summarize(&self, text: &str) -> Result<String> {
        self.summarize_with(text, &self.prompt).await
    }

    pub async fn summarize_with(&self, text: &str, prompt: &str) -> Result<String> {
        let key = summary_key(text, prompt);

        if let Some(summary) = self.cache.get_json::<String>(&key)? {
            debug!("Using cached summary {}", key);
            return Ok(summary);
        }

        let summary = self.model.chat(&format!("{}:{}", prompt, text)).await?;

        if let Err(e) = self.cache.set_json(&key, &summary, Some(self.ttl), Some(SUMMARY_TAG)) {
            warn!("Could not cache summary {}: {}", key, e);
        }

        Ok(summary)
    }
}
