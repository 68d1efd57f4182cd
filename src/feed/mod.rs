pub mod fetcher;
pub mod parser;
pub mod service;
pub mod text;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Spoken in place of a missing entry title.
pub const UNKNOWN_TITLE: &str = "Ummm. I'm not sure the title.";

/// Anything that can produce a parsed feed for a URL.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_feed(&self, url: &str) -> Result<ParsedFeed>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedFeed {
    pub title: String,
    pub description: Option<String>,
    pub link: Option<String>,
    pub last_build_date: Option<DateTime<Utc>>,
    pub entries: Vec<ParsedEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedEntry {
    pub title: Option<String>,
    pub link: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub guid: Option<String>,
    pub categories: Vec<String>,
}

impl ParsedFeed {
    /// The leading entries that are eligible for summarizing
    pub fn first_entries(&self, limit: usize) -> &[ParsedEntry] {
        &self.entries[..self.entries.len().min(limit)]
    }
}

impl ParsedEntry {
    pub fn display_title(&self) -> &str {
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title,
            _ => UNKNOWN_TITLE,
        }
    }

    /// Raw (possibly HTML) body: the summary, falling back to full content.
    pub fn body(&self) -> Option<&str> {
        self.summary
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.content.as_deref().filter(|c| !c.trim().is_empty()))
    }
}
