use crate::feed::{ParsedFeed, ParsedEntry};
use crate::error::{Error, Result};
use feed_rs::parser as feed_parser;
use std::io::BufRead;

#[derive(Debug, Default, Clone, Copy)]
pub struct FeedParser;

impl FeedParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_feed<R: BufRead>(&self, reader: R) -> Result<ParsedFeed> {
        let feed = feed_parser::parse(reader)
            .map_err(|e| Error::FeedParse(format!("Failed to parse feed: {}", e)))?;

        let title = feed.title.map(|t| t.content).unwrap_or_else(|| "Untitled Feed".to_string());
        let description = feed.description.map(|d| d.content);
        let link = feed.links.first().map(|l| l.href.clone());
        let last_build_date = feed.updated.or(feed.published);

        let entries = feed
            .entries
            .into_iter()
            .map(|entry| ParsedEntry {
                title: entry.title.map(|t| t.content),
                link: entry.links.first().map(|l| l.href.clone()).unwrap_or_default(),
                summary: entry.summary.map(|s| s.content),
                content: entry.content.and_then(|c| c.body),
                author: entry.authors.first().map(|a| a.name.clone()),
                published: entry.published.or(entry.updated),
                guid: Some(entry.id),
                categories: entry.categories.into_iter().map(|c| c.term).collect(),
            })
            .collect();

        Ok(ParsedFeed {
            title,
            description,
            link,
            last_build_date,
            entries,
        })
    }

    pub fn validate_feed_url(&self, url: &str) -> Result<()> {
        let parsed_url = url::Url::parse(url)
            .map_err(|e| Error::InvalidUrl(format!("Invalid URL: {}", e)))?;

        match parsed_url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(Error::InvalidUrl(format!("Unsupported scheme: {}", scheme))),
        }
    }
}
