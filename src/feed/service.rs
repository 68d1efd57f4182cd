use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::feed::{FeedSource, ParsedFeed};
use crate::storage::CacheSession;

pub const FEED_TAG: &str = "feed";

pub fn feed_key(url: &str) -> String {
    format!("feed:{}", url)
}

/// Cache-or-network access to parsed feeds, keyed by URL
pub struct FeedService {
    source: Box<dyn FeedSource>,
    cache: Arc<CacheSession>,
    ttl: Duration,
}

impl FeedService {
    pub fn new(source: Box<dyn FeedSource>, cache: Arc<CacheSession>, ttl: Duration) -> Self {
        Self { source, cache, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached document when one is live, otherwise fetches and caches it.
    ///
    /// A cache entry that cannot be read is an error, so the caller's repair step gets
    /// a chance to run before the next attempt.
    pub async fn get_feed(&self, url: &str) -> Result<ParsedFeed> {
        let key = feed_key(url);

        if let Some(feed) = self.cache.get_json::<ParsedFeed>(&key)? {
            debug!("Using cached feed for {}", url);
            return Ok(feed);
        }

        let feed = self.source.fetch_feed(url).await?;
        info!("Fetched {} entries from {}", feed.entries.len(), url);

        if let Err(e) = self.cache.set_json(&key, &feed, Some(self.ttl), Some(FEED_TAG)) {
            warn!("Could not cache feed {}: {}", url, e);
        }

        Ok(feed)
    }
}
