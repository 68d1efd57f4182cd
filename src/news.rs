//! The news run: fetch each category's feed, summarize its first entries, collect the results.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{Config, FeedCategory};
use crate::error::{Error, Result};
use crate::feed::fetcher::FeedFetcher;
use crate::feed::service::FeedService;
use crate::feed::text::TextCleaner;
use crate::feed::ParsedEntry;
use crate::retry::{AbandonReason, Outcome, RetryHooks, RetryPolicy};
use crate::speech::Announcer;
use crate::storage::CacheSession;
use crate::summarize::{OllamaClient, SummaryService};

pub const DEFAULT_MAX_ENTRIES: usize = 5;

/// Summaries gathered for one category, in feed order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySummaries {
    pub category: String,
    pub articles: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub summaries: Vec<CategorySummaries>,
    pub failed_categories: Vec<String>,
    pub skipped_entries: usize,
}

impl RunReport {
    pub fn article_count(&self) -> usize {
        self.summaries.iter().map(|c| c.articles.len()).sum()
    }
}

/// Spoken form of one summarized entry
pub fn format_article(title: &str, summary: &str) -> String {
    format!("\n{}\n\n{}", title, summary)
}

pub struct NewsDesk {
    feeds: FeedService,
    summaries: SummaryService,
    cache: Arc<CacheSession>,
    announcer: Arc<dyn Announcer>,
    cleaner: TextCleaner,
    policy: RetryPolicy,
    max_entries: usize,
}

impl NewsDesk {
    pub fn new(
        feeds: FeedService,
        summaries: SummaryService,
        cache: Arc<CacheSession>,
        announcer: Arc<dyn Announcer>,
        cleaner: TextCleaner,
    ) -> Self {
        Self {
            feeds,
            summaries,
            cache,
            announcer,
            cleaner,
            policy: RetryPolicy::default(),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }

    /// Wires the HTTP feed fetcher and the Ollama client from configuration.
    pub fn from_config(config: &Config, cache: Arc<CacheSession>, announcer: Arc<dyn Announcer>) -> Result<Self> {
        let fetcher = FeedFetcher::from_settings(&config.settings)?;
        let model = OllamaClient::from_config(&config.summarizer)?;

        let feeds = FeedService::new(Box::new(fetcher), cache.clone(), config.feed_ttl());
        let summaries = SummaryService::new(
            Box::new(model),
            cache.clone(),
            config.summarizer.prompt.clone(),
            config.summary_ttl(),
        );

        Ok(Self::new(feeds, summaries, cache, announcer, TextCleaner::new()?)
            .with_policy(RetryPolicy::new(config.settings.max_retries))
            .with_max_entries(config.settings.max_entries))
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Visits the categories in order. A failing feed or entry is reported and skipped.
    pub async fn fetch_and_summarize(&self, categories: &[FeedCategory]) -> RunReport {
        let mut report = RunReport::default();
        self.say("One moment while I read the news...").await;

        for category in categories {
            info!("Fetching {} from {}", category.name, category.url);

            let hooks = SpokenRepair {
                desk: self,
                trouble: format!("I seem to be having trouble reading the feed for {}.", category.name),
                diagnosing: "Let me check something. Diagnosing...",
            };
            let feed = match self.policy.run(|| self.feeds.get_feed(&category.url), &hooks).await {
                Outcome::Done { value, .. } => value,
                Outcome::Abandoned { error, attempts, .. } => {
                    error!("Giving up on {} after {} attempt(s): {}", category.name, attempts, error);
                    report.failed_categories.push(category.name.clone());
                    continue;
                }
            };

            info!("Summarizing news for {}", category.name);
            let mut articles = Vec::new();

            for entry in feed.first_entries(self.max_entries) {
                let title = entry.display_title();
                let Some(text) = self.entry_text(entry) else {
                    debug!("No text to summarize for {}", title);
                    report.skipped_entries += 1;
                    continue;
                };

                let hooks = SpokenRepair {
                    desk: self,
                    trouble: format!("I had trouble summarizing text for {}.", title),
                    diagnosing: "Let me see something. Diagnosing...",
                };
                match self.policy.run(|| self.summaries.summarize(&text), &hooks).await {
                    Outcome::Done { value, .. } => {
                        articles.push(format_article(title, &value));
                        info!("Summary added for {}", title);
                    }
                    Outcome::Abandoned { error, .. } => {
                        warn!("Skipping {}: {}", title, error);
                        report.skipped_entries += 1;
                    }
                }
            }

            report.summaries.push(CategorySummaries {
                category: category.name.clone(),
                articles,
            });
        }

        info!(
            "Run finished: {} articles, {} failed categories, {} skipped entries",
            report.article_count(),
            report.failed_categories.len(),
            report.skipped_entries
        );
        report
    }

    fn entry_text(&self, entry: &ParsedEntry) -> Option<String> {
        entry
            .body()
            .map(|body| self.cleaner.to_plain_text(body))
            .filter(|text| !text.is_empty())
    }

    /// Speech is best effort during the run.
    async fn say(&self, message: &str) {
        if let Err(e) = self.announcer.say(message).await {
            warn!("Could not speak {:?}: {}", message, e);
        }
    }

    /// Runs a fixing cache check. A failed check counts as nothing repaired.
    fn repair_cache(&self) -> bool {
        match self.cache.check(true) {
            Ok(issues) => {
                for issue in &issues {
                    info!("Cache issue: {}", issue);
                }
                !issues.is_empty()
            }
            Err(e) => {
                error!("Cache check failed: {}", e);
                false
            }
        }
    }
}

/// Narrates the retry policy through the announcer and repairs via the cache check.
struct SpokenRepair<'a> {
    desk: &'a NewsDesk,
    trouble: String,
    diagnosing: &'static str,
}

#[async_trait]
impl<'a> RetryHooks for SpokenRepair<'a> {
    async fn on_failure(&self, attempt: usize, error: &Error) {
        warn!("Attempt {} failed [{}]: {}", attempt, error.error_code(), error);
        self.desk.say(&self.trouble).await;
    }

    async fn repair(&self) -> bool {
        self.desk.say(self.diagnosing).await;
        info!("Running a check on the cache");

        let repaired = self.desk.repair_cache();
        if repaired {
            self.desk.say("There was a caching problem. I might have fixed it.").await;
        }
        repaired
    }

    async fn on_retry(&self, _attempt: usize) {
        self.desk.say("Let me try summarizing again...").await;
    }

    async fn on_abandon(&self, reason: AbandonReason, _error: &Error) {
        if reason == AbandonReason::NothingRepaired {
            self.desk.say("I couldn't find anything. Let's skip this article.").await;
        }
    }
}
