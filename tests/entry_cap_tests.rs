use async_trait::async_trait;
use paperbot::config::FeedCategory;
use paperbot::feed::parser::FeedParser;
use paperbot::feed::service::FeedService;
use paperbot::feed::text::TextCleaner;
use paperbot::feed::{FeedSource, ParsedFeed};
use paperbot::news::NewsDesk;
use paperbot::speech::ConsoleAnnouncer;
use paperbot::storage::CacheSession;
use paperbot::summarize::{ChatModel, SummaryService};
use paperbot::Result;
use proptest::prelude::*;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use test_data::numbered_rss;

/// Serves a generated feed without touching the network
struct GeneratedSource {
    items: usize,
}

#[async_trait]
impl FeedSource for GeneratedSource {
    async fn fetch_feed(&self, _url: &str) -> Result<ParsedFeed> {
        FeedParser::new().parse_feed(Cursor::new(numbered_rss(self.items)))
    }
}

struct CountingModel {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ChatModel for CountingModel {
    async fn chat(&self, _message: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("Summary.".to_string())
    }
}

fn run(items: usize, max_entries: usize) -> (usize, usize) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(CacheSession::open(dir.path(), 1024 * 1024).unwrap());
    let calls = Arc::new(AtomicUsize::new(0));

    let desk = NewsDesk::new(
        FeedService::new(Box::new(GeneratedSource { items }), cache.clone(), Duration::from_secs(60)),
        SummaryService::new(
            Box::new(CountingModel { calls: calls.clone() }),
            cache.clone(),
            "Summarize".to_string(),
            Duration::from_secs(60),
        ),
        cache,
        Arc::new(ConsoleAnnouncer),
        TextCleaner::new().unwrap(),
    )
    .with_max_entries(max_entries);

    let category = FeedCategory::new("Numbered", "https://numbered.example.com/feed.xml");
    let report = runtime.block_on(desk.fetch_and_summarize(&[category]));

    (report.summaries[0].articles.len(), calls.load(Ordering::SeqCst))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn never_more_than_five_entries_summarized(items in 0usize..40) {
        let (articles, calls) = run(items, 5);
        prop_assert_eq!(articles, items.min(5));
        prop_assert_eq!(calls, items.min(5));
    }

    #[test]
    fn configured_cap_is_respected(items in 0usize..20, cap in 1usize..10) {
        let (articles, _) = run(items, cap);
        prop_assert_eq!(articles, items.min(cap));
    }
}
