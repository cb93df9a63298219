use async_trait::async_trait;
use post_ingestor::{
    ContentFetcher, EnrichedRecord, EnrichmentStrategy, EntryCandidate, FeedReader, FetchConfig,
    Fetcher, HttpContentFetcher, IngestConfig, IngestError, IngestionPipeline, MemoryPostStore,
    MockLlmAdapter, PostStore, Result, Source,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

const ACME_FEED: &str = "https://acme.dev/feed.xml";
const GLOBEX_FEED: &str = "https://globex.io/rss";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

fn candidate(title: &str, link: &str, published: &str, description: &str) -> EntryCandidate {
    EntryCandidate {
        title: Some(title.to_string()),
        link: Some(link.to_string()),
        published: Some(published.to_string()),
        description: Some(description.to_string()),
    }
}

/// Serves fixed entries per feed URL; unknown feeds are unreachable.
#[derive(Default)]
struct StaticFeeds {
    feeds: HashMap<String, Vec<EntryCandidate>>,
}

impl StaticFeeds {
    fn with(mut self, feed_url: &str, entries: Vec<EntryCandidate>) -> Self {
        self.feeds.insert(feed_url.to_string(), entries);
        self
    }
}

#[async_trait]
impl FeedReader for StaticFeeds {
    async fn read(&self, feed_url: &str) -> Result<Vec<EntryCandidate>> {
        self.feeds
            .get(feed_url)
            .cloned()
            .ok_or_else(|| IngestError::Status {
                status: 503,
                url: feed_url.to_string(),
            })
    }
}

/// Article bodies by link. Links without a page go to `live` when set.
#[derive(Default)]
struct StaticContent {
    pages: HashMap<String, String>,
    live: Option<HttpContentFetcher>,
    requests: AtomicUsize,
}

#[async_trait]
impl ContentFetcher for StaticContent {
    async fn fetch(&self, url: &str) -> String {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if let Some(page) = self.pages.get(url) {
            return page.clone();
        }
        match &self.live {
            Some(live) => live.fetch(url).await,
            None => String::new(),
        }
    }
}

/// Memory store whose lookups and inserts can be switched off.
struct FlakyStore {
    inner: MemoryPostStore,
    down: AtomicBool,
    failing_links: HashSet<String>,
}

impl FlakyStore {
    fn new(sources: Vec<Source>) -> Self {
        Self {
            inner: MemoryPostStore::new(sources),
            down: AtomicBool::new(false),
            failing_links: HashSet::new(),
        }
    }

    fn check(&self, link: &str) -> Result<()> {
        if self.down.load(Ordering::SeqCst) || self.failing_links.contains(link) {
            return Err(IngestError::General("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PostStore for FlakyStore {
    async fn list_sources(&self) -> Result<Vec<Source>> {
        self.inner.list_sources().await
    }

    async fn exists(&self, link: &str) -> Result<bool> {
        self.check(link)?;
        self.inner.exists(link).await
    }

    async fn insert(&self, record: &EnrichedRecord) -> Result<bool> {
        self.check(&record.link)?;
        self.inner.insert(record).await
    }
}

fn acme_entries() -> Vec<EntryCandidate> {
    vec![
        candidate(
            "Scaling Postgres",
            "https://acme.dev/blog/scaling-postgres",
            "2023-07-06T19:00:51Z",
            "<p>How we sharded <b>everything</b>. It took a year.</p>",
        ),
        candidate(
            "Rust at Acme",
            "https://acme.dev/blog/rust",
            "Tue, 20 Jun 2023 00:00:00 GMT",
            "Why we rewrote the ingest path.",
        ),
    ]
}

fn acme_content() -> StaticContent {
    let mut content = StaticContent::default();
    content.pages.insert(
        "https://acme.dev/blog/scaling-postgres".to_string(),
        "We split the posts table by tenant.".to_string(),
    );
    content.pages.insert(
        "https://acme.dev/blog/rust".to_string(),
        "The ingest path is now a single binary.".to_string(),
    );
    content
}

#[tokio::test]
async fn test_end_to_end_ingestion_is_idempotent() -> Result<()> {
    init_tracing();

    let store = Arc::new(MemoryPostStore::new(vec![Source::new("Acme", ACME_FEED)]));
    let mock = Arc::new(MockLlmAdapter::new(
        r#"{"summary": "Acme engineering post.", "tags": ["postgres", "rust"]}"#,
    ));
    let pipeline = IngestionPipeline::new(
        Arc::new(StaticFeeds::default().with(ACME_FEED, acme_entries())),
        Arc::new(acme_content()),
        mock.clone(),
        store.clone(),
        IngestConfig::default(),
    );

    let stats = pipeline.run().await?;
    info!("First run: {:?}", stats);

    assert_eq!(stats.sources_total, 1);
    assert_eq!(stats.sources_processed, 1);
    assert_eq!(stats.inserted, 2);
    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.degraded, 0);
    assert!(stats.finished_at.is_some());
    assert_eq!(mock.call_count(), 2);

    let record = store
        .record_for("https://acme.dev/blog/scaling-postgres")
        .await
        .unwrap();
    assert_eq!(record.published_at, "2023-07-06");
    assert_eq!(record.company, "Acme");
    assert_eq!(record.title, "Scaling Postgres");
    assert_eq!(record.description, "How we sharded everything. It took a year.");
    assert_eq!(record.full_text, "We split the posts table by tenant.");
    assert_eq!(record.summary, "Acme engineering post.");
    assert_eq!(record.tags, vec!["postgres", "rust"]);

    let rust = store.record_for("https://acme.dev/blog/rust").await.unwrap();
    assert_eq!(rust.published_at, "2023-06-20");

    // Nothing new the second time round, and no generation calls either.
    let stats = pipeline.run().await?;
    assert_eq!(stats.inserted, 0);
    assert_eq!(stats.skipped, 2);
    assert_eq!(mock.call_count(), 2);
    assert_eq!(store.records().await.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_generation_failure_stores_degraded_summary() -> Result<()> {
    init_tracing();

    let store = Arc::new(MemoryPostStore::new(vec![Source::new("Acme", ACME_FEED)]));
    let pipeline = IngestionPipeline::new(
        Arc::new(StaticFeeds::default().with(ACME_FEED, acme_entries())),
        Arc::new(acme_content()),
        Arc::new(MockLlmAdapter::failing("quota exceeded")),
        store.clone(),
        IngestConfig::default(),
    );

    let stats = pipeline.run().await?;

    assert_eq!(stats.inserted, 2);
    assert_eq!(stats.degraded, 2);
    assert_eq!(stats.failed, 0);

    let record = store.record_for("https://acme.dev/blog/rust").await.unwrap();
    assert_eq!(record.summary, "Why we rewrote the ingest path.");
    assert!(record.tags.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failed_content_fetch_only_affects_that_entry() -> Result<()> {
    init_tracing();

    // Nothing listens on port 1, so the real fetcher fails for this link.
    let unreachable = "http://127.0.0.1:1/blog/scaling-postgres";
    let mut entries = acme_entries();
    entries[0].link = Some(unreachable.to_string());

    let fetcher = Fetcher::new(FetchConfig {
        timeout_seconds: 5,
        max_retries: 0,
        ..FetchConfig::default()
    })?;
    let mut content = acme_content();
    content.live = Some(HttpContentFetcher::new(Arc::new(fetcher)));

    let store = Arc::new(MemoryPostStore::new(vec![Source::new("Acme", ACME_FEED)]));
    let mock = Arc::new(MockLlmAdapter::default());
    let pipeline = IngestionPipeline::new(
        Arc::new(StaticFeeds::default().with(ACME_FEED, entries)),
        Arc::new(content),
        mock.clone(),
        store.clone(),
        IngestConfig::default(),
    );

    let stats = pipeline.run().await?;
    assert_eq!(stats.inserted, 2);
    assert_eq!(stats.failed, 0);

    let broken = store.record_for(unreachable).await.unwrap();
    assert_eq!(broken.full_text, "");
    assert_eq!(broken.summary, "Mock summary.");

    let fine = store.record_for("https://acme.dev/blog/rust").await.unwrap();
    assert_eq!(fine.full_text, "The ingest path is now a single binary.");
    Ok(())
}

#[tokio::test]
async fn test_bad_entries_are_discarded_and_run_continues() -> Result<()> {
    init_tracing();

    let entries = vec![
        candidate("Undatable", "https://acme.dev/blog/odd", "July 6th, 2023", "d"),
        EntryCandidate {
            title: None,
            link: Some("https://acme.dev/blog/untitled".to_string()),
            published: Some("2023-07-06T19:00:51Z".to_string()),
            description: None,
        },
        candidate("Good", "https://acme.dev/blog/good", "2023-09-13T00:00:00+00:00", "d"),
    ];

    let store = Arc::new(MemoryPostStore::new(vec![Source::new("Acme", ACME_FEED)]));
    let content = Arc::new(StaticContent::default());
    let mock = Arc::new(MockLlmAdapter::default());
    let pipeline = IngestionPipeline::new(
        Arc::new(StaticFeeds::default().with(ACME_FEED, entries)),
        content.clone(),
        mock.clone(),
        store.clone(),
        IngestConfig::default(),
    );

    let stats = pipeline.run().await?;

    assert_eq!(stats.entries_seen, 3);
    assert_eq!(stats.discarded, 2);
    assert_eq!(stats.inserted, 1);
    // Discarded entries never reach the fetcher or the generator.
    assert_eq!(content.requests.load(Ordering::SeqCst), 1);
    assert_eq!(mock.call_count(), 1);

    let good = store.record_for("https://acme.dev/blog/good").await.unwrap();
    assert_eq!(good.published_at, "2023-09-13");
    assert!(store.record_for("https://acme.dev/blog/odd").await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_unreachable_feed_does_not_stop_other_sources() -> Result<()> {
    init_tracing();

    let store = Arc::new(MemoryPostStore::new(vec![
        Source::new("Globex", GLOBEX_FEED),
        Source::new("Acme", ACME_FEED),
    ]));
    let pipeline = IngestionPipeline::new(
        Arc::new(StaticFeeds::default().with(ACME_FEED, acme_entries())),
        Arc::new(acme_content()),
        Arc::new(MockLlmAdapter::default()),
        store.clone(),
        IngestConfig::default(),
    );

    let stats = pipeline.run().await?;

    assert_eq!(stats.sources_total, 2);
    assert_eq!(stats.sources_failed, 1);
    assert_eq!(stats.sources_processed, 1);
    assert_eq!(stats.inserted, 2);
    Ok(())
}

#[tokio::test]
async fn test_single_store_failure_is_isolated() -> Result<()> {
    init_tracing();

    let mut store = FlakyStore::new(vec![Source::new("Acme", ACME_FEED)]);
    store
        .failing_links
        .insert("https://acme.dev/blog/scaling-postgres".to_string());
    let store = Arc::new(store);

    let pipeline = IngestionPipeline::new(
        Arc::new(StaticFeeds::default().with(ACME_FEED, acme_entries())),
        Arc::new(acme_content()),
        Arc::new(MockLlmAdapter::default()),
        store.clone(),
        IngestConfig::default(),
    );

    let stats = pipeline.run().await?;

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.store_failures, 1);
    assert_eq!(stats.inserted, 1);
    assert!(store.inner.record_for("https://acme.dev/blog/rust").await.is_some());
    Ok(())
}

#[tokio::test]
async fn test_store_outage_aborts_run() {
    init_tracing();

    let entries: Vec<EntryCandidate> = (0..10)
        .map(|i| {
            candidate(
                &format!("Post {}", i),
                &format!("https://acme.dev/blog/{}", i),
                "2023-07-06T19:00:51Z",
                "d",
            )
        })
        .collect();

    let store = Arc::new(FlakyStore::new(vec![
        Source::new("Acme", ACME_FEED),
        Source::new("Globex", GLOBEX_FEED),
    ]));
    store.down.store(true, Ordering::SeqCst);

    let mock = Arc::new(MockLlmAdapter::default());
    let config = IngestConfig {
        max_consecutive_store_failures: 3,
        ..IngestConfig::default()
    };
    let pipeline = IngestionPipeline::new(
        Arc::new(StaticFeeds::default().with(ACME_FEED, entries)),
        Arc::new(StaticContent::default()),
        mock.clone(),
        store,
        config,
    );

    match pipeline.run().await {
        Err(IngestError::StoreUnavailable {
            failures,
            last_error,
            stats,
        }) => {
            assert_eq!(failures, 3);
            assert!(last_error.contains("connection refused"));

            // The counters of the aborted run come back with the error.
            assert_eq!(stats.sources_total, 2);
            assert_eq!(stats.sources_processed, 0);
            assert_eq!(stats.entries_seen, 3);
            assert_eq!(stats.failed, 3);
            assert_eq!(stats.store_failures, 3);
            assert_eq!(stats.inserted, 0);
            assert!(stats.finished_at.is_some());
        }
        other => panic!("expected the run to abort, got {:?}", other),
    }
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_summary_strategy_keeps_tags_empty() -> Result<()> {
    init_tracing();

    let store = Arc::new(MemoryPostStore::new(vec![Source::new("Acme", ACME_FEED)]));
    let mock = Arc::new(MockLlmAdapter::new(r#"{"summary": "Short.", "tags": ["x"]}"#));
    let config = IngestConfig {
        strategy: EnrichmentStrategy::Summary,
        ..IngestConfig::default()
    };
    let pipeline = IngestionPipeline::new(
        Arc::new(StaticFeeds::default().with(ACME_FEED, acme_entries())),
        Arc::new(acme_content()),
        mock.clone(),
        store.clone(),
        config,
    );

    pipeline.run().await?;

    let record = store.record_for("https://acme.dev/blog/rust").await.unwrap();
    assert_eq!(record.summary, "Short.");
    assert!(record.tags.is_empty());

    let prompt = &mock.last_request().unwrap().messages[1].content;
    assert!(prompt.contains("Why we rewrote the ingest path."));
    Ok(())
}

#[tokio::test]
async fn test_raw_descriptions_are_kept_when_cleaning_is_off() -> Result<()> {
    init_tracing();

    let store = Arc::new(MemoryPostStore::new(vec![Source::new("Acme", ACME_FEED)]));
    let config = IngestConfig {
        clean_descriptions: false,
        ..IngestConfig::default()
    };
    let pipeline = IngestionPipeline::new(
        Arc::new(StaticFeeds::default().with(ACME_FEED, acme_entries())),
        Arc::new(acme_content()),
        Arc::new(MockLlmAdapter::default()),
        store.clone(),
        config,
    );

    pipeline.run().await?;

    let record = store
        .record_for("https://acme.dev/blog/scaling-postgres")
        .await
        .unwrap();
    assert_eq!(
        record.description,
        "<p>How we sharded <b>everything</b>. It took a year.</p>"
    );
    Ok(())
}
