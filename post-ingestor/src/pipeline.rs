use crate::dates;
use crate::insights::{EnrichmentInput, InsightGenerator};
use crate::rss_utils::text::clean_description;
use crate::traits::{ContentFetcher, FeedReader, PostStore, TextGenerator};
use crate::types::{
    EnrichedRecord, Enrichment, EntryCandidate, EntryOutcome, IngestConfig, IngestError, RawEntry,
    Result, RunStats, Source,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Polls every source, enriches new entries and stores them.
///
/// Work is strictly sequential: sources in store order, entries in feed
/// order. Anything that goes wrong with one entry is logged and counted, and
/// the run moves on. Only a failing source listing, or the store failing
/// `max_consecutive_store_failures` times in a row, ends the run early.
pub struct IngestionPipeline {
    feeds: Arc<dyn FeedReader>,
    content: Arc<dyn ContentFetcher>,
    insights: InsightGenerator,
    store: Arc<dyn PostStore>,
    config: IngestConfig,
}

/// Store health across a run.
#[derive(Debug, Default)]
struct StoreHealth {
    consecutive_failures: usize,
    last_error: Option<String>,
}

impl IngestionPipeline {
    pub fn new(
        feeds: Arc<dyn FeedReader>,
        content: Arc<dyn ContentFetcher>,
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn PostStore>,
        config: IngestConfig,
    ) -> Self {
        info!(
            "Building ingestion pipeline: strategy {:?}, generator {}, model {}",
            config.strategy,
            generator.name(),
            config.generator.model
        );
        let insights = InsightGenerator::new(generator, config.strategy, config.generator.clone());

        Self {
            feeds,
            content,
            insights,
            store,
            config,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// One full traversal of all sources.
    pub async fn run(&self) -> Result<RunStats> {
        let mut stats = RunStats::new();

        let sources = self.store.list_sources().await.map_err(|e| {
            error!("Could not load sources: {}", e);
            e
        })?;
        stats.sources_total = sources.len();

        info!("Run {}: parsing {} feeds", stats.run_id, sources.len());

        let mut health = StoreHealth::default();
        for (index, source) in sources.iter().enumerate() {
            info!(
                "[{}/{}] {} ({})",
                index + 1,
                sources.len(),
                source.company,
                source.feed_url
            );
            if let Err(e) = self.ingest_source(source, &mut stats, &mut health).await {
                stats.finished_at = Some(Utc::now());
                log_totals("aborted", &stats);
                return Err(e);
            }
        }

        stats.finished_at = Some(Utc::now());
        log_totals("finished", &stats);
        Ok(stats)
    }

    /// Processes every entry of one feed. Returns `Err` only when the store
    /// has failed too many times in a row to keep going; the error carries the
    /// run's counters so far.
    async fn ingest_source(
        &self,
        source: &Source,
        stats: &mut RunStats,
        health: &mut StoreHealth,
    ) -> Result<()> {
        let candidates = match self.feeds.read(&source.feed_url).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!("Failed to read feed {} for {}: {}", source.feed_url, source.company, e);
                stats.sources_failed += 1;
                return Ok(());
            }
        };

        for candidate in candidates {
            stats.entries_seen += 1;
            self.ingest_candidate(source, candidate, stats, health).await;

            if health.consecutive_failures >= self.config.max_consecutive_store_failures.max(1) {
                let last_error = health.last_error.clone().unwrap_or_default();
                error!(
                    "Store failed {} times in a row, aborting run: {}",
                    health.consecutive_failures, last_error
                );
                let mut partial = stats.clone();
                partial.finished_at = Some(Utc::now());
                return Err(IngestError::StoreUnavailable {
                    failures: health.consecutive_failures,
                    last_error,
                    stats: Box::new(partial),
                });
            }
        }

        stats.sources_processed += 1;
        Ok(())
    }

    /// Entry boundary: every outcome, including errors, ends here.
    async fn ingest_candidate(
        &self,
        source: &Source,
        candidate: EntryCandidate,
        stats: &mut RunStats,
        health: &mut StoreHealth,
    ) {
        let entry = match candidate.validate() {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipped bad entry from {}: {}", source.company, e);
                stats.discarded += 1;
                return;
            }
        };

        match self.process_entry(source, &entry, stats, health).await {
            Ok(EntryOutcome::Inserted) => {
                info!("Inserted post: {} from {}", entry.title, source.company);
                stats.inserted += 1;
            }
            Ok(EntryOutcome::Skipped) => {
                info!("Skipped existing post: {} from {}", entry.title, source.company);
                stats.skipped += 1;
            }
            Err(e) if e.is_validation() => {
                warn!("Skipped bad entry {} from {}: {}", entry.link, source.company, e);
                stats.discarded += 1;
            }
            Err(e) => {
                error!("Error processing {} from {}: {}", entry.link, source.company, e);
                stats.failed += 1;
            }
        }
    }

    /// Validated → Deduped → ContentFetched → Enriched → Stored.
    async fn process_entry(
        &self,
        source: &Source,
        entry: &RawEntry,
        stats: &mut RunStats,
        health: &mut StoreHealth,
    ) -> Result<EntryOutcome> {
        let published_at = dates::normalize(&entry.published_raw)?;

        let already_stored = track(health, stats, self.store.exists(&entry.link).await)?;
        if already_stored {
            return Ok(EntryOutcome::Skipped);
        }

        let description = self.prepare_description(entry.description.as_deref());

        let full_text = self.content.fetch(&entry.link).await;
        if full_text.is_empty() {
            debug!("No full text for {}", entry.link);
        }

        let enrichment = self
            .insights
            .generate(&EnrichmentInput {
                title: &entry.title,
                description: &description,
                full_text: &full_text,
            })
            .await;
        if let Enrichment::Degraded { reason, .. } = &enrichment {
            warn!("Error generating summary for {}: {}", entry.title, reason);
            stats.degraded += 1;
        }
        let insights = enrichment.into_insights();

        let record = EnrichedRecord {
            published_at,
            company: source.company.clone(),
            title: entry.title.clone(),
            link: entry.link.clone(),
            description,
            summary: insights.summary,
            full_text,
            tags: insights.tags,
        };

        let inserted = track(health, stats, self.store.insert(&record).await)?;
        if inserted {
            Ok(EntryOutcome::Inserted)
        } else {
            // Someone else stored the link between lookup and insert.
            Ok(EntryOutcome::Skipped)
        }
    }

    fn prepare_description(&self, raw: Option<&str>) -> String {
        let raw = raw.unwrap_or_default();
        if self.config.clean_descriptions {
            clean_description(raw, self.config.description_max_chars)
        } else {
            raw.to_string()
        }
    }
}

fn log_totals(outcome: &str, stats: &RunStats) {
    info!(
        "Run {} {}: {} sources processed ({} failed), {} inserted, {} skipped, {} discarded, {} errors",
        stats.run_id,
        outcome,
        stats.sources_processed,
        stats.sources_failed,
        stats.inserted,
        stats.skipped,
        stats.discarded,
        stats.failed
    );
}

/// Records the result of a store call in the run's store health.
fn track<T>(health: &mut StoreHealth, stats: &mut RunStats, result: Result<T>) -> Result<T> {
    match &result {
        Ok(_) => {
            health.consecutive_failures = 0;
        }
        Err(e) => {
            health.consecutive_failures += 1;
            health.last_error = Some(e.to_string());
            stats.store_failures += 1;
        }
    }
    result
}
