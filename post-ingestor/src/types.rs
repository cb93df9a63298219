use crate::dates::FormatError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A (company, feed URL) pair to poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub company: String,
    pub feed_url: String,
}

impl Source {
    pub fn new(company: impl Into<String>, feed_url: impl Into<String>) -> Self {
        Self {
            company: company.into(),
            feed_url: feed_url.into(),
        }
    }
}

/// Feed item as it comes out of the parser. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryCandidate {
    pub title: Option<String>,
    pub link: Option<String>,
    pub published: Option<String>,
    pub description: Option<String>,
}

impl EntryCandidate {
    /// Checks the required fields once and produces a typed entry.
    /// Blank strings count as missing.
    pub fn validate(self) -> Result<RawEntry> {
        let title = non_blank(self.title);
        let link = non_blank(self.link);
        let published = non_blank(self.published);

        let mut missing = Vec::new();
        if title.is_none() {
            missing.push("title");
        }
        if link.is_none() {
            missing.push("link");
        }
        if published.is_none() {
            missing.push("published");
        }

        match (title, link, published) {
            (Some(title), Some(link), Some(published_raw)) => Ok(RawEntry {
                title,
                link,
                published_raw,
                description: self.description,
            }),
            _ => Err(IngestError::Validation(format!(
                "missing required field(s): {}",
                missing.join(", ")
            ))),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A feed entry that has all required fields. The date is still raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub title: String,
    pub link: String,
    pub published_raw: String,
    pub description: Option<String>,
}

/// The persisted unit. `link` is unique per table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub published_at: String,
    pub company: String,
    pub title: String,
    pub link: String,
    pub description: String,
    pub summary: String,
    pub full_text: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insights {
    pub summary: String,
    pub tags: Vec<String>,
}

/// Result of the enrichment step. Degraded results still carry a summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enrichment {
    Generated(Insights),
    Degraded { insights: Insights, reason: String },
}

impl Enrichment {
    pub fn insights(&self) -> &Insights {
        match self {
            Enrichment::Generated(insights) => insights,
            Enrichment::Degraded { insights, .. } => insights,
        }
    }

    pub fn into_insights(self) -> Insights {
        match self {
            Enrichment::Generated(insights) => insights,
            Enrichment::Degraded { insights, .. } => insights,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Enrichment::Degraded { .. })
    }
}

/// What happened to an entry that made it past validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    Inserted,
    Skipped,
}

/// Which enrichment the pipeline asks the text-generation service for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentStrategy {
    /// One-line summary plus topic tags, generated from the full article text.
    #[default]
    Insights,
    /// Summary only, generated from the cleaned feed description.
    Summary,
}

impl EnrichmentStrategy {
    pub fn wants_tags(&self) -> bool {
        matches!(self, EnrichmentStrategy::Insights)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub sources_total: usize,
    pub sources_processed: usize,
    pub sources_failed: usize,
    pub entries_seen: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub discarded: usize,
    pub failed: usize,
    pub store_failures: usize,
    pub degraded: usize,
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_body_size_mb: usize,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Post-Ingestor/1.0".to_string(),
            timeout_seconds: 30,
            max_retries: 2,
            retry_delay_seconds: 2,
            max_body_size_mb: 10,
            max_redirects: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub model: String,
    pub max_output_tokens: u32,
    /// Upper bound for the rendered prompt, measured with the model's tokenizer.
    pub max_prompt_tokens: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo-0125".to_string(),
            max_output_tokens: 100,
            max_prompt_tokens: 3500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub strategy: EnrichmentStrategy,
    pub clean_descriptions: bool,
    pub description_max_chars: usize,
    /// Consecutive store lookup/insert failures after which the run gives up.
    pub max_consecutive_store_failures: usize,
    pub generator: GeneratorConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            strategy: EnrichmentStrategy::default(),
            clean_descriptions: true,
            description_max_chars: 1000,
            max_consecutive_store_failures: 5,
            generator: GeneratorConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid entry: {0}")]
    Validation(String),

    #[error(transparent)]
    DateFormat(#[from] FormatError),

    #[error("Text generation failed: {0}")]
    Generation(String),

    #[error("Store unavailable after {failures} consecutive failures: {last_error}")]
    StoreUnavailable {
        failures: usize,
        last_error: String,
        /// Counters up to the point the run gave up.
        stats: Box<RunStats>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("General error: {0}")]
    General(String),
}

impl IngestError {
    /// Errors that mean the entry itself is unusable, as opposed to a
    /// collaborator failing while handling it.
    pub fn is_validation(&self) -> bool {
        matches!(self, IngestError::Validation(_) | IngestError::DateFormat(_))
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
