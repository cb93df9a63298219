use crate::types::{EnrichedRecord, EntryCandidate, Result, Source};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Turns a feed URL into its entries, in feed order.
#[async_trait]
pub trait FeedReader: Send + Sync {
    /// A malformed feed yields an empty or partial list. `Err` is reserved for
    /// the feed being unreachable.
    async fn read(&self, feed_url: &str) -> Result<Vec<EntryCandidate>>;
}

/// Resolves a link to the plain text of the article body.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Best effort: any failure comes back as an empty string.
    async fn fetch(&self, url: &str) -> String;
}

/// Durable storage for sources and enriched posts.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// All sources to poll, in the order they should be processed.
    async fn list_sources(&self) -> Result<Vec<Source>>;

    /// Whether a post with this link is already stored.
    async fn exists(&self, link: &str) -> Result<bool>;

    /// Appends the record. Returns `false` when the link was already taken.
    async fn insert(&self, record: &EnrichedRecord) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One request to the text-generation service.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    /// Ask the service to constrain its answer to a JSON object.
    pub json_output: bool,
}

/// Text-generation service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> String;

    /// Returns the single completion text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}
