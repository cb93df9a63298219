pub mod types;
pub mod traits;
pub mod dates;
pub mod rss_utils;
pub mod fetcher;
pub mod parser;
pub mod sources;
pub mod content;
pub mod token_budget;
pub mod llm_adapter;
pub mod insights;
pub mod post_store;
pub mod pipeline;

pub use types::*;
pub use traits::{ChatMessage, CompletionRequest, ContentFetcher, FeedReader, PostStore, Role, TextGenerator};
pub use fetcher::Fetcher;
pub use parser::FeedParser;
pub use sources::HttpFeedReader;
pub use content::HttpContentFetcher;
pub use token_budget::{Prompt, TokenBudgeter};
pub use llm_adapter::{MockLlmAdapter, OpenAiGenerator};
pub use insights::InsightGenerator;
pub use post_store::{MemoryPostStore, PgPostStore, StoreTables};
pub use pipeline::IngestionPipeline;
