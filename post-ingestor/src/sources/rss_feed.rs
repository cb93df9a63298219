use crate::traits::FeedReader;
use crate::types::{EntryCandidate, IngestError, Result};
use crate::{FeedParser, Fetcher};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Reads feeds over HTTP and parses them with feed-rs.
pub struct HttpFeedReader {
    fetcher: Arc<Fetcher>,
    parser: FeedParser,
}

impl HttpFeedReader {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self {
            fetcher,
            parser: FeedParser::new(),
        }
    }

    /// Parse already-downloaded feed content. Malformed content yields an
    /// empty list.
    pub fn entries_from_content(&self, feed_url: &str, content: &str) -> Vec<EntryCandidate> {
        if !FeedParser::is_valid_feed_content(content) {
            warn!("Content at {} does not look like a feed", feed_url);
            return Vec::new();
        }

        match self.parser.parse_feed(content) {
            Ok(parsed) => {
                info!(
                    "Feed {} ({}): {} entries",
                    parsed.title.as_deref().unwrap_or("untitled"),
                    feed_url,
                    parsed.entries.len()
                );
                parsed.entries
            }
            Err(IngestError::Parse(msg)) => {
                warn!("Malformed feed {}: {}", feed_url, msg);
                Vec::new()
            }
            Err(e) => {
                warn!("Could not read feed {}: {}", feed_url, e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl FeedReader for HttpFeedReader {
    async fn read(&self, feed_url: &str) -> Result<Vec<EntryCandidate>> {
        info!("Pulling RSS feed: {}", feed_url);

        let content = self.fetcher.fetch_text(feed_url).await?;
        Ok(self.entries_from_content(feed_url, &content))
    }
}
