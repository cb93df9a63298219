//! Article body extraction.
//!
//! Picks the most likely content container with a few readability
//! heuristics, drops page chrome and returns plain text with one line per
//! block element.

use crate::rss_utils::{text::collapse_whitespace, url::is_http_url};
use crate::traits::ContentFetcher;
use crate::Fetcher;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use tracing::{debug, warn};

/// Tried in order; the first one with text wins, `body` is the last resort.
const CONTENT_SELECTORS: [&str; 7] = [
    "article",
    "main",
    r#"[role="main"]"#,
    ".post-content",
    ".entry-content",
    ".content",
    "body",
];

const SKIPPED_TAGS: [&str; 9] = [
    "script", "style", "nav", "header", "footer", "aside", "noscript", "form", "svg",
];

const BLOCK_TAGS: [&str; 20] = [
    "p", "div", "li", "h1", "h2", "h3", "h4", "h5", "h6", "pre", "blockquote", "article",
    "section", "main", "body", "td", "th", "dd", "dt", "figcaption",
];

pub struct HttpContentFetcher {
    fetcher: Arc<Fetcher>,
}

impl HttpContentFetcher {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, url: &str) -> String {
        if !is_http_url(url) {
            warn!("Not fetching content for non-http link: {}", url);
            return String::new();
        }

        match self.fetcher.fetch_text(url).await {
            Ok(html) => {
                let text = extract_article_text(&html);
                if text.is_empty() {
                    warn!("No article text found at {}", url);
                } else {
                    debug!("Extracted {} chars of article text from {}", text.len(), url);
                }
                text
            }
            Err(e) => {
                warn!("Failed to fetch content from {}: {}", url, e);
                String::new()
            }
        }
    }
}

/// Plain text of the main content of an HTML page. Empty if nothing usable
/// was found.
pub fn extract_article_text(html: &str) -> String {
    let document = Html::parse_document(html);

    for selector in CONTENT_SELECTORS.iter().filter_map(|s| Selector::parse(s).ok()) {
        for container in document.select(&selector) {
            let text = container_text(container);
            if !text.is_empty() {
                return text;
            }
        }
    }

    String::new()
}

fn container_text(container: ElementRef) -> String {
    let mut blocks: Vec<(Option<_>, String)> = Vec::new();

    for node in container.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let mut block = None;
        let mut skipped = false;
        for ancestor in node.ancestors() {
            if let Some(element) = ancestor.value().as_element() {
                let name = element.name();
                if SKIPPED_TAGS.contains(&name) {
                    skipped = true;
                    break;
                }
                if block.is_none() && BLOCK_TAGS.contains(&name) {
                    block = Some(ancestor.id());
                }
            }
            if ancestor.id() == container.id() {
                break;
            }
        }
        if skipped {
            continue;
        }

        let piece = collapse_whitespace(text);
        if piece.is_empty() {
            continue;
        }

        match blocks.last_mut() {
            Some((last_block, line)) if *last_block == block => {
                line.push(' ');
                line.push_str(&piece);
            }
            _ => blocks.push((block, piece)),
        }
    }

    blocks
        .into_iter()
        .map(|(_, line)| line)
        .collect::<Vec<_>>()
        .join("\n")
}
