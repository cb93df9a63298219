use crate::dates;
use crate::types::{EntryCandidate, IngestError, Result};
use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};
use feed_rs::parser;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use tracing::{debug, info};

#[derive(Debug)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub entries: Vec<EntryCandidate>,
}

/// RSS/Atom parsing into loosely typed entry candidates.
#[derive(Debug, Default)]
pub struct FeedParser;

impl FeedParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_feed(&self, content: &str) -> Result<ParsedFeed> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let timestamps = FeedTimestamps::default();
        let hook = timestamps.clone();
        let feed = parser::Builder::new()
            .timestamp_parser(move |text| hook.parse(text))
            .build()
            .parse(content.as_bytes())
            .map_err(|e| IngestError::Parse(format!("Failed to parse feed: {}", e)))?;

        let title = feed.title.map(|t| t.content);

        let mut seen_links = HashSet::new();
        let mut entries = Vec::with_capacity(feed.entries.len());

        for entry in feed.entries {
            let candidate = Self::parse_entry(entry, &timestamps);

            // A link listed twice in one feed is only worth processing once.
            if let Some(link) = &candidate.link {
                if !seen_links.insert(link.clone()) {
                    debug!("Skipping repeated link in feed: {}", link);
                    continue;
                }
            }

            entries.push(candidate);
        }

        info!("Parsed feed with {} entries", entries.len());

        Ok(ParsedFeed { title, entries })
    }

    fn parse_entry(entry: feed_rs::model::Entry, timestamps: &FeedTimestamps) -> EntryCandidate {
        let title = entry.title.map(|t| t.content);
        let link = entry.links.first().map(|l| l.href.clone());
        let published = entry
            .published
            .or(entry.updated)
            .map(|dt| timestamps.render(dt));
        let description = entry.summary.map(|s| s.content);

        EntryCandidate {
            title,
            link,
            published,
            description,
        }
    }

    pub fn is_valid_feed_content(content: &str) -> bool {
        let content_lower = content.to_lowercase();

        content_lower.contains("<rss")
            || content_lower.contains("<feed")
            || content_lower.contains("<rdf:rdf")
            || content_lower.contains("<channel")
    }
}

/// Timestamp hook for feed-rs, which only hands back `DateTime<Utc>`.
///
/// Recognized stamps are pinned to midnight UTC of the calendar day they name
/// in their own offset, so the day survives the conversion. Stamps none of the
/// grammars accept are kept verbatim and stood in for by a sentinel instant
/// near `DateTime::MIN_UTC`, then handed on as written for the normalizer to
/// reject.
#[derive(Clone, Default)]
struct FeedTimestamps {
    unparsed: Rc<RefCell<Vec<String>>>,
}

impl FeedTimestamps {
    fn parse(&self, text: &str) -> Option<DateTime<Utc>> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        match dates::parse_date(text) {
            Ok(date) => date
                .and_hms_opt(0, 0, 0)
                .map(|midnight| Utc.from_utc_datetime(&midnight)),
            Err(_) => {
                let mut unparsed = self.unparsed.borrow_mut();
                unparsed.push(text.to_string());
                Some(DateTime::<Utc>::MIN_UTC + Duration::seconds(unparsed.len() as i64 - 1))
            }
        }
    }

    fn render(&self, dt: DateTime<Utc>) -> String {
        let sentinel = (dt - DateTime::<Utc>::MIN_UTC).num_seconds();
        if let Ok(index) = usize::try_from(sentinel) {
            if let Some(raw) = self.unparsed.borrow().get(index) {
                return raw.clone();
            }
        }
        dt.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}
