use post_ingestor::content::extract_article_text;
use post_ingestor::dates;
use post_ingestor::{FeedParser, FetchConfig, Fetcher, HttpFeedReader, Result};
use std::sync::Arc;
use tracing::info;

const ACME_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Acme Engineering</title>
    <link>https://acme.dev/blog</link>
    <description>Posts from the Acme engineering team</description>
    <item>
      <title>Scaling Postgres</title>
      <link>https://acme.dev/blog/scaling-postgres</link>
      <pubDate>Tue, 20 Jun 2023 00:00:00 GMT</pubDate>
      <description><![CDATA[<p>How we sharded <b>everything</b>.</p>]]></description>
    </item>
    <item>
      <title>Scaling Postgres (again)</title>
      <link>https://acme.dev/blog/scaling-postgres</link>
      <pubDate>Tue, 20 Jun 2023 00:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Undated post</title>
      <link>https://acme.dev/blog/undated</link>
    </item>
  </channel>
</rss>"#;

const ACME_ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Acme Atom</title>
  <id>urn:acme</id>
  <updated>2023-07-06T19:00:51Z</updated>
  <entry>
    <title>Atom post</title>
    <id>urn:acme:1</id>
    <link href="https://acme.dev/atom/1"/>
    <published>2023-07-06T12:50:00-07:00</published>
    <updated>2023-07-06T12:50:00-07:00</updated>
    <summary>Atom summary.</summary>
  </entry>
</feed>"#;

#[test]
fn test_parse_rss_feed() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    let parsed = FeedParser::new().parse_feed(ACME_RSS)?;
    info!("Parsed {} entries", parsed.entries.len());

    assert_eq!(parsed.title.as_deref(), Some("Acme Engineering"));
    // The repeated link is dropped.
    assert_eq!(parsed.entries.len(), 2);

    let first = &parsed.entries[0];
    assert_eq!(first.title.as_deref(), Some("Scaling Postgres"));
    assert_eq!(first.link.as_deref(), Some("https://acme.dev/blog/scaling-postgres"));
    assert!(first.description.as_deref().unwrap_or_default().contains("sharded"));

    let published = first.published.as_deref().unwrap();
    assert_eq!(dates::normalize(published).unwrap(), "2023-06-20");

    assert!(parsed.entries[1].published.is_none());
    Ok(())
}

#[test]
fn test_feed_dates_keep_their_own_day() -> Result<()> {
    let rss = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Globex</title>
    <item>
      <title>Late evening post</title>
      <link>https://globex.io/blog/late</link>
      <pubDate>Thu, 06 Jul 2023 20:00:00 -0700</pubDate>
    </item>
    <item>
      <title>Wrong weekday</title>
      <link>https://globex.io/blog/weekday</link>
      <pubDate>Wed, 20 Jun 2023 00:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Handwritten date</title>
      <link>https://globex.io/blog/handwritten</link>
      <pubDate>July 6th, 2023</pubDate>
    </item>
  </channel>
</rss>"#;

    let parsed = FeedParser::new().parse_feed(rss)?;
    assert_eq!(parsed.entries.len(), 3);

    let late = parsed.entries[0].published.as_deref().unwrap();
    assert_eq!(dates::normalize(late).unwrap(), "2023-07-06");

    let weekday = parsed.entries[1].published.as_deref().unwrap();
    assert_eq!(dates::normalize(weekday).unwrap(), "2023-06-20");

    // Unknown grammars are passed on as written so the entry gets discarded
    // as undatable rather than as missing its date.
    assert_eq!(parsed.entries[2].published.as_deref(), Some("July 6th, 2023"));
    assert!(dates::normalize("July 6th, 2023").is_err());
    Ok(())
}

#[test]
fn test_parse_atom_feed() -> Result<()> {
    let parsed = FeedParser::new().parse_feed(ACME_ATOM)?;

    assert_eq!(parsed.entries.len(), 1);
    let entry = &parsed.entries[0];
    assert_eq!(entry.link.as_deref(), Some("https://acme.dev/atom/1"));
    assert_eq!(entry.description.as_deref(), Some("Atom summary."));
    assert!(entry.published.is_some());
    Ok(())
}

#[test]
fn test_malformed_feed_yields_no_entries() -> Result<()> {
    let reader = HttpFeedReader::new(Arc::new(Fetcher::new(FetchConfig::default())?));

    assert!(reader
        .entries_from_content("https://acme.dev/feed", "<html><body>Not a feed</body></html>")
        .is_empty());

    let entries = reader.entries_from_content("https://acme.dev/feed", ACME_RSS);
    assert_eq!(entries.len(), 2);
    Ok(())
}

#[test]
fn test_feed_content_detection() {
    assert!(FeedParser::is_valid_feed_content(ACME_RSS));
    assert!(FeedParser::is_valid_feed_content(ACME_ATOM));
    assert!(!FeedParser::is_valid_feed_content("{\"not\": \"xml\"}"));
}

#[test]
fn test_article_text_skips_page_chrome() {
    let html = r#"<html><head><title>t</title><style>p { color: red }</style></head>
        <body>
          <nav>Home | Blog | Careers</nav>
          <article>
            <h1>Scaling Postgres</h1>
            <p>We sharded   everything.</p>
            <script>track();</script>
            <p>Then we slept.</p>
          </article>
          <footer>Copyright Acme</footer>
        </body></html>"#;

    let text = extract_article_text(html);
    assert_eq!(text, "Scaling Postgres\nWe sharded everything.\nThen we slept.");
}
