//! Helpers shared by the feed parser, the content fetcher and the enrichment step.

/// URL utilities
pub mod url {
    use url::Url;

    /// Only http(s) links are fetched
    pub fn is_http_url(url_str: &str) -> bool {
        match Url::parse(url_str) {
            Ok(url) => matches!(url.scheme(), "http" | "https") && url.host().is_some(),
            Err(_) => false,
        }
    }
}

/// Text cleanup
pub mod text {
    use scraper::Html;

    /// Text content of an HTML fragment, entities decoded and whitespace
    /// collapsed.
    pub fn extract_text_from_html(html: &str) -> String {
        let fragment = Html::parse_fragment(html);
        let text: String = fragment.root_element().text().collect();
        collapse_whitespace(&text)
    }

    /// Collapse every run of whitespace into a single space.
    pub fn collapse_whitespace(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// First `max_chars` characters of `text`, never splitting a code point.
    pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
        match text.char_indices().nth(max_chars) {
            Some((idx, _)) => &text[..idx],
            None => text,
        }
    }

    /// Drop a trailing `<tag` that was cut off before its `>`.
    pub fn strip_incomplete_tag(text: &str) -> &str {
        match text.rfind('<') {
            Some(idx) if !text[idx..].contains('>') => &text[..idx],
            _ => text,
        }
    }

    /// Feed descriptions are often HTML fragments of arbitrary length.
    /// Newlines become spaces, the text is cut to `max_chars` (with `...`
    /// appended), a dangling tag is removed and the rest is reduced to plain text.
    pub fn clean_description(raw: &str, max_chars: usize) -> String {
        let flat = raw.replace(['\r', '\n'], " ");

        let cut = if flat.chars().count() > max_chars {
            format!("{}...", truncate_chars(&flat, max_chars))
        } else {
            flat
        };

        extract_text_from_html(strip_incomplete_tag(&cut))
    }

    /// Text up to the first `". "`, terminated with a period.
    pub fn first_sentence(text: &str) -> String {
        let trimmed = text.trim();
        let sentence = trimmed.split(". ").next().unwrap_or(trimmed);
        if sentence.ends_with('.') {
            sentence.to_string()
        } else {
            format!("{}.", sentence)
        }
    }
}
