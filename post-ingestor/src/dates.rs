//! Normalization of feed timestamps to a `YYYY-MM-DD` calendar date.
//!
//! Feeds publish dates in many shapes. Grammars are tried in a fixed order and
//! the first one that parses wins. The date is taken in the timestamp's own
//! offset, never converted to UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

const CANONICAL_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("couldn't parse date {input} with any of the known formats")]
pub struct FormatError {
    pub input: String,
}

#[derive(Debug, Clone, Copy)]
enum Grammar {
    /// `2023-07-06T19:00:51Z`
    IsoZulu,
    /// `Tue, 20 Jun 2023 00:00:00 GMT`
    RfcNamedZone,
    /// `Wed, 08 Mar 2023 00:00:00 +0000`
    RfcNumericZone,
    /// `2023-07-06T12:50:00.000-07:00`
    IsoFractionalOffset,
    /// `2023-06-29 16:30:00`
    SpaceSeparated,
    /// `2023-09-13T00:00:00+00:00`
    IsoOffset,
}

const GRAMMARS: [Grammar; 6] = [
    Grammar::IsoZulu,
    Grammar::RfcNamedZone,
    Grammar::RfcNumericZone,
    Grammar::IsoFractionalOffset,
    Grammar::SpaceSeparated,
    Grammar::IsoOffset,
];

impl Grammar {
    fn parse(self, input: &str) -> Option<NaiveDate> {
        match self {
            Grammar::IsoZulu => NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%SZ")
                .ok()
                .map(|dt| dt.date()),
            Grammar::RfcNamedZone => {
                let (stamp, zone) = strip_weekday(input)?.rsplit_once(' ')?;
                if zone.is_empty() || !zone.chars().all(|c| c.is_ascii_alphabetic()) {
                    return None;
                }
                NaiveDateTime::parse_from_str(stamp, "%d %b %Y %H:%M:%S")
                    .ok()
                    .map(|dt| dt.date())
            }
            Grammar::RfcNumericZone => {
                DateTime::parse_from_str(strip_weekday(input)?, "%d %b %Y %H:%M:%S %z")
                    .ok()
                    .map(|dt| dt.date_naive())
            }
            Grammar::IsoFractionalOffset => {
                // Without a dot this is the plain offset grammar further down.
                if !input.contains('.') {
                    return None;
                }
                DateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f%z")
                    .ok()
                    .map(|dt| dt.date_naive())
            }
            Grammar::SpaceSeparated => NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date()),
            Grammar::IsoOffset => DateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%z")
                .ok()
                .map(|dt| dt.date_naive()),
        }
    }
}

/// Drops the leading `"Tue, "` of an RFC 822 stamp. The weekday name is not
/// checked against the date.
fn strip_weekday(input: &str) -> Option<&str> {
    let (weekday, rest) = input.split_once(", ")?;
    if weekday.is_empty() || !weekday.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some(rest.trim_start())
}

/// Calendar date of `date_string` under the first matching grammar.
pub fn parse_date(date_string: &str) -> Result<NaiveDate, FormatError> {
    let trimmed = date_string.trim();

    GRAMMARS
        .iter()
        .find_map(|grammar| grammar.parse(trimmed))
        .ok_or_else(|| FormatError {
            input: date_string.to_string(),
        })
}

/// Parses `date_string` with the first matching grammar and returns the
/// canonical `YYYY-MM-DD` form.
pub fn normalize(date_string: &str) -> Result<String, FormatError> {
    parse_date(date_string).map(|date| date.format(CANONICAL_FORMAT).to_string())
}
