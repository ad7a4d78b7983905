//! Entry normalization: raw source records → canonical [`ContextEntry`].
//!
//! The normalizer is the single exhaustive dispatch point over
//! [`RawRecord`] variants. It never fails hard on malformed input: missing
//! optional fields map to `None`, a record without a parseable timestamp is
//! stamped with the normalization time and tagged
//! [`LOW_CONFIDENCE_TIMESTAMP_TAG`], and a record without a natural key gets
//! a deterministic content-hash id.
//!
//! Tag extraction (lowercase tokenization, stop-word removal) is
//! deterministic: the same record always yields the same tag set, which
//! keeps scoring and correlation reproducible.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

use crate::models::{ContextEntry, EntryType, RawRecord, Source};

/// Tag attached when a record's timestamp could not be parsed and the
/// normalization time was substituted.
pub const LOW_CONFIDENCE_TIMESTAMP_TAG: &str = "low_confidence_timestamp";

/// Minimum token length kept during tokenization.
const MIN_TOKEN_LEN: usize = 2;

/// Common English and development-chatter words that carry no signal.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "can", "did", "do", "does",
    "for", "from", "had", "has", "have", "how", "if", "in", "into", "is", "it", "its", "just",
    "me", "my", "no", "not", "of", "on", "or", "our", "should", "so", "some", "than", "that",
    "the", "their", "them", "then", "there", "these", "they", "this", "to", "up", "us", "was",
    "we", "were", "what", "when", "where", "which", "who", "why", "will", "with", "would",
    "you", "your",
];

/// Lowercase a text and split it into tokens on non-alphanumeric boundaries,
/// dropping stop words and tokens shorter than two characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= MIN_TOKEN_LEN && !STOP_WORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

/// Extract the normalized keyword tag set from a title and body.
pub fn extract_tags(title: Option<&str>, content: &str) -> BTreeSet<String> {
    let mut tags: BTreeSet<String> = tokenize(content).into_iter().collect();
    if let Some(title) = title {
        tags.extend(tokenize(title));
    }
    tags
}

/// Convert a raw record into the canonical entry shape.
///
/// `now` is the normalization instant, used both as the timestamp fallback
/// and (by the caller) as the recency anchor, so one query sees a single
/// consistent clock.
pub fn normalize(raw: &RawRecord, now: DateTime<Utc>) -> ContextEntry {
    match raw {
        RawRecord::CodeRepo(c) => {
            let (timestamp, fallback) = parse_timestamp(c.timestamp.as_deref(), now);
            let title = first_line(&c.message);
            let mut tags = extract_tags(title.as_deref(), &c.message);
            if fallback {
                tags.insert(LOW_CONFIDENCE_TIMESTAMP_TAG.to_string());
            }
            ContextEntry {
                id: entry_id(Source::CodeRepo, c.sha.as_deref(), &c.message, timestamp),
                source: Source::CodeRepo,
                entry_type: EntryType::Commit,
                title,
                content: c.message.clone(),
                author: c.author.clone(),
                timestamp,
                url: c.url.clone(),
                tags,
            }
        }
        RawRecord::Chat(m) => {
            let (timestamp, fallback) = parse_timestamp(
                m.timestamp.as_deref().or(m.ts.as_deref()),
                now,
            );
            let mut tags = extract_tags(None, &m.text);
            if fallback {
                tags.insert(LOW_CONFIDENCE_TIMESTAMP_TAG.to_string());
            }
            let natural_key = match (&m.channel, &m.ts) {
                (Some(channel), Some(ts)) => Some(format!("{}/{}", channel, ts)),
                _ => None,
            };
            ContextEntry {
                id: entry_id(Source::Chat, natural_key.as_deref(), &m.text, timestamp),
                source: Source::Chat,
                entry_type: EntryType::Message,
                title: None,
                content: m.text.clone(),
                author: m.sender.clone(),
                timestamp,
                url: m.permalink.clone(),
                tags,
            }
        }
        RawRecord::IssueTracker(t) => {
            let (timestamp, fallback) = parse_timestamp(t.updated_at.as_deref(), now);
            let mut tags = extract_tags(t.summary.as_deref(), &t.description);
            if let Some(status) = &t.status {
                tags.extend(tokenize(status));
            }
            if fallback {
                tags.insert(LOW_CONFIDENCE_TIMESTAMP_TAG.to_string());
            }
            ContextEntry {
                id: entry_id(
                    Source::IssueTracker,
                    t.key.as_deref(),
                    &t.description,
                    timestamp,
                ),
                source: Source::IssueTracker,
                entry_type: EntryType::Ticket,
                title: t.summary.clone(),
                content: t.description.clone(),
                author: t.reporter.clone(),
                timestamp,
                url: t.url.clone(),
                tags,
            }
        }
        RawRecord::Document(d) => {
            let (timestamp, fallback) = parse_timestamp(d.modified_at.as_deref(), now);
            let mut tags = extract_tags(d.heading.as_deref(), &d.body);
            if fallback {
                tags.insert(LOW_CONFIDENCE_TIMESTAMP_TAG.to_string());
            }
            ContextEntry {
                id: entry_id(Source::Document, d.slug.as_deref(), &d.body, timestamp),
                source: Source::Document,
                entry_type: EntryType::DocSection,
                title: d.heading.clone(),
                content: d.body.clone(),
                author: d.author.clone(),
                timestamp,
                url: d.url.clone(),
                tags,
            }
        }
    }
}

/// Normalize a batch, returning the entries plus the count of timestamp
/// fallbacks (surfaced by the orchestrator as a normalization warning).
pub fn normalize_all(raws: &[RawRecord], now: DateTime<Utc>) -> (Vec<ContextEntry>, usize) {
    let entries: Vec<ContextEntry> = raws.iter().map(|raw| normalize(raw, now)).collect();
    let fallbacks = entries
        .iter()
        .filter(|e| e.tags.contains(LOW_CONFIDENCE_TIMESTAMP_TAG))
        .count();
    (entries, fallbacks)
}

/// Stable entry id: `{source}:{natural key}` when the record carries one,
/// otherwise `{source}:{sha256 prefix}` over the content and timestamp.
fn entry_id(
    source: Source,
    natural_key: Option<&str>,
    content: &str,
    timestamp: DateTime<Utc>,
) -> String {
    match natural_key {
        Some(key) if !key.trim().is_empty() => format!("{}:{}", source, key.trim()),
        _ => {
            let mut hasher = Sha256::new();
            hasher.update(source.as_str().as_bytes());
            hasher.update(content.as_bytes());
            hasher.update(timestamp.timestamp().to_le_bytes());
            let hash = format!("{:x}", hasher.finalize());
            format!("{}:{}", source, &hash[..12])
        }
    }
}

/// Parse a timestamp in the formats connectors actually emit. Returns the
/// parsed time, or `(now, true)` when nothing parses.
fn parse_timestamp(raw: Option<&str>, now: DateTime<Utc>) -> (DateTime<Utc>, bool) {
    let Some(raw) = raw else {
        return (now, true);
    };
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return (dt.with_timezone(&Utc), false);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return (dt.and_utc(), false);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return (dt.and_utc(), false);
        }
    }
    // Epoch seconds, optionally fractional (chat-style "1717232100.000200").
    if let Ok(secs) = raw.parse::<f64>() {
        if secs.is_finite() && secs > 0.0 {
            if let Some(dt) = DateTime::from_timestamp(secs as i64, 0) {
                return (dt, false);
            }
        }
    }

    (now, true)
}

fn first_line(text: &str) -> Option<String> {
    let line = text.lines().next()?.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}
