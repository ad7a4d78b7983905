//! Relevance scoring of normalized entries against a query.
//!
//! # Scoring Algorithm
//!
//! Each entry gets a weighted sum of three signals, each in `[0, 1]`:
//!
//! 1. **Lexical overlap** — fraction of query terms found in the entry's
//!    tags/content, term-frequency weighted (`tf / (tf + 1)` per term, so a
//!    repeated term counts more but saturates).
//! 2. **Recency** — exponential decay `0.5 ^ (age / half_life)`; very old
//!    entries approach but never reach zero, so a perfect match stays
//!    retrievable years later.
//! 3. **Source priority** — the caller-configured per-source weight.
//!
//! `score = clamp(w1·lexical + w2·recency + w3·source, 0, 1)` with default
//! weights `(0.5, 0.2, 0.3)`. Entries with no lexical overlap are still
//! scored — recency and source can surface keyword-sparse but contextually
//! relevant entries — but anything below `min_score` (default `0.05`) is
//! dropped as noise.
//!
//! An empty query degenerates to recency + source ordering; that is
//! documented behavior, not an error.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::config::ScoringConfig;
use crate::models::{ContextEntry, ScoredEntry};
use crate::normalize::tokenize;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Tokenize query text into distinct terms, first-occurrence order.
pub fn tokenize_query(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    tokenize(text)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Score one entry against the query terms. Consumes the entry; re-scoring
/// takes a fresh clone and produces a new [`ScoredEntry`].
pub fn score_entry(
    entry: ContextEntry,
    query_terms: &[String],
    now: DateTime<Utc>,
    config: &ScoringConfig,
) -> ScoredEntry {
    let (lexical, matched_terms) = lexical_overlap(&entry, query_terms);
    let recency = recency_score(entry.timestamp, now, config.half_life_days);
    let source = config.priority(entry.source);

    let score = config.lexical_weight * lexical
        + config.recency_weight * recency
        + config.source_weight * source;

    ScoredEntry {
        entry,
        relevance_score: score.clamp(0.0, 1.0),
        matched_terms,
    }
}

/// Score a batch and drop entries below the minimum-score cutoff.
pub fn score_all(
    entries: Vec<ContextEntry>,
    query_terms: &[String],
    now: DateTime<Utc>,
    config: &ScoringConfig,
) -> Vec<ScoredEntry> {
    entries
        .into_iter()
        .map(|entry| score_entry(entry, query_terms, now, config))
        .filter(|scored| scored.relevance_score >= config.min_score)
        .collect()
}

/// Term-frequency weighted fraction of query terms present in the entry.
///
/// Per-term contribution is `tf / (tf + 1)` where `tf` counts occurrences
/// in the content tokens plus one for a tag hit; the sum is divided by the
/// query term count. Empty query terms → `0.0` for every entry.
fn lexical_overlap(entry: &ContextEntry, query_terms: &[String]) -> (f64, BTreeSet<String>) {
    if query_terms.is_empty() {
        return (0.0, BTreeSet::new());
    }

    let content_tokens = tokenize(&entry.content);
    let mut matched = BTreeSet::new();
    let mut total = 0.0;

    for term in query_terms {
        let mut tf = content_tokens.iter().filter(|t| *t == term).count();
        if entry.tags.contains(term) {
            tf += 1;
        }
        if tf > 0 {
            matched.insert(term.clone());
            total += tf as f64 / (tf as f64 + 1.0);
        }
    }

    (total / query_terms.len() as f64, matched)
}

/// Exponential recency decay with the configured half-life. Future-dated
/// entries (clock skew between sources) are clamped to "now".
fn recency_score(timestamp: DateTime<Utc>, now: DateTime<Utc>, half_life_days: f64) -> f64 {
    let age_secs = (now - timestamp).num_seconds().max(0) as f64;
    let age_days = age_secs / SECONDS_PER_DAY;
    0.5f64.powf(age_days / half_life_days)
}
