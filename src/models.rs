//! Core data models used throughout Context Oracle.
//!
//! These types represent the raw records, normalized entries, correlations,
//! and query results that flow through the retrieval and correlation pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// An external system category supplying raw candidate records.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    CodeRepo,
    Chat,
    IssueTracker,
    Document,
}

impl Source {
    /// All known sources, in canonical order.
    pub const ALL: [Source; 4] = [
        Source::CodeRepo,
        Source::Chat,
        Source::IssueTracker,
        Source::Document,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::CodeRepo => "code-repo",
            Source::Chat => "chat",
            Source::IssueTracker => "issue-tracker",
            Source::Document => "document",
        }
    }

    /// Parse a source identifier as used in config files and CLI flags.
    pub fn parse(s: &str) -> Option<Source> {
        match s {
            "code-repo" => Some(Source::CodeRepo),
            "chat" => Some(Source::Chat),
            "issue-tracker" => Some(Source::IssueTracker),
            "document" => Some(Source::Document),
            _ => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// The kind of development activity a normalized entry represents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum EntryType {
    Commit,
    Message,
    Ticket,
    DocSection,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Commit => "commit",
            EntryType::Message => "message",
            EntryType::Ticket => "ticket",
            EntryType::DocSection => "doc-section",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Raw record produced by a source connector before normalization.
///
/// The shape varies per source, so the variants are tagged by the `source`
/// field of the serialized form. The normalizer is the single exhaustive
/// dispatch point over this enum — adding a source means adding one variant
/// here plus one normalization arm, nothing else changes.
///
/// All fields are optional or defaulted: connectors deal with real-world
/// payloads and a half-filled record must still deserialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "kebab-case")]
pub enum RawRecord {
    CodeRepo(RawCommit),
    Chat(RawMessage),
    IssueTracker(RawTicket),
    Document(RawDocSection),
}

impl RawRecord {
    pub fn source(&self) -> Source {
        match self {
            RawRecord::CodeRepo(_) => Source::CodeRepo,
            RawRecord::Chat(_) => Source::Chat,
            RawRecord::IssueTracker(_) => Source::IssueTracker,
            RawRecord::Document(_) => Source::Document,
        }
    }

    /// All free text carried by the record, joined for keyword filtering.
    pub fn text(&self) -> String {
        match self {
            RawRecord::CodeRepo(c) => c.message.clone(),
            RawRecord::Chat(m) => m.text.clone(),
            RawRecord::IssueTracker(t) => match &t.summary {
                Some(summary) => format!("{}\n{}", summary, t.description),
                None => t.description.clone(),
            },
            RawRecord::Document(d) => match &d.heading {
                Some(heading) => format!("{}\n{}", heading, d.body),
                None => d.body.clone(),
            },
        }
    }
}

/// A commit as reported by a source-control connector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCommit {
    pub sha: Option<String>,
    #[serde(default)]
    pub message: String,
    pub author: Option<String>,
    pub timestamp: Option<String>,
    pub url: Option<String>,
}

/// A chat message as reported by a messaging connector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMessage {
    pub channel: Option<String>,
    pub ts: Option<String>,
    #[serde(default)]
    pub text: String,
    pub sender: Option<String>,
    pub timestamp: Option<String>,
    pub permalink: Option<String>,
}

/// An issue-tracker ticket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTicket {
    pub key: Option<String>,
    pub summary: Option<String>,
    #[serde(default)]
    pub description: String,
    pub reporter: Option<String>,
    pub status: Option<String>,
    pub updated_at: Option<String>,
    pub url: Option<String>,
}

/// A section of a document or wiki page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDocSection {
    pub slug: Option<String>,
    pub heading: Option<String>,
    #[serde(default)]
    pub body: String,
    pub author: Option<String>,
    pub modified_at: Option<String>,
    pub url: Option<String>,
}

/// One normalized unit of development activity.
///
/// Immutable once created by the normalizer. The `id` is stable for a given
/// record (`{source}:{natural key}`, or a content hash when the record
/// carries no natural key) and unique within a single query's candidate set.
/// `timestamp` is always present — records without a parseable one get the
/// normalization time and a `low_confidence_timestamp` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub id: String,
    pub source: Source,
    pub entry_type: EntryType,
    pub title: Option<String>,
    pub content: String,
    pub author: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub url: Option<String>,
    /// Normalized keywords extracted from title + content at normalization
    /// time. A `BTreeSet` so iteration order (and everything downstream of
    /// it) is deterministic.
    pub tags: BTreeSet<String>,
}

/// A [`ContextEntry`] plus its relevance against one query.
///
/// Created by the scorer and never mutated; re-scoring produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEntry {
    pub entry: ContextEntry,
    /// Relevance in `[0.0, 1.0]`.
    pub relevance_score: f64,
    /// Query terms that contributed lexical overlap.
    pub matched_terms: BTreeSet<String>,
}

/// How two entries were found to relate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum CorrelationKind {
    /// One entry's text contains the other's literal identifier
    /// (commit sha, ticket key, …).
    ExplicitReference,
    /// Tag-set similarity above the overlap threshold.
    TextualOverlap,
    /// Close in time and sharing at least one tag.
    Temporal,
}

/// An undirected, scored relation between two entry ids.
///
/// Never relates an entry to itself; `strength` is in `[0.0, 1.0]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub a: String,
    pub b: String,
    pub kind: CorrelationKind,
    pub strength: f64,
}

/// A group of entries judged to represent the same underlying event/topic.
///
/// Clusters partition the deduplicated candidate set: every entry id appears
/// in exactly one cluster. `relevance` is the maximum relevance among
/// members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Id of the highest-relevance member.
    pub representative: String,
    /// All member ids, representative included, ordered by relevance.
    pub members: Vec<String>,
    pub relevance: f64,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// The complete outcome of one query, constructed once by the orchestrator
/// and returned to the caller. Never updated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub query: String,
    /// Cluster representatives, ordered by the ranker, truncated to the
    /// requested limit.
    pub ranked_entries: Vec<ScoredEntry>,
    /// The emitted clusters, in the same order as `ranked_entries`; member
    /// ids stay attached for evidence display.
    pub clusters: Vec<Cluster>,
    /// All discovered relations among the deduplicated candidates.
    pub correlations: Vec<Correlation>,
    /// Sources that actually responded; a source that errored or timed out
    /// is absent.
    pub sources_used: BTreeSet<Source>,
    /// Mean relevance of the ranked representatives, scaled down by the
    /// fraction of requested sources that responded.
    pub confidence_score: f64,
    /// Wall-clock duration of the whole query.
    #[serde(with = "duration_secs")]
    pub execution_time: Duration,
}

/// The answer envelope returned by the CLI and HTTP API: the retrieval
/// result plus the optional synthesized prose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query_id: String,
    #[serde(flatten)]
    pub result: QueryResult,
    /// Present when a synthesis provider is configured and succeeded.
    /// Absence is not an error: the evidence stands on its own.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

/// Serialize a [`Duration`] as fractional seconds, matching the wire shape
/// of the HTTP API (`"execution_time": 0.042`).
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("duration must be non-negative"));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}
