use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::models::Source;

/// Immutable application configuration, threaded explicitly through every
/// pipeline stage. Two queries running with different configs never
/// interfere — there is no ambient/global tuning state.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub correlation: CorrelationConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub connectors: ConnectorsConfig,
}

/// Relevance scoring weights and thresholds.
#[derive(Debug, Deserialize, Clone)]
pub struct ScoringConfig {
    /// Weight of the lexical-overlap signal.
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f64,
    /// Weight of the recency signal.
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,
    /// Weight of the per-source priority signal.
    #[serde(default = "default_source_weight")]
    pub source_weight: f64,
    /// Recency half-life: an entry this many days old scores half the
    /// recency of one from right now. Old entries approach but never
    /// reach zero.
    #[serde(default = "default_half_life_days")]
    pub half_life_days: f64,
    /// Entries scoring below this are dropped as noise.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// Per-source priority in `[0, 1]`, keyed by source identifier
    /// (`code-repo`, `chat`, `issue-tracker`, `document`). Lets decision
    /// -oriented deployments rank tickets over chat chatter.
    #[serde(default = "default_source_priority")]
    pub source_priority: BTreeMap<String, f64>,
}

impl ScoringConfig {
    /// Priority for a source, falling back to a middle-of-the-road 0.8
    /// for sources the map does not name.
    pub fn priority(&self, source: Source) -> f64 {
        self.source_priority
            .get(source.as_str())
            .copied()
            .unwrap_or(0.8)
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            lexical_weight: default_lexical_weight(),
            recency_weight: default_recency_weight(),
            source_weight: default_source_weight(),
            half_life_days: default_half_life_days(),
            min_score: default_min_score(),
            source_priority: default_source_priority(),
        }
    }
}

fn default_lexical_weight() -> f64 {
    0.5
}
fn default_recency_weight() -> f64 {
    0.2
}
fn default_source_weight() -> f64 {
    0.3
}
fn default_half_life_days() -> f64 {
    30.0
}
fn default_min_score() -> f64 {
    0.05
}
fn default_source_priority() -> BTreeMap<String, f64> {
    let mut map = BTreeMap::new();
    map.insert("issue-tracker".to_string(), 1.0);
    map.insert("code-repo".to_string(), 0.9);
    map.insert("document".to_string(), 0.8);
    map.insert("chat".to_string(), 0.7);
    map
}

/// Deduplication, relation-discovery, and clustering thresholds.
#[derive(Debug, Deserialize, Clone)]
pub struct CorrelationConfig {
    /// Tag-set Jaccard similarity at or above which two same-source,
    /// same-type entries are merge candidates.
    #[serde(default = "default_dedup_similarity")]
    pub dedup_similarity: f64,
    /// Merge candidates must also fall within this many seconds of each
    /// other — distinct events that share vocabulary stay distinct.
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: i64,
    /// Jaccard similarity at or above which a textual-overlap relation is
    /// recorded.
    #[serde(default = "default_overlap_similarity")]
    pub overlap_similarity: f64,
    /// Window for temporal-proximity relations.
    #[serde(default = "default_temporal_window_secs")]
    pub temporal_window_secs: i64,
    /// Minimum relation strength for two entries to land in one cluster.
    #[serde(default = "default_cluster_threshold")]
    pub cluster_threshold: f64,
    /// Pairwise relation discovery is restricted to the top-N entries by
    /// relevance, keeping the correlator sub-quadratic in practice.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            dedup_similarity: default_dedup_similarity(),
            dedup_window_secs: default_dedup_window_secs(),
            overlap_similarity: default_overlap_similarity(),
            temporal_window_secs: default_temporal_window_secs(),
            cluster_threshold: default_cluster_threshold(),
            max_candidates: default_max_candidates(),
        }
    }
}

fn default_dedup_similarity() -> f64 {
    0.85
}
fn default_dedup_window_secs() -> i64 {
    300
}
fn default_overlap_similarity() -> f64 {
    0.3
}
fn default_temporal_window_secs() -> i64 {
    3600
}
fn default_cluster_threshold() -> f64 {
    0.5
}
fn default_max_candidates() -> usize {
    200
}

/// Orchestrator-level settings.
#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    /// Default maximum number of ranked results.
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
    /// Raw candidates requested from each source.
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    /// Per-source fetch deadline. A source that misses it is recorded as
    /// unavailable; its late response is discarded.
    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            final_limit: default_final_limit(),
            candidate_limit: default_candidate_limit(),
            source_timeout_secs: default_source_timeout_secs(),
        }
    }
}

fn default_final_limit() -> usize {
    10
}
fn default_candidate_limit() -> usize {
    100
}
fn default_source_timeout_secs() -> u64 {
    5
}

/// Synthesis collaborator settings.
#[derive(Debug, Deserialize, Clone)]
pub struct SynthesisConfig {
    /// `disabled` or `anthropic`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_synthesis_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Answers longer than this are truncated during validation.
    #[serde(default = "default_max_answer_chars")]
    pub max_answer_chars: usize,
}

impl SynthesisConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            timeout_secs: default_synthesis_timeout_secs(),
            max_retries: default_max_retries(),
            max_answer_chars: default_max_answer_chars(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_synthesis_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    5
}
fn default_max_answer_chars() -> usize {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7431".to_string()
}

/// Connector instances, keyed by instance name.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConnectorsConfig {
    #[serde(default)]
    pub file: BTreeMap<String, FileConnectorConfig>,
}

/// A file connector serving raw records from a JSON file on disk.
#[derive(Debug, Deserialize, Clone)]
pub struct FileConnectorConfig {
    pub path: PathBuf,
    /// Which source the records in this file belong to.
    pub source: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// A config with all defaults, for tools and tests that need no file on disk.
impl Config {
    pub fn minimal() -> Config {
        Config::default()
    }
}

fn validate(config: &Config) -> Result<()> {
    let s = &config.scoring;
    for (name, value) in [
        ("scoring.lexical_weight", s.lexical_weight),
        ("scoring.recency_weight", s.recency_weight),
        ("scoring.source_weight", s.source_weight),
        ("scoring.min_score", s.min_score),
    ] {
        if !(0.0..=1.0).contains(&value) {
            anyhow::bail!("{} must be in [0.0, 1.0]", name);
        }
    }
    if s.half_life_days <= 0.0 {
        anyhow::bail!("scoring.half_life_days must be > 0");
    }
    for (source, priority) in &s.source_priority {
        if Source::parse(source).is_none() {
            anyhow::bail!(
                "Unknown source in scoring.source_priority: '{}'. \
                 Must be code-repo, chat, issue-tracker, or document.",
                source
            );
        }
        if !(0.0..=1.0).contains(priority) {
            anyhow::bail!("scoring.source_priority.{} must be in [0.0, 1.0]", source);
        }
    }

    let c = &config.correlation;
    for (name, value) in [
        ("correlation.dedup_similarity", c.dedup_similarity),
        ("correlation.overlap_similarity", c.overlap_similarity),
        ("correlation.cluster_threshold", c.cluster_threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            anyhow::bail!("{} must be in [0.0, 1.0]", name);
        }
    }
    if c.dedup_window_secs < 0 || c.temporal_window_secs <= 0 {
        anyhow::bail!("correlation windows must be positive");
    }
    if c.max_candidates == 0 {
        anyhow::bail!("correlation.max_candidates must be >= 1");
    }

    if config.query.final_limit < 1 {
        anyhow::bail!("query.final_limit must be >= 1");
    }
    if config.query.candidate_limit < 1 {
        anyhow::bail!("query.candidate_limit must be >= 1");
    }
    if config.query.source_timeout_secs == 0 {
        anyhow::bail!("query.source_timeout_secs must be >= 1");
    }

    match config.synthesis.provider.as_str() {
        "disabled" | "anthropic" => {}
        other => anyhow::bail!(
            "Unknown synthesis provider: '{}'. Must be disabled or anthropic.",
            other
        ),
    }
    if config.synthesis.is_enabled() && config.synthesis.model.is_none() {
        anyhow::bail!(
            "synthesis.model must be specified when provider is '{}'",
            config.synthesis.provider
        );
    }

    for (name, file) in &config.connectors.file {
        if Source::parse(&file.source).is_none() {
            anyhow::bail!(
                "Unknown source for connector 'file.{}': '{}'. \
                 Must be code-repo, chat, issue-tracker, or document.",
                name,
                file.source
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        validate(&Config::minimal()).unwrap();
    }

    #[test]
    fn test_default_weights() {
        let s = ScoringConfig::default();
        assert!((s.lexical_weight - 0.5).abs() < 1e-9);
        assert!((s.recency_weight - 0.2).abs() < 1e-9);
        assert!((s.source_weight - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [scoring]
            half_life_days = 7.0

            [query]
            final_limit = 5

            [connectors.file.team-chat]
            path = "./data/chat.json"
            source = "chat"
            "#,
        )
        .unwrap();
        validate(&config).unwrap();
        assert!((config.scoring.half_life_days - 7.0).abs() < 1e-9);
        assert_eq!(config.query.final_limit, 5);
        assert_eq!(config.connectors.file.len(), 1);
        // Untouched sections keep their defaults.
        assert!((config.correlation.cluster_threshold - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_out_of_range_weight() {
        let config: Config = toml::from_str(
            r#"
            [scoring]
            lexical_weight = 1.5
            "#,
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_unknown_source_priority() {
        let config: Config = toml::from_str(
            r#"
            [scoring.source_priority]
            gitlab = 0.5
            "#,
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_zero_limit() {
        let config: Config = toml::from_str(
            r#"
            [query]
            final_limit = 0
            "#,
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_synthesis_requires_model() {
        let config: Config = toml::from_str(
            r#"
            [synthesis]
            provider = "anthropic"
            "#,
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_source_priority_fallback() {
        let mut s = ScoringConfig::default();
        s.source_priority.clear();
        assert!((s.priority(Source::Chat) - 0.8).abs() < 1e-9);
    }
}
