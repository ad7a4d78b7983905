//! End-to-end pipeline tests through the public library API.
//!
//! Source collaborators are simulated with purpose-built connectors
//! (static, failing, slow, counting) so every failure mode of the fan-out
//! is exercised without network access.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use context_oracle::config::Config;
use context_oracle::error::OracleError;
use context_oracle::models::{
    CorrelationKind, RawCommit, RawMessage, RawRecord, RawTicket, Source,
};
use context_oracle::query::{run_query, QueryRequest};
use context_oracle::sources::{SourceConnector, SourceRegistry, StaticConnector};

// ============ Test connectors ============

/// Always errors, like a service with revoked credentials.
struct FailingConnector {
    source: Source,
}

#[async_trait]
impl SourceConnector for FailingConnector {
    fn name(&self) -> &str {
        "failing"
    }
    fn source(&self) -> Source {
        self.source
    }
    fn description(&self) -> &str {
        "Always fails"
    }
    async fn fetch_candidates(&self, _query: &str, _limit: usize) -> Result<Vec<RawRecord>> {
        anyhow::bail!("credentials revoked")
    }
}

/// Sleeps past any reasonable deadline before answering.
struct SlowConnector {
    source: Source,
}

#[async_trait]
impl SourceConnector for SlowConnector {
    fn name(&self) -> &str {
        "slow"
    }
    fn source(&self) -> Source {
        self.source
    }
    fn description(&self) -> &str {
        "Never answers in time"
    }
    async fn fetch_candidates(&self, _query: &str, _limit: usize) -> Result<Vec<RawRecord>> {
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        Ok(Vec::new())
    }
}

/// Counts fetch calls, for verifying that invalid queries never fetch.
struct CountingConnector {
    source: Source,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl SourceConnector for CountingConnector {
    fn name(&self) -> &str {
        "counting"
    }
    fn source(&self) -> Source {
        self.source
    }
    fn description(&self) -> &str {
        "Counts fetches"
    }
    async fn fetch_candidates(&self, _query: &str, _limit: usize) -> Result<Vec<RawRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

// ============ Fixtures ============

fn commit_record(sha: &str, message: &str, minutes_ago: i64) -> RawRecord {
    RawRecord::CodeRepo(RawCommit {
        sha: Some(sha.to_string()),
        message: message.to_string(),
        author: Some("alex".to_string()),
        timestamp: Some((Utc::now() - Duration::minutes(minutes_ago)).to_rfc3339()),
        url: None,
    })
}

fn chat_record(ts: &str, text: &str, minutes_ago: i64) -> RawRecord {
    RawRecord::Chat(RawMessage {
        channel: Some("tech".to_string()),
        ts: Some(ts.to_string()),
        text: text.to_string(),
        sender: Some("sarah".to_string()),
        timestamp: Some((Utc::now() - Duration::minutes(minutes_ago)).to_rfc3339()),
        permalink: None,
    })
}

fn ticket_record(key: &str, summary: &str, description: &str, minutes_ago: i64) -> RawRecord {
    RawRecord::IssueTracker(RawTicket {
        key: Some(key.to_string()),
        summary: Some(summary.to_string()),
        description: description.to_string(),
        reporter: Some("mike".to_string()),
        status: Some("open".to_string()),
        updated_at: Some((Utc::now() - Duration::minutes(minutes_ago)).to_rfc3339()),
        url: None,
    })
}

fn fast_timeout_config() -> Config {
    let mut config = Config::minimal();
    config.query.source_timeout_secs = 1;
    config
}

// ============ Scenarios ============

#[tokio::test]
async fn test_reference_between_commit_and_chat_clusters_them() {
    // A commit and a chat message posted minutes later referencing its
    // hash: one explicit-reference edge of strength 1.0, one cluster, one
    // ranked representative instead of two separate entries.
    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(StaticConnector::new(
        "repo",
        Source::CodeRepo,
        vec![commit_record(
            "9c4b2f1a",
            "Add redis cache invalidation for hot keys",
            15,
        )],
    )));
    registry.register(Arc::new(StaticConnector::new(
        "chat",
        Source::Chat,
        vec![chat_record(
            "1001",
            "merged 9c4b2f1a, redis over postgres for caching",
            5,
        )],
    )));

    let mut request = QueryRequest::new("redis postgres caching");
    request.sources = vec![Source::CodeRepo, Source::Chat];

    let result = run_query(&registry, &Config::minimal(), &request)
        .await
        .unwrap();

    let reference = result
        .correlations
        .iter()
        .find(|c| c.kind == CorrelationKind::ExplicitReference)
        .expect("explicit reference edge");
    assert!((reference.strength - 1.0).abs() < 1e-9);

    assert_eq!(result.ranked_entries.len(), 1, "one representative, not two");
    assert_eq!(result.clusters.len(), 1);
    assert_eq!(result.clusters[0].members.len(), 2);

    // The chat message matches all three query terms; it outranks the commit.
    let representative = &result.ranked_entries[0].entry;
    assert_eq!(representative.source, Source::Chat);
    assert_eq!(result.clusters[0].representative, representative.id);
}

#[tokio::test]
async fn test_partial_source_failure_scales_confidence() {
    // 2 of 3 sources fail: the query still succeeds, sources_used names
    // exactly the survivor, and confidence is exactly one third of the
    // non-degraded value.
    let chat_records = vec![chat_record("1001", "redis caching rollout", 5)];

    let mut degraded = SourceRegistry::new();
    degraded.register(Arc::new(StaticConnector::new(
        "chat",
        Source::Chat,
        chat_records.clone(),
    )));
    degraded.register(Arc::new(FailingConnector {
        source: Source::CodeRepo,
    }));
    degraded.register(Arc::new(FailingConnector {
        source: Source::IssueTracker,
    }));

    let mut healthy = SourceRegistry::new();
    healthy.register(Arc::new(StaticConnector::new(
        "chat",
        Source::Chat,
        chat_records,
    )));

    let mut request = QueryRequest::new("redis caching");
    request.sources = vec![Source::Chat, Source::CodeRepo, Source::IssueTracker];

    let degraded_result = run_query(&degraded, &Config::minimal(), &request)
        .await
        .unwrap();

    let baseline = run_query(&healthy, &Config::minimal(), &QueryRequest::new("redis caching"))
        .await
        .unwrap();

    assert_eq!(
        degraded_result.sources_used.iter().copied().collect::<Vec<_>>(),
        vec![Source::Chat]
    );
    assert_eq!(
        degraded_result.ranked_entries.len(),
        baseline.ranked_entries.len()
    );
    assert!(
        (degraded_result.confidence_score - baseline.confidence_score / 3.0).abs() < 1e-6,
        "expected exactly 1/3 scaling, got {} vs {}",
        degraded_result.confidence_score,
        baseline.confidence_score
    );
}

#[tokio::test]
async fn test_zero_limit_rejected_before_any_fetch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(CountingConnector {
        source: Source::Chat,
        calls: calls.clone(),
    }));

    let mut request = QueryRequest::new("redis");
    request.limit = Some(0);

    let err = run_query(&registry, &Config::minimal(), &request)
        .await
        .unwrap_err();
    assert!(matches!(err, OracleError::InvalidQuery(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0, "fetch was attempted");
}

#[tokio::test]
async fn test_zero_context_window_rejected_before_any_fetch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(CountingConnector {
        source: Source::Chat,
        calls: calls.clone(),
    }));

    let mut request = QueryRequest::new("redis");
    request.context_window = Some(0);

    let err = run_query(&registry, &Config::minimal(), &request)
        .await
        .unwrap_err();
    assert!(matches!(err, OracleError::InvalidQuery(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_context_window_bounds_candidates_per_source() {
    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(StaticConnector::new(
        "chat",
        Source::Chat,
        vec![
            chat_record("1001", "redis eviction tuning", 5),
            chat_record("1002", "postgres vacuum schedule", 10),
            chat_record("1003", "caching rollout roadmap", 15),
        ],
    )));

    let mut request = QueryRequest::new("redis postgres caching");
    request.context_window = Some(1);

    let result = run_query(&registry, &Config::minimal(), &request)
        .await
        .unwrap();
    assert_eq!(result.ranked_entries.len(), 1);
}

#[tokio::test]
async fn test_empty_query_rejected_before_any_fetch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(CountingConnector {
        source: Source::Chat,
        calls: calls.clone(),
    }));

    let err = run_query(&registry, &Config::minimal(), &QueryRequest::new(""))
        .await
        .unwrap_err();
    assert!(matches!(err, OracleError::InvalidQuery(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_all_sources_timing_out_yields_empty_result() {
    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(SlowConnector {
        source: Source::Chat,
    }));
    registry.register(Arc::new(SlowConnector {
        source: Source::CodeRepo,
    }));

    let result = run_query(
        &registry,
        &fast_timeout_config(),
        &QueryRequest::new("redis"),
    )
    .await
    .unwrap();

    assert!(result.ranked_entries.is_empty());
    assert!(result.clusters.is_empty());
    assert!(result.sources_used.is_empty());
    assert_eq!(result.confidence_score, 0.0);
}

#[tokio::test]
async fn test_slow_source_does_not_block_fast_ones() {
    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(SlowConnector {
        source: Source::CodeRepo,
    }));
    registry.register(Arc::new(StaticConnector::new(
        "chat",
        Source::Chat,
        vec![chat_record("1001", "redis caching rollout", 5)],
    )));

    let result = run_query(
        &registry,
        &fast_timeout_config(),
        &QueryRequest::new("redis"),
    )
    .await
    .unwrap();

    assert_eq!(result.ranked_entries.len(), 1);
    assert_eq!(
        result.sources_used.iter().copied().collect::<Vec<_>>(),
        vec![Source::Chat]
    );
    // The deadline, not the slow source, bounds the query.
    assert!(result.execution_time < std::time::Duration::from_secs(5));
}

#[tokio::test]
async fn test_ranking_is_deterministic_across_runs() {
    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(StaticConnector::new(
        "repo",
        Source::CodeRepo,
        vec![
            commit_record("aaa1111b", "redis cache layer", 30),
            commit_record("bbb2222c", "postgres migration cleanup", 60),
        ],
    )));
    registry.register(Arc::new(StaticConnector::new(
        "tracker",
        Source::IssueTracker,
        vec![ticket_record(
            "PROJ-123",
            "Rate limiting",
            "Use redis for distributed rate limiting",
            120,
        )],
    )));

    let request = QueryRequest::new("redis postgres");
    let first = run_query(&registry, &Config::minimal(), &request)
        .await
        .unwrap();
    let second = run_query(&registry, &Config::minimal(), &request)
        .await
        .unwrap();

    let first_ids: Vec<&str> = first
        .ranked_entries
        .iter()
        .map(|e| e.entry.id.as_str())
        .collect();
    let second_ids: Vec<&str> = second
        .ranked_entries
        .iter()
        .map(|e| e.entry.id.as_str())
        .collect();
    assert_eq!(first_ids, second_ids);
}

#[tokio::test]
async fn test_limit_truncates_ranked_entries() {
    // Distinct vocabularies per ticket: only "redis" is shared, so nothing
    // clusters and the limit is what truncates.
    let topics = [
        "outage in the caching tier",
        "memory pressure on session storage",
        "failover drill for the primary",
        "slowlog audit of lua scripts",
        "eviction policy tuning",
        "connection pool exhaustion",
        "replication lag alerting",
        "cluster resharding plan",
    ];
    let records: Vec<RawRecord> = topics
        .iter()
        .enumerate()
        .map(|(i, topic)| {
            ticket_record(
                &format!("PROJ-{}", 100 + i),
                &format!("redis incident {}", i),
                &format!("redis {}", topic),
                (i as i64 + 1) * 600,
            )
        })
        .collect();

    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(StaticConnector::new(
        "tracker",
        Source::IssueTracker,
        records,
    )));

    let mut request = QueryRequest::new("redis");
    request.limit = Some(3);

    let result = run_query(&registry, &Config::minimal(), &request)
        .await
        .unwrap();
    assert_eq!(result.ranked_entries.len(), 3);
    assert_eq!(result.clusters.len(), 3);
}

#[tokio::test]
async fn test_clusters_partition_results() {
    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(StaticConnector::new(
        "repo",
        Source::CodeRepo,
        vec![
            commit_record("aaa1111b", "redis cache layer for sessions", 10),
            commit_record("ccc3333d", "frontend styling pass", 2000),
        ],
    )));
    registry.register(Arc::new(StaticConnector::new(
        "chat",
        Source::Chat,
        vec![chat_record("1001", "redis cache layer looks good", 8)],
    )));

    let mut config = Config::minimal();
    config.query.final_limit = 50;
    // Keep everything retrievable so the partition covers all entries.
    config.scoring.min_score = 0.0;

    let result = run_query(&registry, &config, &QueryRequest::new("redis cache"))
        .await
        .unwrap();

    let mut member_ids: Vec<&str> = result
        .clusters
        .iter()
        .flat_map(|c| c.members.iter().map(|m| m.as_str()))
        .collect();
    member_ids.sort();
    let before = member_ids.len();
    member_ids.dedup();
    assert_eq!(before, member_ids.len(), "an entry appears in two clusters");
    assert_eq!(member_ids.len(), 3, "partition misses entries");
}
