//! Query orchestration: fan-out, normalize, score, correlate, rank.
//!
//! `run_query` is the one logical operation this crate exposes. It validates
//! the request up front (caller errors are the only hard failures, raised
//! before any fetch), fans out to one fetch task per requested source with a
//! per-source deadline, joins the survivors, and runs the deterministic
//! pipeline stages over the merged candidate set.
//!
//! # Failure semantics
//!
//! A source that errors or times out contributes zero candidates, is
//! excluded from `sources_used`, and scales down `confidence_score` — it
//! never fails the query. Partial results are valid results. If the caller
//! drops the returned future (client disconnect), the fetch task set is
//! dropped with it and all in-flight fetches are aborted; no partial result
//! is constructed.

use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::correlate::correlate;
use crate::error::{OracleError, Result};
use crate::models::{QueryResponse, QueryResult, RawRecord, Source};
use crate::normalize::normalize_all;
use crate::rank::select;
use crate::score::{score_all, tokenize_query};
use crate::sources::{SourceConnector, SourceRegistry};
use crate::synthesis::{validate_answer, Synthesizer};

/// One query as received from the caller.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub text: String,
    /// Sources to consult; empty means every configured source.
    pub sources: Vec<Source>,
    /// Result budget; `None` means the configured default.
    pub limit: Option<usize>,
    /// Raw candidates requested per source; `None` means the configured
    /// default.
    pub context_window: Option<usize>,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sources: Vec::new(),
            limit: None,
            context_window: None,
        }
    }
}

/// Run one query end to end and return the immutable result.
pub async fn run_query(
    registry: &SourceRegistry,
    config: &Config,
    request: &QueryRequest,
) -> Result<QueryResult> {
    let started = Instant::now();

    // Caller-input validation: everything below this block may only fail
    // per-source, never as a whole.
    let text = request.text.trim();
    if text.is_empty() {
        return Err(OracleError::invalid_query("query text must not be empty"));
    }
    let limit = request.limit.unwrap_or(config.query.final_limit);
    if limit == 0 {
        return Err(OracleError::invalid_query("limit must be a positive integer"));
    }
    let candidate_limit = request.context_window.unwrap_or(config.query.candidate_limit);
    if candidate_limit == 0 {
        return Err(OracleError::invalid_query(
            "context window must be a positive integer",
        ));
    }
    let requested: Vec<Source> = if request.sources.is_empty() {
        registry.sources()
    } else {
        let mut seen = BTreeSet::new();
        request
            .sources
            .iter()
            .copied()
            .filter(|s| seen.insert(*s))
            .collect()
    };
    if requested.is_empty() {
        return Err(OracleError::invalid_query("no sources configured"));
    }
    for &source in &requested {
        if registry.for_source(source).is_empty() {
            return Err(OracleError::invalid_query(format!(
                "no connector configured for source '{}'",
                source
            )));
        }
    }

    info!(query = text, sources = ?requested, limit, "running query");

    // Fan out: one cancellable task per requested source, each with its own
    // deadline. Tasks share nothing; record lists merge only at the join.
    let timeout = Duration::from_secs(config.query.source_timeout_secs);
    let mut tasks = tokio::task::JoinSet::new();
    for &source in &requested {
        let connectors = registry.for_source(source);
        let query = text.to_string();
        tasks.spawn(async move {
            let outcome =
                tokio::time::timeout(timeout, fetch_source(&connectors, &query, candidate_limit))
                    .await;
            let result = match outcome {
                Ok(Ok(records)) => Ok(records),
                Ok(Err(reason)) => Err(reason),
                Err(_) => Err(format!("timed out after {}s", timeout.as_secs())),
            };
            (source, result)
        });
    }

    let mut raws: Vec<RawRecord> = Vec::new();
    let mut sources_used: BTreeSet<Source> = BTreeSet::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((source, Ok(records))) => {
                debug!(%source, count = records.len(), "source responded");
                sources_used.insert(source);
                raws.extend(records);
            }
            Ok((source, Err(reason))) => {
                let err = OracleError::SourceUnavailable { name: source, reason };
                warn!("{}", err);
            }
            Err(join_err) => {
                warn!(error = %join_err, "source fetch task failed to join");
            }
        }
    }

    // Single-threaded, deterministic stages over the merged candidates.
    let now = Utc::now();
    let (entries, timestamp_fallbacks) = normalize_all(&raws, now);
    if timestamp_fallbacks > 0 {
        warn!(
            count = timestamp_fallbacks,
            "records normalized with low-confidence timestamps"
        );
    }

    let query_terms = tokenize_query(text);
    let scored = score_all(entries, &query_terms, now, &config.scoring);
    let (deduped, clusters, correlations) = correlate(scored, &config.correlation);
    let (ranked_entries, clusters) = select(clusters, &deduped, limit)?;

    let confidence_score = confidence(
        &ranked_entries.iter().map(|e| e.relevance_score).collect::<Vec<_>>(),
        sources_used.len(),
        requested.len(),
    );

    let result = QueryResult {
        query: text.to_string(),
        ranked_entries,
        clusters,
        correlations,
        sources_used,
        confidence_score,
        execution_time: started.elapsed(),
    };

    info!(
        results = result.ranked_entries.len(),
        confidence = result.confidence_score,
        elapsed_ms = result.execution_time.as_millis() as u64,
        "query complete"
    );

    Ok(result)
}

/// Run a query and, when a synthesizer is supplied, attach its prose answer.
///
/// Synthesis failure is absorbed: the response carries the full retrieval
/// result with `answer: None`, and the caller decides whether raw evidence
/// is enough.
pub async fn answer_query(
    registry: &SourceRegistry,
    config: &Config,
    synthesizer: Option<&dyn Synthesizer>,
    request: &QueryRequest,
) -> Result<QueryResponse> {
    let result = run_query(registry, config, request).await?;

    let answer = match synthesizer {
        Some(synthesizer) => {
            match synthesizer
                .synthesize(&result.query, &result.ranked_entries)
                .await
                .and_then(|a| validate_answer(&a, config.synthesis.max_answer_chars))
            {
                Ok(answer) => Some(answer),
                Err(e) => {
                    let err = OracleError::SynthesisUnavailable(e.to_string());
                    warn!("{}", err);
                    None
                }
            }
        }
        None => None,
    };

    Ok(QueryResponse {
        query_id: Uuid::new_v4().to_string(),
        result,
        answer,
    })
}

/// Fetch candidates from every connector of one source. Individual
/// connector failures are tolerated as long as at least one connector
/// delivers; a source with only failures is unavailable.
async fn fetch_source(
    connectors: &[Arc<dyn SourceConnector>],
    query: &str,
    limit: usize,
) -> std::result::Result<Vec<RawRecord>, String> {
    let mut records = Vec::new();
    let mut delivered = false;
    let mut last_failure = None;

    for connector in connectors {
        match connector.fetch_candidates(query, limit).await {
            Ok(batch) => {
                delivered = true;
                records.extend(batch);
            }
            Err(e) => {
                last_failure = Some(format!("connector '{}': {}", connector.name(), e));
            }
        }
    }

    match (delivered, last_failure) {
        (false, Some(failure)) => Err(failure),
        _ => Ok(records),
    }
}

/// Mean relevance of the selected representatives, scaled by the fraction
/// of requested sources that actually responded — partial coverage must
/// not report as high confidence.
fn confidence(relevances: &[f64], responded: usize, requested: usize) -> f64 {
    if relevances.is_empty() || requested == 0 {
        return 0.0;
    }
    let mean = relevances.iter().sum::<f64>() / relevances.len() as f64;
    mean * (responded as f64 / requested as f64)
}
