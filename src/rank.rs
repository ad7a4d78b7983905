//! Cluster ranking and final result selection.
//!
//! Clusters are ordered by representative relevance (descending), then
//! cluster size (descending — more corroborating evidence ranks higher),
//! then representative timestamp (descending), then representative id
//! (ascending) so the ordering is total: the same input and config always
//! produce the same sequence.
//!
//! Only each cluster's representative is emitted as a ranked entry, but the
//! emitted clusters travel alongside with their full member lists for
//! evidence display.

use std::collections::HashMap;

use crate::error::{OracleError, Result};
use crate::models::{Cluster, ScoredEntry};

/// Order clusters, emit each representative, truncate to `limit`.
///
/// Returns the ranked representatives and the emitted clusters in matching
/// order. A non-positive `limit` is a caller configuration error.
pub fn select(
    mut clusters: Vec<Cluster>,
    entries: &[ScoredEntry],
    limit: usize,
) -> Result<(Vec<ScoredEntry>, Vec<Cluster>)> {
    if limit == 0 {
        return Err(OracleError::invalid_query("limit must be a positive integer"));
    }

    let by_id: HashMap<&str, &ScoredEntry> = entries
        .iter()
        .map(|e| (e.entry.id.as_str(), e))
        .collect();

    clusters.sort_by(|a, b| {
        let rep_a = by_id.get(a.representative.as_str());
        let rep_b = by_id.get(b.representative.as_str());
        let ts_a = rep_a.map(|e| e.entry.timestamp);
        let ts_b = rep_b.map(|e| e.entry.timestamp);

        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.members.len().cmp(&a.members.len()))
            .then(ts_b.cmp(&ts_a))
            .then(a.representative.cmp(&b.representative))
    });

    clusters.truncate(limit);

    let ranked: Vec<ScoredEntry> = clusters
        .iter()
        .filter_map(|c| by_id.get(c.representative.as_str()).map(|e| (*e).clone()))
        .collect();

    Ok((ranked, clusters))
}
