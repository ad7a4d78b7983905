//! Correlation: deduplication, relation discovery, and clustering.
//!
//! A pure function of its input — no hidden state, no clock reads — so the
//! same scored candidate set always produces the same deduplicated set,
//! relations, and clusters.
//!
//! # Pipeline
//!
//! 1. **Deduplicate** — two entries merge when they share source + type,
//!    their tag sets are nearly identical (Jaccard ≥ `dedup_similarity`),
//!    AND their timestamps fall within `dedup_window_secs`. The time window
//!    guards against merging genuinely distinct events that happen to share
//!    vocabulary. The higher-relevance entry survives; ties go to the more
//!    recent one.
//! 2. **Discover relations** — pairwise over the top `max_candidates`
//!    entries by relevance:
//!    - *explicit reference*: one entry's text contains the other's literal
//!      identifier (commit sha, ticket key) — strength `1.0`;
//!    - *textual overlap*: tag Jaccard ≥ `overlap_similarity` — strength is
//!      the similarity itself;
//!    - *temporal proximity*: within `temporal_window_secs` and sharing at
//!      least one tag — strength decays linearly with the gap.
//! 3. **Cluster** — union-find over entry indices, joining pairs connected
//!    by any relation of strength ≥ `cluster_threshold`. Every connected
//!    component becomes one cluster; entries with no qualifying edge stand
//!    alone. Clusters partition the deduplicated set exactly.

use std::collections::BTreeSet;

use crate::config::CorrelationConfig;
use crate::models::{Cluster, Correlation, CorrelationKind, ScoredEntry};

/// Minimum identifier length considered for explicit-reference matching;
/// shorter keys (bare issue numbers like "42") produce too many false hits.
const MIN_REFERENCE_KEY_LEN: usize = 4;

/// Deduplicate, relate, and cluster a scored candidate set.
///
/// Returns the deduplicated entries (relevance order), the clusters
/// partitioning them, and all discovered correlations. Empty input yields
/// empty output, never an error.
pub fn correlate(
    scored: Vec<ScoredEntry>,
    config: &CorrelationConfig,
) -> (Vec<ScoredEntry>, Vec<Cluster>, Vec<Correlation>) {
    if scored.is_empty() {
        return (Vec::new(), Vec::new(), Vec::new());
    }

    let entries = dedup(scored, config);
    let correlations = discover_relations(&entries, config);
    let clusters = build_clusters(&entries, &correlations, config.cluster_threshold);

    (entries, clusters, correlations)
}

/// Jaccard similarity of two tag sets. Empty-vs-anything is `0.0`.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

/// Sort by relevance (desc), then timestamp (desc), then id (asc) — the
/// canonical order every downstream stage relies on for determinism.
fn sort_by_relevance(entries: &mut [ScoredEntry]) {
    entries.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.entry.timestamp.cmp(&a.entry.timestamp))
            .then(a.entry.id.cmp(&b.entry.id))
    });
}

fn dedup(mut scored: Vec<ScoredEntry>, config: &CorrelationConfig) -> Vec<ScoredEntry> {
    // Highest relevance first, so the survivor of any duplicate pair is
    // always already in `kept` when its duplicate comes along.
    sort_by_relevance(&mut scored);

    let mut kept: Vec<ScoredEntry> = Vec::with_capacity(scored.len());
    for candidate in scored {
        // Two connectors can hand back the same record (same id, possibly
        // different revisions); ids must be unique in the result.
        let duplicate = kept.iter().any(|existing| {
            existing.entry.id == candidate.entry.id
                || (existing.entry.source == candidate.entry.source
                    && existing.entry.entry_type == candidate.entry.entry_type
                    && (existing.entry.timestamp - candidate.entry.timestamp)
                        .num_seconds()
                        .abs()
                        <= config.dedup_window_secs
                    && jaccard(&existing.entry.tags, &candidate.entry.tags)
                        >= config.dedup_similarity)
        });
        if !duplicate {
            kept.push(candidate);
        }
    }
    kept
}

/// Pairwise relation discovery over the top `max_candidates` entries.
/// `entries` is already in relevance order, so the bound keeps the most
/// relevant candidates. Entries beyond the bound still cluster — as
/// singletons.
fn discover_relations(entries: &[ScoredEntry], config: &CorrelationConfig) -> Vec<Correlation> {
    let bound = entries.len().min(config.max_candidates);
    let mut correlations = Vec::new();

    for i in 0..bound {
        for j in (i + 1)..bound {
            let a = &entries[i].entry;
            let b = &entries[j].entry;

            if contains_reference(&a.content, &b.id) || contains_reference(&b.content, &a.id) {
                correlations.push(Correlation {
                    a: a.id.clone(),
                    b: b.id.clone(),
                    kind: CorrelationKind::ExplicitReference,
                    strength: 1.0,
                });
            }

            let similarity = jaccard(&a.tags, &b.tags);
            if similarity >= config.overlap_similarity {
                correlations.push(Correlation {
                    a: a.id.clone(),
                    b: b.id.clone(),
                    kind: CorrelationKind::TextualOverlap,
                    strength: similarity,
                });
            }

            let gap = (a.timestamp - b.timestamp).num_seconds().abs();
            if gap <= config.temporal_window_secs && shares_tag(&a.tags, &b.tags) {
                let strength = 1.0 - gap as f64 / config.temporal_window_secs as f64;
                correlations.push(Correlation {
                    a: a.id.clone(),
                    b: b.id.clone(),
                    kind: CorrelationKind::Temporal,
                    strength,
                });
            }
        }
    }

    correlations
}

/// Does `content` literally mention the natural key of `entry_id`
/// (the part after the `source:` prefix)?
fn contains_reference(content: &str, entry_id: &str) -> bool {
    let Some((_, key)) = entry_id.split_once(':') else {
        return false;
    };
    if key.len() < MIN_REFERENCE_KEY_LEN {
        return false;
    }
    content.to_lowercase().contains(&key.to_lowercase())
}

fn shares_tag(a: &BTreeSet<String>, b: &BTreeSet<String>) -> bool {
    a.intersection(b).next().is_some()
}

/// Disjoint-set over entry indices. Arena-style: merge and find are
/// allocation-free once constructed.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            // Path halving.
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            // Deterministic: lower index wins the root.
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

fn build_clusters(
    entries: &[ScoredEntry],
    correlations: &[Correlation],
    cluster_threshold: f64,
) -> Vec<Cluster> {
    let index_of: std::collections::HashMap<&str, usize> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| (e.entry.id.as_str(), i))
        .collect();

    let mut sets = DisjointSet::new(entries.len());
    for correlation in correlations {
        if correlation.strength < cluster_threshold {
            continue;
        }
        if let (Some(&a), Some(&b)) = (
            index_of.get(correlation.a.as_str()),
            index_of.get(correlation.b.as_str()),
        ) {
            sets.union(a, b);
        }
    }

    // Entries are in relevance order, so the first index seen for each root
    // is the highest-relevance member: the representative.
    let mut clusters: Vec<Cluster> = Vec::new();
    let mut cluster_of_root: std::collections::HashMap<usize, usize> =
        std::collections::HashMap::new();

    for (i, scored) in entries.iter().enumerate() {
        let root = sets.find(i);
        match cluster_of_root.get(&root) {
            Some(&c) => {
                clusters[c].members.push(scored.entry.id.clone());
            }
            None => {
                cluster_of_root.insert(root, clusters.len());
                clusters.push(Cluster {
                    representative: scored.entry.id.clone(),
                    members: vec![scored.entry.id.clone()],
                    relevance: scored.relevance_score,
                });
            }
        }
    }

    clusters
}
