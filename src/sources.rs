//! Source connector trait and registry.
//!
//! A connector wraps one external system (a repository host, a chat
//! workspace, a ticket tracker, a wiki) and answers candidate queries with
//! raw records. The orchestrator fans out to one task per requested source
//! and treats any connector failure or timeout as "zero candidates from
//! this source" — a connector can never fail a query.
//!
//! # Usage
//!
//! ```rust
//! use context_oracle::sources::{SourceRegistry, StaticConnector};
//! use context_oracle::models::Source;
//!
//! let mut registry = SourceRegistry::new();
//! registry.register(std::sync::Arc::new(StaticConnector::new(
//!     "demo-chat",
//!     Source::Chat,
//!     vec![],
//! )));
//! assert_eq!(registry.len(), 1);
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::config::Config;
use crate::connector_file::FileConnector;
use crate::models::{RawRecord, Source};

/// A data source collaborator that produces raw candidate records.
///
/// Implementations may perform I/O; they run on the tokio runtime inside a
/// per-source fetch task with its own deadline. A connector must return
/// records belonging to its declared [`source`](SourceConnector::source).
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Instance name (e.g. `"team-chat"`, `"platform-repo"`).
    fn name(&self) -> &str;

    /// Which source category this connector serves.
    fn source(&self) -> Source;

    /// One-line description, shown by `cxo sources` and `GET /sources`.
    fn description(&self) -> &str;

    /// Whether the connector can currently be queried (e.g. its backing
    /// file exists). Purely informational; an unhealthy connector is still
    /// asked and simply fails into "source unavailable".
    fn healthy(&self) -> bool {
        true
    }

    /// Fetch up to `limit` raw candidate records for the query text.
    async fn fetch_candidates(&self, query: &str, limit: usize) -> Result<Vec<RawRecord>>;
}

/// Health/status row for one connector.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub source: Source,
    pub description: String,
    pub healthy: bool,
}

/// Registry of configured connectors.
///
/// Connectors are stored behind `Arc` so per-source fetch tasks can hold a
/// clone across an await without borrowing the registry.
pub struct SourceRegistry {
    connectors: Vec<Arc<dyn SourceConnector>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            connectors: Vec::new(),
        }
    }

    /// Build a registry from all connector instances in the config.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        for (name, cfg) in &config.connectors.file {
            registry.register(Arc::new(FileConnector::new(name.clone(), cfg.clone())));
        }
        registry
    }

    pub fn register(&mut self, connector: Arc<dyn SourceConnector>) {
        self.connectors.push(connector);
    }

    pub fn connectors(&self) -> &[Arc<dyn SourceConnector>] {
        &self.connectors
    }

    /// Connectors serving one source category.
    pub fn for_source(&self, source: Source) -> Vec<Arc<dyn SourceConnector>> {
        self.connectors
            .iter()
            .filter(|c| c.source() == source)
            .cloned()
            .collect()
    }

    /// The set of source categories with at least one connector.
    pub fn sources(&self) -> Vec<Source> {
        Source::ALL
            .into_iter()
            .filter(|s| self.connectors.iter().any(|c| c.source() == *s))
            .collect()
    }

    pub fn statuses(&self) -> Vec<SourceStatus> {
        self.connectors
            .iter()
            .map(|c| SourceStatus {
                name: c.name().to_string(),
                source: c.source(),
                description: c.description().to_string(),
                healthy: c.healthy(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A connector serving a fixed in-memory record set.
///
/// The built-in demo dataset and the test suites run on this; it answers
/// every query with its records, truncated to the requested limit.
pub struct StaticConnector {
    name: String,
    source: Source,
    records: Vec<RawRecord>,
}

impl StaticConnector {
    pub fn new(name: impl Into<String>, source: Source, records: Vec<RawRecord>) -> Self {
        Self {
            name: name.into(),
            source,
            records,
        }
    }
}

#[async_trait]
impl SourceConnector for StaticConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> Source {
        self.source
    }

    fn description(&self) -> &str {
        "Fixed in-memory record set"
    }

    async fn fetch_candidates(&self, _query: &str, limit: usize) -> Result<Vec<RawRecord>> {
        Ok(self.records.iter().take(limit).cloned().collect())
    }
}
