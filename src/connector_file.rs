//! File connector: raw records from a JSON file on disk.
//!
//! The local-first stand-in for a live service integration. The file holds
//! a JSON array of raw records (each tagged with its `source`); the
//! connector filters them by naive keyword match against the query, the way
//! a remote service's search endpoint would.

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::FileConnectorConfig;
use crate::models::{RawRecord, Source};
use crate::normalize::tokenize;
use crate::sources::SourceConnector;

pub struct FileConnector {
    name: String,
    config: FileConnectorConfig,
    source: Source,
}

impl FileConnector {
    pub fn new(name: String, config: FileConnectorConfig) -> Self {
        // Config validation already rejected unknown source strings.
        let source = Source::parse(&config.source).unwrap_or(Source::Document);
        Self {
            name,
            config,
            source,
        }
    }
}

#[async_trait]
impl SourceConnector for FileConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> Source {
        self.source
    }

    fn description(&self) -> &str {
        "Raw records from a JSON file"
    }

    fn healthy(&self) -> bool {
        self.config.path.exists()
    }

    async fn fetch_candidates(&self, query: &str, limit: usize) -> Result<Vec<RawRecord>> {
        let content = tokio::fs::read_to_string(&self.config.path)
            .await
            .with_context(|| {
                format!("Failed to read records file: {}", self.config.path.display())
            })?;

        let records: Vec<RawRecord> = serde_json::from_str(&content).with_context(|| {
            format!("Failed to parse records file: {}", self.config.path.display())
        })?;

        let query_terms = tokenize(query);
        let mut matches: Vec<RawRecord> = records
            .into_iter()
            .filter(|r| r.source() == self.source)
            .filter(|r| matches_query(r, &query_terms))
            .collect();
        matches.truncate(limit);
        Ok(matches)
    }
}

/// Naive keyword match: any query term appears in the record's text.
/// An empty query matches everything (recency/source scoring decides).
fn matches_query(record: &RawRecord, query_terms: &[String]) -> bool {
    if query_terms.is_empty() {
        return true;
    }
    let text = record.text().to_lowercase();
    query_terms.iter().any(|term| text.contains(term))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_records(json: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    fn connector_for(file: &NamedTempFile, source: &str) -> FileConnector {
        FileConnector::new(
            "test".to_string(),
            FileConnectorConfig {
                path: file.path().to_path_buf(),
                source: source.to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_fetch_filters_by_keyword() {
        let file = write_records(
            r#"[
                {"source": "chat", "channel": "c", "ts": "1", "text": "redis caching decision"},
                {"source": "chat", "channel": "c", "ts": "2", "text": "lunch plans"}
            ]"#,
        );
        let connector = connector_for(&file, "chat");
        let records = connector.fetch_candidates("redis", 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].text().contains("redis"));
    }

    #[tokio::test]
    async fn test_fetch_skips_foreign_source_records() {
        let file = write_records(
            r#"[
                {"source": "chat", "channel": "c", "ts": "1", "text": "redis"},
                {"source": "code-repo", "sha": "abc1234", "message": "redis"}
            ]"#,
        );
        let connector = connector_for(&file, "chat");
        let records = connector.fetch_candidates("redis", 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source(), Source::Chat);
    }

    #[tokio::test]
    async fn test_empty_query_matches_everything() {
        let file = write_records(
            r#"[
                {"source": "chat", "channel": "c", "ts": "1", "text": "alpha"},
                {"source": "chat", "channel": "c", "ts": "2", "text": "beta"}
            ]"#,
        );
        let connector = connector_for(&file, "chat");
        let records = connector.fetch_candidates("", 10).await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_errors() {
        let connector = FileConnector::new(
            "test".to_string(),
            FileConnectorConfig {
                path: "/nonexistent/records.json".into(),
                source: "chat".to_string(),
            },
        );
        assert!(!connector.healthy());
        assert!(connector.fetch_candidates("q", 10).await.is_err());
    }
}
