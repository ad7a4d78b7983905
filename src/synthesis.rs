//! Synthesis provider abstraction and implementations.
//!
//! Turns a ranked evidence set into a prose answer. Two providers:
//! - **[`DisabledSynthesizer`]** — returns errors; used when synthesis is
//!   not configured.
//! - **[`AnthropicSynthesizer`]** — calls the Anthropic Messages API with
//!   retry and backoff.
//!
//! The provider is an untrusted collaborator: its output is validated
//! (non-empty, length-capped) and any confidence it volunteers is ignored.
//! `confidence_score` on a query result comes from retrieval coverage and
//! relevance alone.
//!
//! # Retry Strategy
//!
//! Transient errors use exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SynthesisConfig;
use crate::models::ScoredEntry;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Trait for synthesis providers.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Returns the provider identifier (e.g. `"anthropic"`).
    fn provider_name(&self) -> &str;

    /// Produce a prose answer for the query from the ranked evidence.
    async fn synthesize(&self, query: &str, evidence: &[ScoredEntry]) -> Result<String>;
}

/// Instantiate the provider named by the configuration.
pub fn create_synthesizer(config: &SynthesisConfig) -> Result<Arc<dyn Synthesizer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledSynthesizer)),
        "anthropic" => Ok(Arc::new(AnthropicSynthesizer::new(config)?)),
        other => bail!("Unknown synthesis provider: {}", other),
    }
}

/// Validate a collaborator's answer: trimmed, non-empty, length-capped.
pub fn validate_answer(answer: &str, max_chars: usize) -> Result<String> {
    let trimmed = answer.trim();
    if trimmed.is_empty() {
        bail!("Synthesis returned an empty answer");
    }
    if trimmed.len() > max_chars {
        let mut cut = max_chars;
        while !trimmed.is_char_boundary(cut) {
            cut -= 1;
        }
        return Ok(format!("{}…", &trimmed[..cut]));
    }
    Ok(trimmed.to_string())
}

// ============ Disabled Provider ============

/// A no-op synthesis provider that always returns errors.
pub struct DisabledSynthesizer;

#[async_trait]
impl Synthesizer for DisabledSynthesizer {
    fn provider_name(&self) -> &str {
        "disabled"
    }

    async fn synthesize(&self, _query: &str, _evidence: &[ScoredEntry]) -> Result<String> {
        bail!("Synthesis provider is disabled")
    }
}

// ============ Anthropic Provider ============

/// Synthesis provider using the Anthropic Messages API.
///
/// Requires the `ANTHROPIC_API_KEY` environment variable.
pub struct AnthropicSynthesizer {
    model: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl AnthropicSynthesizer {
    pub fn new(config: &SynthesisConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("synthesis.model required for Anthropic provider"))?;

        if std::env::var("ANTHROPIC_API_KEY").is_err() {
            bail!("ANTHROPIC_API_KEY environment variable not set");
        }

        Ok(Self {
            model,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Synthesizer for AnthropicSynthesizer {
    fn provider_name(&self) -> &str {
        "anthropic"
    }

    async fn synthesize(&self, query: &str, evidence: &[ScoredEntry]) -> Result<String> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": 1024,
            "messages": [{ "role": "user", "content": build_prompt(query, evidence) }],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_anthropic_response(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "Anthropic API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Anthropic API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Synthesis failed after retries")))
    }
}

/// Render the evidence set into the synthesis prompt.
fn build_prompt(query: &str, evidence: &[ScoredEntry]) -> String {
    let mut prompt = String::from(
        "You are a development-context oracle. Answer the question using only \
         the evidence below, citing sources inline.\n\n",
    );
    prompt.push_str(&format!("QUESTION: {}\n\nEVIDENCE:\n", query));

    for scored in evidence {
        let entry = &scored.entry;
        prompt.push_str(&format!(
            "---\nSOURCE: {} ({})\nTITLE: {}\nAUTHOR: {}\nWHEN: {}\nCONTENT: {}\n",
            entry.source,
            entry.entry_type,
            entry.title.as_deref().unwrap_or("(untitled)"),
            entry.author.as_deref().unwrap_or("(unknown)"),
            entry.timestamp.format("%Y-%m-%d %H:%M"),
            entry.content,
        ));
    }

    if evidence.is_empty() {
        prompt.push_str("(no relevant evidence found)\n");
    }

    prompt
}

/// Extract the answer text from a Messages API response.
fn parse_anthropic_response(json: &serde_json::Value) -> Result<String> {
    let text = json["content"]
        .as_array()
        .and_then(|blocks| blocks.iter().find(|b| b["type"] == "text"))
        .and_then(|b| b["text"].as_str())
        .ok_or_else(|| anyhow::anyhow!("Unexpected Anthropic API response shape"))?;
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContextEntry, EntryType, Source};
    use chrono::Utc;
    use std::collections::BTreeSet;

    #[tokio::test]
    async fn test_disabled_provider_errors() {
        let provider = DisabledSynthesizer;
        assert!(provider.synthesize("q", &[]).await.is_err());
    }

    #[test]
    fn test_create_unknown_provider_errors() {
        let config = SynthesisConfig {
            provider: "oracle-of-delphi".to_string(),
            ..Default::default()
        };
        assert!(create_synthesizer(&config).is_err());
    }

    #[test]
    fn test_validate_rejects_empty() {
        assert!(validate_answer("   \n", 100).is_err());
    }

    #[test]
    fn test_validate_truncates() {
        let long = "x".repeat(50);
        let validated = validate_answer(&long, 10).unwrap();
        assert!(validated.starts_with("xxxxxxxxxx"));
        assert!(validated.ends_with('…'));
    }

    #[test]
    fn test_validate_passes_normal_answer() {
        assert_eq!(validate_answer(" fine ", 100).unwrap(), "fine");
    }

    #[test]
    fn test_prompt_includes_evidence() {
        let evidence = vec![ScoredEntry {
            entry: ContextEntry {
                id: "chat:c/1".to_string(),
                source: Source::Chat,
                entry_type: EntryType::Message,
                title: None,
                content: "redis won the caching debate".to_string(),
                author: Some("sarah".to_string()),
                timestamp: Utc::now(),
                url: None,
                tags: BTreeSet::new(),
            },
            relevance_score: 0.9,
            matched_terms: BTreeSet::new(),
        }];
        let prompt = build_prompt("why redis?", &evidence);
        assert!(prompt.contains("why redis?"));
        assert!(prompt.contains("redis won the caching debate"));
        assert!(prompt.contains("sarah"));
    }

    #[test]
    fn test_parse_response_shape() {
        let json = serde_json::json!({
            "content": [{ "type": "text", "text": "Because latency." }]
        });
        assert_eq!(parse_anthropic_response(&json).unwrap(), "Because latency.");
        assert!(parse_anthropic_response(&serde_json::json!({})).is_err());
    }
}
