//! # Context Oracle CLI (`cxo`)
//!
//! The `cxo` binary is the primary interface for Context Oracle. It runs
//! context queries against the configured connectors, lists connector
//! status, and starts the JSON API server.
//!
//! ## Usage
//!
//! ```bash
//! cxo --config ./config/oracle.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cxo query "<text>"` | Retrieve, correlate, and rank evidence for a question |
//! | `cxo sources` | List all connectors and their health status |
//! | `cxo serve api` | Start the JSON HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! # Ranked evidence across every configured source
//! cxo query "why did we move caching to redis?"
//!
//! # Restrict to chat and the issue tracker, top 5
//! cxo query "rate limiting rollout" --source chat --source issue-tracker --limit 5
//!
//! # Ask the synthesis provider for a prose answer on top of the evidence
//! cxo query "what broke the login flow last week?" --synthesize
//! ```

mod config;
mod connector_file;
mod correlate;
mod error;
mod models;
mod normalize;
mod query;
mod rank;
mod score;
mod server;
mod sources;
mod synthesis;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::models::{QueryResponse, Source};
use crate::query::{answer_query, QueryRequest};
use crate::sources::SourceRegistry;
use crate::synthesis::create_synthesizer;

/// Context Oracle CLI — a development-context query oracle.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/oracle.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "cxo",
    about = "Context Oracle — query your team's development context across sources",
    version,
    long_about = "Context Oracle retrieves candidate records from configured development-activity \
    sources (source control, chat, issue tracker, documents), scores and correlates them into \
    clusters of related evidence, and returns a ranked answer set with confidence metadata."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/oracle.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Run a context query.
    ///
    /// Fans out to the requested sources in parallel, correlates the
    /// returned records, and prints ranked evidence with relevance scores,
    /// cluster sizes, and an aggregate confidence.
    Query {
        /// The question to answer.
        text: String,

        /// Restrict the query to a source (`code-repo`, `chat`,
        /// `issue-tracker`, `document`). Repeatable; defaults to every
        /// configured source.
        #[arg(long = "source", value_parser = parse_source)]
        sources: Vec<Source>,

        /// Maximum number of ranked results.
        #[arg(long)]
        limit: Option<usize>,

        /// Raw candidates requested per source before correlation.
        #[arg(long)]
        context_window: Option<usize>,

        /// Ask the configured synthesis provider for a prose answer.
        #[arg(long)]
        synthesize: bool,

        /// Emit the full result as JSON instead of the human-readable view.
        #[arg(long)]
        json: bool,
    },

    /// List configured connectors and their health status.
    Sources,

    /// Start the JSON HTTP API server.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

/// Server subcommands.
#[derive(Subcommand)]
enum ServeService {
    /// Start the JSON API on the configured bind address.
    Api,
}

fn parse_source(s: &str) -> Result<Source, String> {
    Source::parse(s).ok_or_else(|| {
        format!(
            "unknown source '{}'; expected code-repo, chat, issue-tracker, or document",
            s
        )
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Query {
            text,
            sources,
            limit,
            context_window,
            synthesize,
            json,
        } => {
            let registry = SourceRegistry::from_config(&cfg);
            let synthesizer = if synthesize {
                Some(create_synthesizer(&cfg.synthesis)?)
            } else {
                None
            };

            let request = QueryRequest {
                text,
                sources,
                limit,
                context_window,
            };
            let response = answer_query(&registry, &cfg, synthesizer.as_deref(), &request)
                .await
                .map_err(anyhow::Error::from)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_response(&response);
            }
        }
        Commands::Sources => {
            let registry = SourceRegistry::from_config(&cfg);
            print_sources(&registry);
        }
        Commands::Serve { service } => match service {
            ServeService::Api => {
                server::run_server(&cfg).await?;
            }
        },
    }

    Ok(())
}

fn print_response(response: &QueryResponse) {
    let result = &response.result;

    if let Some(answer) = &response.answer {
        println!("{}", answer);
        println!();
        println!("--- evidence ---");
    }

    if result.ranked_entries.is_empty() {
        println!("No results.");
    }

    for (i, scored) in result.ranked_entries.iter().enumerate() {
        let entry = &scored.entry;
        let title_display = entry
            .title
            .as_deref()
            .unwrap_or_else(|| entry.content.lines().next().unwrap_or("(untitled)"));

        println!(
            "{}. [{:.2}] {} / {}",
            i + 1,
            scored.relevance_score,
            entry.source,
            title_display
        );
        println!("    when: {}", entry.timestamp.format("%Y-%m-%d %H:%M"));
        if let Some(author) = &entry.author {
            println!("    author: {}", author);
        }
        if let Some(url) = &entry.url {
            println!("    url: {}", url);
        }
        if !scored.matched_terms.is_empty() {
            let terms: Vec<&str> = scored.matched_terms.iter().map(|t| t.as_str()).collect();
            println!("    matched: {}", terms.join(", "));
        }
        if let Some(cluster) = result.clusters.get(i) {
            if cluster.members.len() > 1 {
                println!("    corroborated by {} related entries", cluster.members.len() - 1);
            }
        }
        println!("    id: {}", entry.id);
        println!();
    }

    let used: Vec<&str> = result.sources_used.iter().map(|s| s.as_str()).collect();
    println!(
        "confidence: {:.2} | sources: {} | {:.0}ms",
        result.confidence_score,
        if used.is_empty() {
            "none".to_string()
        } else {
            used.join(", ")
        },
        result.execution_time.as_secs_f64() * 1000.0
    );
}

fn print_sources(registry: &SourceRegistry) {
    if registry.is_empty() {
        println!("No connectors configured.");
        return;
    }

    println!("{:<18} {:<14} {:<8} DESCRIPTION", "CONNECTOR", "SOURCE", "HEALTHY");
    for status in registry.statuses() {
        println!(
            "{:<18} {:<14} {:<8} {}",
            status.name, status.source, status.healthy, status.description
        );
    }
}
