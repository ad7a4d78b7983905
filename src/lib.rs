//! # Context Oracle
//!
//! A development-context query oracle: given a free-text question, it pulls
//! candidate records from multiple development-activity sources
//! (source-control events, chat messages, issue-tracker tickets, documents),
//! scores and deduplicates them, correlates them into clusters of related
//! evidence, and returns a ranked, bounded result with confidence and
//! timing metadata — plus an optional synthesized prose answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────────────────────────┐
//! │  Connectors  │──▶│ Normalize → Score → Correlate →   │
//! │ repo/chat/…  │   │ Rank                              │
//! └──────────────┘   └───────────────┬───────────────────┘
//!   (parallel fan-out,               │
//!    per-source timeout)             ▼
//!                      ┌──────────┐     ┌──────────┐
//!                      │   CLI    │     │   HTTP   │
//!                      │  (cxo)   │     │  (JSON)  │
//!                      └──────────┘     └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cxo sources                              # list configured connectors
//! cxo query "why did we pick redis?"       # ranked evidence
//! cxo query "why redis?" --synthesize      # evidence + prose answer
//! cxo serve api                            # start the JSON API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`normalize`] | Raw records → canonical entries |
//! | [`score`] | Relevance scoring |
//! | [`correlate`] | Deduplication, relations, clustering |
//! | [`rank`] | Cluster ordering and selection |
//! | [`query`] | Query orchestration (fan-out/join) |
//! | [`sources`] | Connector trait and registry |
//! | [`connector_file`] | JSON-file connector |
//! | [`synthesis`] | Synthesis provider abstraction |
//! | [`server`] | JSON HTTP API |
//! | [`error`] | Error taxonomy |

pub mod config;
pub mod connector_file;
pub mod correlate;
pub mod error;
pub mod models;
pub mod normalize;
pub mod query;
pub mod rank;
pub mod score;
pub mod server;
pub mod sources;
pub mod synthesis;
