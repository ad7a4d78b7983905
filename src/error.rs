//! Error taxonomy for the query pipeline.
//!
//! Only caller-input errors ([`OracleError::InvalidQuery`]) propagate out of
//! a query as hard failures. Per-source and synthesis failures are absorbed
//! by the orchestrator and reflected in result metadata (`sources_used`,
//! reduced confidence, missing `answer`); their variants exist so the
//! absorption sites can name what happened when logging.

use thiserror::Error;

use crate::models::Source;

#[derive(Debug, Error)]
pub enum OracleError {
    /// Empty query text, non-positive limit, or a source with no configured
    /// connector. Raised before any fetch is attempted.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A single source collaborator errored or timed out. Recorded and
    /// absorbed per source; never fails the query as a whole.
    #[error("source '{name}' unavailable: {reason}")]
    SourceUnavailable { name: Source, reason: String },

    /// The synthesis collaborator failed. The query result is still
    /// returned without a prose answer.
    #[error("synthesis unavailable: {0}")]
    SynthesisUnavailable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, OracleError>;

impl OracleError {
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        OracleError::InvalidQuery(msg.into())
    }
}
