//! JSON HTTP API.
//!
//! Serializes [`QueryResponse`](crate::models::QueryResponse) for callers
//! that live outside the process; the core contract remains the in-memory
//! object.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/query` | Run a query, optionally with synthesis |
//! | `GET`  | `/sources` | List configured connectors and health |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query text must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::OracleError;
use crate::models::{QueryResponse, Source};
use crate::query::{answer_query, QueryRequest};
use crate::sources::{SourceRegistry, SourceStatus};
use crate::synthesis::{create_synthesizer, Synthesizer};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    registry: Arc<SourceRegistry>,
    /// Present only when a synthesis provider is configured.
    synthesizer: Option<Arc<dyn Synthesizer>>,
}

/// Start the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let registry = Arc::new(SourceRegistry::from_config(config));

    let synthesizer = if config.synthesis.is_enabled() {
        Some(create_synthesizer(&config.synthesis)?)
    } else {
        None
    };

    let state = AppState {
        config: Arc::new(config.clone()),
        registry,
        synthesizer,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/query", post(handle_query))
        .route("/sources", get(handle_sources))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("Oracle API listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<OracleError> for AppError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::InvalidQuery(message) => AppError {
                status: StatusCode::BAD_REQUEST,
                code: "bad_request".to_string(),
                message,
            },
            other => AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "internal".to_string(),
                message: other.to_string(),
            },
        }
    }
}

// ============ POST /query ============

/// JSON request body for `POST /query`.
#[derive(Deserialize)]
struct QueryBody {
    query: String,
    /// Restrict to these sources; omitted means all configured sources.
    #[serde(default)]
    sources: Option<Vec<Source>>,
    #[serde(default)]
    limit: Option<usize>,
    /// Raw candidates requested per source before correlation.
    #[serde(default)]
    context_window: Option<usize>,
    /// Ask the configured synthesis provider for a prose answer.
    #[serde(default)]
    synthesize: bool,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(body): Json<QueryBody>,
) -> Result<Json<QueryResponse>, AppError> {
    let request = QueryRequest {
        text: body.query,
        sources: body.sources.unwrap_or_default(),
        limit: body.limit,
        context_window: body.context_window,
    };

    let synthesizer = if body.synthesize {
        state.synthesizer.as_deref()
    } else {
        None
    };

    let response = answer_query(&state.registry, &state.config, synthesizer, &request).await?;
    Ok(Json(response))
}

// ============ GET /sources ============

#[derive(Serialize)]
struct SourcesResponse {
    sources: Vec<SourceStatus>,
}

async fn handle_sources(State(state): State<AppState>) -> Json<SourcesResponse> {
    Json(SourcesResponse {
        sources: state.registry.statuses(),
    })
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
