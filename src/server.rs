//! HTTP front end for the search pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/search` | Run the pipeline for `{ "query", "email" }` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! A successful search returns the assembled context:
//!
//! ```json
//! { "text": "=== SEARCH RESULTS ===\n...", "sources": [{ "citation_id": "Q3 Report", "file_id": "8060008", "link": "https://cloud.example.com/f/8060008" }] }
//! ```
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "access_denied", "message": "Access denied. ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `access_denied` (403),
//! `search_unavailable` (503). The message is the user-facing text; denial
//! reasons are only ever logged.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser-based chat
//! front ends can call the server directly.

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
use crate::error::PipelineError;
use crate::models::{AssembledContext, UserIdentity};
use crate::pipeline::SearchPipeline;

#[derive(Clone)]
struct AppState {
    pipeline: Arc<SearchPipeline>,
}

/// Starts the HTTP server on `[server].bind` with the production clients.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = Arc::new(SearchPipeline::from_config(config)?);
    run_server_with_pipeline(&config.server.bind, pipeline).await
}

/// Like [`run_server`], but serves an already constructed pipeline.
pub async fn run_server_with_pipeline(
    bind_addr: &str,
    pipeline: Arc<SearchPipeline>,
) -> anyhow::Result<()> {
    let app = router(pipeline);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "search server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router. Exposed so tests can serve it on an ephemeral port.
pub fn router(pipeline: Arc<SearchPipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/search", post(handle_search))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { pipeline })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"access_denied"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::QueryTooShort { .. } => StatusCode::BAD_REQUEST,
            PipelineError::AccessDenied => StatusCode::FORBIDDEN,
            PipelineError::SearchUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.user_message(),
        }
    }
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

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchBody {
    query: String,
    #[serde(default)]
    email: String,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> Result<Json<AssembledContext>, AppError> {
    if body.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let user = UserIdentity::new(body.email);
    let context = state.pipeline.run(&body.query, &user).await.map_err(|e| {
        tracing::info!(code = e.code(), error = %e, "search request rejected");
        AppError::from(e)
    })?;

    Ok(Json(context))
}
