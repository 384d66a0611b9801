//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/sessions` | Multipart `file` upload; creates a session |
//! | `POST`   | `/sessions/{id}/query` | `{"question": ...}` → `{answer, session_id}` |
//! | `GET`    | `/sessions/{id}/history` | Conversation turns so far |
//! | `DELETE` | `/sessions/{id}` | Close the session and delete its files |
//! | `POST`   | `/upload`, `/upload/` | Multipart `file` + `query` (+ optional `session_id`) in one call |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "session_not_found", "message": "session not found: ..." } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `unsupported_format` | 415 |
//! | `empty_document`, `unreadable_document` | 422 |
//! | `bad_request` | 400 |
//! | `session_not_found` | 404 |
//! | `model_timeout` | 504 |
//! | `model_unavailable` | 503 |
//! | `index_build`, `retrieval` | 500 |

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use docqa_core::conversation::Role;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::error::RagError;
use crate::pipeline::Pipeline;

/// Default question for `/upload` when the form has no `query` field.
pub const DEFAULT_QUESTION: &str = "What is the main point of the document?";

/// Load providers from `config`, bind `[server].bind` and serve until the
/// process is terminated.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pipeline = Arc::new(Pipeline::from_config(config)?);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "docqa server listening");
    serve(listener, pipeline).await
}

/// Serve on an already-bound listener. Starts the idle-session sweeper when
/// a TTL is configured.
pub async fn serve(
    listener: tokio::net::TcpListener,
    pipeline: Arc<Pipeline>,
) -> anyhow::Result<()> {
    if pipeline.config().sessions.ttl_secs.is_some() {
        let sweeper = Arc::clone(&pipeline);
        let every = Duration::from_secs(pipeline.config().sessions.sweep_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                sweeper.evict_expired().await;
            }
        });
    }

    axum::serve(listener, router(pipeline)).await?;
    Ok(())
}

pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = pipeline.config().server.max_upload_bytes;

    Router::new()
        .route("/health", get(handle_health))
        .route("/sessions", post(handle_create_session))
        .route("/sessions/{id}", delete(handle_close_session))
        .route("/sessions/{id}/query", post(handle_query))
        .route("/sessions/{id}/history", get(handle_history))
        .route("/upload", post(handle_upload))
        .route("/upload/", post(handle_upload))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(pipeline)
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

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let status = match &err {
            RagError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            RagError::EmptyDocument | RagError::DocumentUnreadable(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            RagError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RagError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            RagError::ModelTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            RagError::ModelUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RagError::IndexBuild(_) | RagError::Retrieval(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
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

// ============ Multipart ============

#[derive(Default)]
struct UploadForm {
    file: Option<(String, Vec<u8>)>,
    query: Option<String>,
    session_id: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| bad_request("file field has no filename"))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;
                form.file = Some((filename, bytes.to_vec()));
            }
            Some("query") => {
                form.query = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| bad_request(e.to_string()))?,
                );
            }
            Some("session_id") => {
                let id = field.text().await.map_err(|e| bad_request(e.to_string()))?;
                if !id.trim().is_empty() {
                    form.session_id = Some(id.trim().to_string());
                }
            }
            _ => {}
        }
    }
    Ok(form)
}

// ============ POST /sessions ============

#[derive(Serialize)]
struct SessionCreated {
    session_id: String,
}

async fn handle_create_session(
    State(pipeline): State<Arc<Pipeline>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<SessionCreated>), AppError> {
    let form = read_form(multipart).await?;
    let (filename, bytes) = form
        .file
        .ok_or_else(|| bad_request("missing multipart field: file"))?;
    let session_id = pipeline.ingest(&filename, bytes).await?;
    Ok((StatusCode::CREATED, Json(SessionCreated { session_id })))
}

// ============ POST /sessions/{id}/query ============

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
}

#[derive(Serialize)]
struct QueryResponse {
    answer: String,
    session_id: String,
}

async fn handle_query(
    State(pipeline): State<Arc<Pipeline>>,
    Path(id): Path<String>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    let outcome = pipeline.query(&id, &req.question).await?;
    Ok(Json(QueryResponse {
        answer: outcome.answer,
        session_id: outcome.session_id,
    }))
}

// ============ GET /sessions/{id}/history ============

#[derive(Serialize)]
struct TurnView {
    role: Role,
    text: String,
    at: DateTime<Utc>,
}

#[derive(Serialize)]
struct HistoryResponse {
    session_id: String,
    turns: Vec<TurnView>,
}

async fn handle_history(
    State(pipeline): State<Arc<Pipeline>>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, AppError> {
    let turns = pipeline
        .history(&id)?
        .into_iter()
        .map(|t| TurnView {
            role: t.role,
            text: t.text,
            at: t.at,
        })
        .collect();
    Ok(Json(HistoryResponse {
        session_id: id,
        turns,
    }))
}

// ============ DELETE /sessions/{id} ============

async fn handle_close_session(
    State(pipeline): State<Arc<Pipeline>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    pipeline.close(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ POST /upload ============

/// One-shot form: ingest `file` (or reuse `session_id`) and answer `query`.
async fn handle_upload(
    State(pipeline): State<Arc<Pipeline>>,
    multipart: Multipart,
) -> Result<Json<QueryResponse>, AppError> {
    let form = read_form(multipart).await?;
    let session_id = match (form.session_id, form.file) {
        (Some(id), _) => id,
        (None, Some((filename, bytes))) => pipeline.ingest(&filename, bytes).await?,
        (None, None) => return Err(bad_request("missing multipart field: file")),
    };
    let question = form
        .query
        .filter(|q| !q.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_QUESTION.to_string());

    let outcome = pipeline.query(&session_id, &question).await?;
    Ok(Json(QueryResponse {
        answer: outcome.answer,
        session_id: outcome.session_id,
    }))
}
