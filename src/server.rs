//! HTTP API server.
//!
//! A stateless JSON API over the chat pipeline. The caller keeps the
//! transcript and sends it back with every `POST /chat`; the server only
//! holds the shared [`Pipeline`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/stats` | Collection and conversation statistics |
//! | `POST` | `/ingest?filename=<name>` | Ingest a PDF sent as the raw request body |
//! | `POST` | `/chat` | Run one chat turn |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `extraction_failed` (422), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::context::AssembledContext;
use crate::ingest::{ingest_pdf_bytes, IngestError, IngestReport};
use crate::models::ChatMessage;
use crate::pipeline::Pipeline;
use crate::session::ChatSession;
use crate::stats::{collect_stats, CollectionStats};

/// Largest accepted PDF upload.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

/// Starts the HTTP server on `[server].bind` and runs until Ctrl-C.
///
/// The store is closed after the listener shuts down.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = Arc::new(Pipeline::open(config).await?);
    let bind_addr = config.server.bind.clone();

    let app = router(pipeline.clone());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "server listening");
    println!("pdfchat server listening on http://{}", bind_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    pipeline.close().await;
    served?;
    Ok(())
}

/// Build the router over an existing pipeline.
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/stats", get(handle_stats))
        .route("/ingest", post(handle_ingest))
        .route("/chat", post(handle_chat))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
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
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn extraction_failed(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNPROCESSABLE_ENTITY,
        code: "extraction_failed",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    let message = message.into();
    error!(error = %message, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message,
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Extraction(e) => extraction_failed(e.to_string()),
            IngestError::InvalidFilename(name) => bad_request(format!("invalid filename: {}", name)),
            other => internal(other.to_string()),
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

// ============ GET /stats ============

async fn handle_stats(State(state): State<AppState>) -> Result<Json<CollectionStats>, AppError> {
    let pipeline = &state.pipeline;
    collect_stats(pipeline.store().as_ref(), pipeline.collection())
        .await
        .map(Json)
        .map_err(|e| internal(e.to_string()))
}

// ============ POST /ingest ============

#[derive(Deserialize)]
struct IngestParams {
    filename: Option<String>,
}

async fn handle_ingest(
    State(state): State<AppState>,
    Query(params): Query<IngestParams>,
    body: Bytes,
) -> Result<Json<IngestReport>, AppError> {
    let filename = params
        .filename
        .filter(|f| !f.trim().is_empty())
        .ok_or_else(|| bad_request("filename query parameter is required"))?;
    if body.is_empty() {
        return Err(bad_request("request body must contain the PDF bytes"));
    }

    let report = ingest_pdf_bytes(&state.pipeline, &filename, &body).await?;
    Ok(Json(report))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    /// Transcript so far; any `system` entries are replaced.
    #[serde(default)]
    messages: Vec<ChatMessage>,
    message: String,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    reply: String,
    messages: Vec<ChatMessage>,
    context: AssembledContext,
    completed: bool,
    logged: bool,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    let mut session = ChatSession::with_messages(state.pipeline.clone(), req.messages);
    let outcome = session
        .ask(&req.message)
        .await
        .map_err(|e| internal(e.to_string()))?;

    Ok(Json(ChatResponse {
        reply: outcome.reply,
        messages: session.into_messages(),
        context: outcome.context,
        completed: outcome.completed,
        logged: outcome.logged,
    }))
}
