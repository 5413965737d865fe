//! HTTP API server.
//!
//! Exposes the knowledge base to its UI as a JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ingest` | Multipart upload: `doc_id` plus `text` or `file` |
//! | `GET` | `/documents` | Chunk count and document ids (`?preview=true` for chunk ids) |
//! | `GET` | `/find_corrupted-chunks` | Corruption report |
//! | `DELETE` | `/clean-database` | Delete corrupted chunks |
//! | `DELETE` | `/delete_similar_chunks` | Delete chunks similar to a query |
//! | `POST` | `/ask` | Answer a question from stored chunks |
//! | `POST` | `/chat` | Fire-and-forget memory capture, answers `202` |
//! | `GET` | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "validation_error", "message": "doc_id must not be empty" } }
//! ```
//!
//! Codes: `validation_error` (400), `decode_error` (422), `storage_error`
//! (500), `downstream_error` (502).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Multipart, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::KbError;
use crate::ingest::select_content;
use crate::models::{Answer, CleanOutcome, CorruptedEntry, ForgetOutcome, IngestOutcome};
use crate::service::KnowledgeBase;

/// Upper bound for a multipart upload.
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

type AppState = Arc<KnowledgeBase>;

/// Starts the HTTP server on `[server].bind` and runs until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let kb = Arc::new(KnowledgeBase::from_config(config).await?);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "server listening");
    axum::serve(listener, router(kb)).await?;
    Ok(())
}

/// Builds the router over an assembled knowledge base.
pub fn router(kb: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ingest", post(handle_ingest))
        .route("/documents", get(handle_documents))
        .route("/find_corrupted-chunks", get(handle_find_corrupted))
        .route("/clean-database", delete(handle_clean))
        .route("/delete_similar_chunks", delete(handle_forget))
        .route("/ask", post(handle_ask))
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(kb)
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

impl From<KbError> for AppError {
    fn from(err: KbError) -> Self {
        let status = match err {
            KbError::Validation(_) => StatusCode::BAD_REQUEST,
            KbError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            KbError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            KbError::Downstream(_) => StatusCode::BAD_GATEWAY,
        };
        if status.is_server_error() {
            tracing::error!(code = err.code(), error = %err, "request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// Extractor rejections get the same envelope as every other client error.

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        KbError::validation(rejection.body_text()).into()
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        KbError::validation(rejection.body_text()).into()
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        KbError::validation(rejection.body_text()).into()
    }
}

// ============ POST /ingest ============

async fn handle_ingest(
    State(kb): State<AppState>,
    form: Result<Multipart, MultipartRejection>,
) -> Result<Json<IngestOutcome>, AppError> {
    let mut form = form?;
    let mut doc_id: Option<String> = None;
    let mut text: Option<String> = None;
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = form
        .next_field()
        .await
        .map_err(|e| KbError::validation(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "doc_id" => {
                doc_id = Some(field.text().await.map_err(|e| KbError::validation(e.to_string()))?);
            }
            "text" => {
                text = Some(field.text().await.map_err(|e| KbError::validation(e.to_string()))?);
            }
            "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| KbError::validation(e.to_string()))?;
                file = Some((filename, bytes.to_vec()));
            }
            other => {
                tracing::debug!(field = other, "ignoring unknown multipart field");
            }
        }
    }

    let doc_id = doc_id.unwrap_or_default();
    if doc_id.trim().is_empty() {
        return Err(KbError::validation("doc_id must not be empty").into());
    }
    let content = select_content(text, file)?;
    Ok(Json(kb.ingest(&doc_id, content).await?))
}

// ============ GET /documents ============

#[derive(Deserialize)]
struct DocumentsParams {
    #[serde(default)]
    preview: bool,
}

#[derive(Serialize)]
#[serde(untagged)]
enum DocumentsResponse {
    Full {
        total_chunks: usize,
        document_ids: Vec<String>,
    },
    Preview {
        total_chunks: usize,
        ids_preview: Vec<String>,
    },
}

async fn handle_documents(
    State(kb): State<AppState>,
    params: Result<Query<DocumentsParams>, QueryRejection>,
) -> Result<Json<DocumentsResponse>, AppError> {
    let Query(params) = params?;
    let response = if params.preview {
        DocumentsResponse::Preview {
            total_chunks: kb.store().count().await?,
            ids_preview: kb.chunk_id_preview().await?,
        }
    } else {
        let inventory = kb.inventory().await?;
        DocumentsResponse::Full {
            total_chunks: inventory.total_chunks,
            document_ids: inventory.document_ids,
        }
    };
    Ok(Json(response))
}

// ============ GET /find_corrupted-chunks ============

#[derive(Serialize)]
struct CorruptedResponse {
    scanned: usize,
    corrupted_count: usize,
    corrupted_entries: Vec<CorruptedEntry>,
}

async fn handle_find_corrupted(
    State(kb): State<AppState>,
) -> Result<Json<CorruptedResponse>, AppError> {
    let report = kb.detect().await?;
    Ok(Json(CorruptedResponse {
        scanned: report.scanned,
        corrupted_count: report.corrupted_count,
        corrupted_entries: report.entries,
    }))
}

// ============ DELETE /clean-database ============

async fn handle_clean(State(kb): State<AppState>) -> Result<Json<CleanOutcome>, AppError> {
    Ok(Json(kb.clean().await?))
}

// ============ DELETE /delete_similar_chunks ============

#[derive(Deserialize)]
struct ForgetRequest {
    query: String,
    #[serde(default)]
    threshold: Option<f64>,
}

async fn handle_forget(
    State(kb): State<AppState>,
    req: Result<Json<ForgetRequest>, JsonRejection>,
) -> Result<Json<ForgetOutcome>, AppError> {
    let Json(req) = req?;
    Ok(Json(kb.forget_similar(&req.query, req.threshold).await?))
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    #[serde(default)]
    top_k: Option<usize>,
}

async fn handle_ask(
    State(kb): State<AppState>,
    req: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<Answer>, AppError> {
    let Json(req) = req?;
    Ok(Json(kb.ask(&req.question, req.top_k).await?))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    chat: String,
}

#[derive(Serialize)]
struct ChatAccepted {
    status: String,
}

async fn handle_chat(
    State(kb): State<AppState>,
    req: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ChatAccepted>), AppError> {
    let Json(req) = req?;
    if req.chat.trim().is_empty() {
        return Err(KbError::validation("chat must not be empty").into());
    }
    kb.spawn_memory_capture(req.chat);
    Ok((
        StatusCode::ACCEPTED,
        Json(ChatAccepted {
            status: "accepted".to_string(),
        }),
    ))
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
