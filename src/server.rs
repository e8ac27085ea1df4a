//! HTTP API.
//!
//! Two groups of endpoints share one [`AppState`]: a thin pass-through to
//! the model server, and a document session for retrieval-augmented
//! questions.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Liveness message |
//! | `GET`  | `/health` | Backend connectivity and version |
//! | `GET`  | `/models` | Raw model listing from the backend |
//! | `POST` | `/query` | Prompt the model, optionally with caller-supplied context |
//! | `POST` | `/chat` | Prompt the model with the bare question |
//! | `POST` | `/document?name=` | Load a PDF (raw request body) into the session |
//! | `GET`  | `/document` | Currently loaded document |
//! | `DELETE` | `/document` | Reset the session |
//! | `POST` | `/ask` | Answer from the loaded document, with sources |
//! | `GET`  | `/history?limit=` | Recent questions, newest first |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "empty_index", "message": "no document is indexed; load a document first" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `empty_index` (409),
//! `backend_unavailable` (503), `generation_failed` (502),
//! `provision_failed` (502), `embedding_failed` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! can be served from anywhere.

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
use tower_http::trace::TraceLayer;

use crate::availability::{ModelManager, ModelState};
use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::engine::QueryEngine;
use crate::error::Error;
use crate::models::{DocumentInfo, HistoryEntry};
use crate::ollama::OllamaClient;
use crate::prompt::build_context_prompt;
use crate::session::SessionHandle;

/// Largest accepted PDF upload.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Characters of chunk text shown per source.
pub const SOURCE_PREVIEW_CHARS: usize = 300;

const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    client: OllamaClient,
    manager: Arc<ModelManager>,
    engine: Arc<QueryEngine>,
    session: Arc<SessionHandle>,
}

impl AppState {
    /// Wire the client, availability manager, engine and session together.
    pub fn new(config: &Config, embedder: Arc<dyn EmbeddingProvider>) -> crate::error::Result<Self> {
        let client = OllamaClient::new(&config.ollama)?;
        let manager = Arc::new(ModelManager::new(client.clone(), &config.availability));
        let engine = Arc::new(QueryEngine::new(
            Arc::new(client.clone()),
            embedder,
            config.retrieval.max_context_tokens,
        ));
        let session = Arc::new(SessionHandle::new(
            engine.clone(),
            config.chunking.chunk_size,
            config.chunking.overlap,
            config.embedding.batch_size,
            config.session.history_limit,
        ));

        Ok(Self {
            config: Arc::new(config.clone()),
            client,
            manager,
            engine,
            session,
        })
    }

    pub fn session(&self) -> &Arc<SessionHandle> {
        &self.session
    }

    fn model_or_default(&self, model: Option<String>) -> String {
        model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.config.ollama.model.clone())
    }

    /// Make sure `model` is installed before the first generation with it.
    async fn ready_model(&self, model: &str) -> Result<(), AppError> {
        if self.manager.state(model) == ModelState::Available {
            return Ok(());
        }
        self.manager
            .ensure_model(model, self.config.availability.wait_timeout())
            .await?;
        Ok(())
    }
}

/// Build the router with CORS, request tracing and the upload limit applied.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/models", get(handle_models))
        .route("/query", post(handle_query))
        .route("/chat", post(handle_chat))
        .route(
            "/document",
            post(handle_load_document)
                .get(handle_get_document)
                .delete(handle_reset),
        )
        .route("/ask", post(handle_ask))
        .route("/history", get(handle_history))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve on an already-bound listener until the process is terminated.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Starts the HTTP server on `[server].bind`.
pub async fn run_server(config: &Config, embedder: Arc<dyn EmbeddingProvider>) -> anyhow::Result<()> {
    let state = AppState::new(config, embedder)?;
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(
        bind = %config.server.bind,
        ollama = %config.ollama.url,
        model = %config.ollama.model,
        "server listening"
    );
    serve(listener, state).await
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

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
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

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Configuration(_) | Error::InvalidInput(_) | Error::Extract(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::EmptyIndex => StatusCode::CONFLICT,
            Error::BackendUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Generation { .. } | Error::ProvisionFailed { .. } | Error::Embedding(_) => {
                StatusCode::BAD_GATEWAY
            }
        };
        if status.is_server_error() {
            tracing::warn!(code = err.code(), error = %err, "request failed");
        }
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

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

fn require_question(question: &str) -> Result<(), AppError> {
    if question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    Ok(())
}

// ============ GET / ============

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "RAG API is running",
        "status": "healthy",
    }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    /// `"healthy"` when the backend answers, `"unhealthy"` otherwise.
    status: &'static str,
    /// `"connected"` or `"disconnected"`.
    ollama: &'static str,
    base_url: String,
    version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let probe = state.client.probe().await;
    let (status, ollama, error) = match probe {
        Ok(()) => ("healthy", "connected", None),
        Err(e) => ("unhealthy", "disconnected", Some(e.to_string())),
    };
    Json(HealthResponse {
        status,
        ollama,
        base_url: state.client.base_url().to_string(),
        version: env!("CARGO_PKG_VERSION"),
        error,
    })
}

// ============ GET /models ============

async fn handle_models(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let models = state
        .client
        .list_models_raw()
        .await
        .map_err(|e| internal(format!("failed to list models: {}", e)))?;
    Ok(Json(serde_json::json!({ "models": models })))
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Serialize)]
struct QueryResponse {
    answer: String,
    model_used: String,
    context_used: Option<String>,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    require_question(&req.question)?;
    state.client.probe().await?;

    let model = state.model_or_default(req.model);
    let context = req.context.filter(|c| !c.trim().is_empty());
    let prompt = match &context {
        Some(ctx) => build_context_prompt(&req.question, ctx),
        None => req.question.clone(),
    };

    let answer = state.client.generate(&model, &prompt).await?;
    Ok(Json(QueryResponse {
        answer,
        model_used: model,
        context_used: context,
    }))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    question: String,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    model: String,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let model = state.model_or_default(req.model);
    let response = state.engine.chat(&req.question, &model).await?;
    Ok(Json(ChatResponse { response, model }))
}

// ============ /document ============

#[derive(Deserialize)]
struct LoadParams {
    #[serde(default)]
    name: Option<String>,
}

async fn handle_load_document(
    State(state): State<AppState>,
    Query(params): Query<LoadParams>,
    body: Bytes,
) -> Result<Json<DocumentInfo>, AppError> {
    if body.is_empty() {
        return Err(bad_request("request body must contain a PDF document"));
    }
    let name = params
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| "document.pdf".to_string());
    let info = state.session.load(&name, body.to_vec()).await?;
    Ok(Json(info))
}

async fn handle_get_document(
    State(state): State<AppState>,
) -> Result<Json<DocumentInfo>, AppError> {
    state
        .session
        .document()
        .await
        .map(Json)
        .ok_or_else(|| not_found("no document loaded"))
}

async fn handle_reset(State(state): State<AppState>) -> StatusCode {
    state.session.reset().await;
    StatusCode::NO_CONTENT
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Serialize)]
struct SourceItem {
    /// 1-based page number.
    page: usize,
    score: f32,
    preview: String,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    model: String,
    sources: Vec<SourceItem>,
    truncated: bool,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    require_question(&req.question)?;
    let k = req.k.unwrap_or(state.config.retrieval.top_k);
    if k == 0 {
        return Err(Error::InvalidInput("k must be at least 1".to_string()).into());
    }
    if state.session.document().await.is_none() {
        return Err(Error::EmptyIndex.into());
    }

    let model = state.model_or_default(req.model);
    state.ready_model(&model).await?;

    let answer = state.session.ask(&req.question, &model, k).await?;
    let sources = answer
        .sources
        .iter()
        .map(|s| SourceItem {
            page: s.chunk.source_page + 1,
            score: s.score,
            preview: s.preview(SOURCE_PREVIEW_CHARS),
        })
        .collect();

    Ok(Json(AskResponse {
        answer: answer.text,
        model,
        sources,
        truncated: answer.truncated,
    }))
}

// ============ GET /history ============

#[derive(Deserialize)]
struct HistoryParams {
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Serialize)]
struct HistoryResponse {
    history: Vec<HistoryEntry>,
}

async fn handle_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Json<HistoryResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Json(HistoryResponse {
        history: state.session.history(limit).await,
    })
}
