//! HTTP surface: `POST /embed`, `GET /health`, 404 for everything else.
//!
//! [`serve`] loads the model assets, binds the listener and runs until
//! Ctrl-C. [`create_router`] is exposed separately so tests can drive the
//! routes in-process with any [`ServiceState`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::embedding::{self, EmbedError, Embedder, EMBEDDING_DIM, MODEL_NAME};

/// Process-wide state, built once at startup and read-only afterwards.
pub struct ServiceState {
    embedder: Arc<Embedder>,
    request_timeout: Option<Duration>,
}

impl ServiceState {
    pub fn new(embedder: Embedder) -> Self {
        Self {
            embedder: Arc::new(embedder),
            request_timeout: None,
        }
    }

    /// Bound each request's pipeline run. `None` lets it run to completion.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Load tokenizer and ONNX model from the configured directory.
    pub fn load(config: &ServiceConfig) -> Result<Self> {
        let embedder = embedding::load_local(&config.model).with_context(|| {
            format!(
                "failed to load model assets from {}",
                config.model.resolved_dir().display()
            )
        })?;
        Ok(Self::new(embedder).with_request_timeout(config.request_timeout()))
    }
}

#[derive(Debug, Deserialize)]
pub struct EmbedRequest {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmbedResponse {
    pub embedding: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub dim: usize,
}

/// Per-request failure, mapped to a status code and a JSON `{"error": ...}` body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error("embedding task failed: {0}")]
    Task(String),

    #[error("embedding timed out after {0:?}")]
    Timeout(Duration),

    #[error("not found")]
    NotFound,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Embed(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Embed(_) | Self::Task(_) | Self::Timeout(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "embedding error");
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Create the router with all routes.
pub fn create_router(state: Arc<ServiceState>) -> Router {
    Router::new()
        .route("/embed", post(embed).fallback(not_found))
        .route("/health", get(health).fallback(not_found))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        model: MODEL_NAME.into(),
        dim: EMBEDDING_DIM,
    })
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

async fn embed(
    State(state): State<Arc<ServiceState>>,
    body: Bytes,
) -> Result<Json<EmbedResponse>, ApiError> {
    // Parsed whatever the Content-Type header says.
    let request: EmbedRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))?;
    let text = request
        .text
        .filter(|t| !t.is_empty())
        .ok_or(EmbedError::EmptyText)?;

    let request_id = Uuid::now_v7();
    let span = tracing::info_span!("embed", %request_id, chars = text.chars().count());
    let embedding = run_pipeline(&state, text).instrument(span).await?;

    Ok(Json(EmbedResponse { embedding }))
}

async fn run_pipeline(state: &ServiceState, text: String) -> Result<Vec<f32>, ApiError> {
    // CPU-heavy → spawn_blocking
    let embedder = state.embedder.clone();
    let task = tokio::task::spawn_blocking(move || embedder.embed(&text));

    let joined = match state.request_timeout {
        Some(limit) => tokio::time::timeout(limit, task)
            .await
            .map_err(|_| ApiError::Timeout(limit))?,
        None => task.await,
    };
    let embedding = joined.map_err(|e| ApiError::Task(e.to_string()))??;

    tracing::debug!(dim = embedding.len(), "embedding ready");
    Ok(embedding)
}

/// Load assets, bind the listener and serve until Ctrl-C.
///
/// Any load or bind failure is returned before a single connection is accepted.
pub async fn serve(config: ServiceConfig) -> Result<()> {
    let state = ServiceState::load(&config)?;
    tracing::info!(
        model = MODEL_NAME,
        dim = EMBEDDING_DIM,
        max_length = config.model.max_length,
        "model and tokenizer loaded"
    );

    let listener = bind(&config).await?;
    serve_on(listener, state).await
}

/// Bind the configured listening address.
pub async fn bind(config: &ServiceConfig) -> Result<TcpListener> {
    let bind_addr = config.bind_addr();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "embedding service listening");
    Ok(listener)
}

/// Serve a ready state on an already bound listener until Ctrl-C.
pub async fn serve_on(listener: TcpListener, state: ServiceState) -> Result<()> {
    axum::serve(listener, create_router(Arc::new(state)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("embedding service shut down");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutting down embedding service"),
        Err(e) => {
            tracing::warn!(error = %e, "failed to listen for ctrl-c, serving until killed");
            std::future::pending::<()>().await;
        }
    }
}
