//! HTTP trigger surface for the route layer.
//!
//! - `POST /rebuild`: rebuild from the database now (one rebuild at a time)
//! - `GET /similar?term=..&k=..`: ranked similar skills
//! - `GET /health`: backend readiness and the current index pair

use std::sync::{Arc, Mutex};

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::config::SkillswapConfig;
use crate::db;
use crate::index::store::ArtifactMeta;
use crate::pipeline::gate::ReadinessReport;
use crate::pipeline::query::SkillMatch;
use crate::pipeline::{Pipeline, PipelineError, RebuildOutcome};

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    db: Arc<Mutex<Connection>>,
    rebuild_lock: Arc<tokio::sync::Mutex<()>>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, conn: Connection) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            db: Arc::new(Mutex::new(conn)),
            rebuild_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::NoSkills => StatusCode::CONFLICT,
            PipelineError::BackendUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::EmbeddingFailed => StatusCode::BAD_GATEWAY,
            PipelineError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
            PipelineError::EmptyIndex
            | PipelineError::Artifact(_)
            | PipelineError::Source(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SimilarParams {
    term: String,
    k: Option<usize>,
}

#[derive(Debug, Serialize)]
struct SimilarResponse {
    term: String,
    results: Vec<SkillMatch>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    backend: ReadinessReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<ArtifactMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    index_error: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/rebuild", post(handle_rebuild))
        .route("/similar", get(handle_similar))
        .route("/health", get(handle_health))
        .with_state(state)
}

async fn handle_rebuild(State(state): State<AppState>) -> Result<Json<RebuildOutcome>, AppError> {
    let _rebuilding = state.rebuild_lock.lock().await;

    let rebuild = {
        let conn = state
            .db
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))?;
        state.pipeline.rebuild_from_store(&*conn)
    };

    let outcome = rebuild.await?;
    Ok(Json(outcome))
}

async fn handle_similar(
    State(state): State<AppState>,
    Query(params): Query<SimilarParams>,
) -> Result<Json<SimilarResponse>, AppError> {
    if params.term.trim().is_empty() {
        return Err(AppError {
            status: StatusCode::BAD_REQUEST,
            message: "term must not be empty".into(),
        });
    }
    let top_k = params.k.unwrap_or(state.pipeline.options().default_top_k);
    let results = state.pipeline.query_similar(&params.term, top_k).await;
    Ok(Json(SimilarResponse {
        term: params.term,
        results,
    }))
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let backend = state.pipeline.readiness().await;
    let (index, index_error) = match state.pipeline.artifacts().load() {
        Ok(loaded) => (Some(loaded.meta), None),
        Err(e) => (None, Some(e.to_string())),
    };
    Json(HealthResponse {
        backend,
        index,
        index_error,
    })
}

/// Serve the trigger surface on `server.host:server.port` until ctrl-c.
pub async fn serve(config: SkillswapConfig) -> Result<()> {
    let conn = db::open_database(config.resolved_db_path())?;
    let pipeline = Pipeline::from_config(&config)?;
    let state = AppState::new(pipeline, conn);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "skillswap listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}
