use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::error::PipelineError;
use crate::executor::resolve_solver_path;
use crate::models::{
    CaseInfo, ImageSeriesQuery, RunSnapshot, SelectCaseRequest, SeriesKind, StartRunRequest, StartRunResponse,
};
use crate::session::{PostProcessingSession, SessionError};
use crate::viewer::ViewerError;

/// Application state
pub struct AppState {
    session: Arc<PostProcessingSession>,
}

impl AppState {
    pub fn new(session: Arc<PostProcessingSession>) -> Self {
        Self { session }
    }
}

/// Build the API router
pub fn create_router(session: Arc<PostProcessingSession>) -> Router {
    let state = AppState::new(session);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check))
        .route("/api/v1/version", get(version_handler))
        .route("/api/v1/cases", post(select_case_handler))
        .route("/api/v1/runs", post(start_run_handler))
        .route("/api/v1/runs/:id", get(run_status_handler))
        .route("/api/v1/runs/:id/cancel", post(cancel_run_handler))
        .route("/api/v1/images", get(images_handler))
        .layer(cors)
        .with_state(Arc::new(state))
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({
        "service": "Fluent Post-Processing Service",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "description": "Batch post-processing of Fluent CFD cases: plane sweeps, force sheet extraction",
        "image_series": SeriesKind::ALL.iter().map(|k| k.dir_name()).collect::<Vec<_>>()
    }))
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let config = state.session.processor().config();
    let solver = resolve_solver_path(&config.solver);

    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "solver_available": solver.is_file(),
        "solver_command": solver,
        "template_available": config.template.master.is_file()
    }))
}

async fn version_handler() -> Json<serde_json::Value> {
    Json(json!({
        "service": "Fluent Post-Processing Service",
        "version": env!("CARGO_PKG_VERSION"),
        "api_version": "v1",
        "solver": "ANSYS Fluent"
    }))
}

async fn select_case_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SelectCaseRequest>,
) -> Result<Json<CaseInfo>, ApiError> {
    tracing::info!("Selecting case folder {:?}", request.path);
    let info = state.session.select_case_folder(&request.path)?;
    Ok(Json(info))
}

async fn start_run_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRunRequest>,
) -> Result<(StatusCode, Json<StartRunResponse>), ApiError> {
    tracing::info!("Received run request for {:?}", request.case_folder);
    let run_id = state.session.start_run(&request.case_folder).await?;
    let snapshot = state.session.snapshot(&run_id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(StartRunResponse {
            run_id,
            status: snapshot.status,
        }),
    ))
}

async fn run_status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RunSnapshot>, ApiError> {
    Ok(Json(state.session.snapshot(&id).await?))
}

async fn cancel_run_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RunSnapshot>, ApiError> {
    Ok(Json(state.session.cancel_run(&id).await?))
}

async fn images_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ImageSeriesQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let kind = SeriesKind::parse(&query.series)
        .ok_or_else(|| SessionError::from(ViewerError::UnknownSeries(query.series.clone())))?;
    let series = state.session.view_image_series(&query.case_folder, kind)?;

    Ok(Json(json!({
        "series": kind.dir_name(),
        "count": series.len(),
        "images": series.images
    })))
}

/// API Errors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let message = err.to_string();
        match err {
            SessionError::UnknownRun(_) => ApiError::NotFound(message),
            SessionError::Viewer(ViewerError::UnknownSeries(_)) => ApiError::ValidationError(message),
            SessionError::Viewer(_) => ApiError::NotFound(message),
            SessionError::Pipeline(PipelineError::RunInProgress(_)) => ApiError::Conflict(message),
            SessionError::Pipeline(ref e) if e.is_configuration() => ApiError::ValidationError(message),
            SessionError::Pipeline(_) => ApiError::InternalError(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
