use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::archive::pack_workspace;
use crate::jobs::{Job, JobState};
use crate::pipeline::PipelineHandle;
use crate::ScribeError;

/// Shared state for all API handlers: the submission handle carries the
/// job store and the coordinator.
#[derive(Clone)]
pub struct AppState {
    pipeline: PipelineHandle,
}

impl AppState {
    pub fn new(pipeline: PipelineHandle) -> Self {
        Self { pipeline }
    }
}

/// JSON error body matching the job API's `detail` convention.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.message }))).into_response()
    }
}

impl From<ScribeError> for ApiError {
    fn from(err: ScribeError) -> Self {
        match err {
            ScribeError::EmptyBatch | ScribeError::BatchTooLarge { .. } => {
                Self::bad_request(err.to_string())
            }
            ScribeError::WorkerUnavailable => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: err.to_string(),
            },
        }
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub urls: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub state: JobState,
    pub progress: f64,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Job> for JobStatusResponse {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            state: job.state,
            progress: job.progress,
            message: job.message.clone(),
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobsResponse {
    pub jobs: Vec<Job>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/submit", post(submit_urls))
        .route("/jobs", get(list_jobs))
        .route("/status/{id}", get(job_status))
        .route("/result/{id}", get(download_result))
        .route("/jobs/{id}", axum::routing::delete(delete_job))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl+C.
pub async fn serve(addr: &str, state: AppState) -> crate::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    // Only graceful shutdown is affected if the handler fails to
    // install; the process still terminates on Ctrl+C.
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install Ctrl+C handler: {}", err);
    }
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Reelscribe caption extraction API" }))
}

async fn submit_urls(
    State(state): State<AppState>,
    Json(payload): Json<SubmitRequest>,
) -> ApiResult<Json<SubmitResponse>> {
    let job = state.pipeline.submit(&payload.urls).await?;

    Ok(Json(SubmitResponse {
        job_id: job.id,
        message: "Job submitted successfully".to_string(),
    }))
}

async fn list_jobs(State(state): State<AppState>) -> Json<JobsResponse> {
    Json(JobsResponse {
        jobs: state.pipeline.store().list().await,
    })
}

async fn job_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job = state
        .pipeline
        .store()
        .get(id)
        .await
        .ok_or_else(|| ApiError::not_found("Job not found"))?;

    Ok(Json(JobStatusResponse::from(&job)))
}

async fn download_result(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Response> {
    let job = state
        .pipeline
        .store()
        .get(id)
        .await
        .ok_or_else(|| ApiError::not_found("Job not found"))?;

    if job.state != JobState::Completed {
        return Err(ApiError::bad_request("Job not completed yet"));
    }

    let workspace = job
        .workspace
        .ok_or_else(|| ApiError::not_found("Results not found"))?;

    let bytes = tokio::task::spawn_blocking(move || pack_workspace(&workspace))
        .await
        .map_err(|e| ApiError::internal(format!("packaging task failed: {}", e)))?
        .map_err(|e| ApiError::internal(format!("packaging failed: {}", e)))?
        .ok_or_else(|| ApiError::not_found("No transcripts available"))?;

    let headers = [
        (header::CONTENT_TYPE, "application/zip".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"transcripts_{}.zip\"", id),
        ),
    ];

    Ok((headers, bytes).into_response())
}

async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .pipeline
        .store()
        .delete(id)
        .await
        .ok_or_else(|| ApiError::not_found("Job not found"))?;

    // Best-effort workspace cleanup; the record is already gone.
    let job_root = state.pipeline.coordinator().job_root(id);
    if job_root.exists() {
        match tokio::task::spawn_blocking(move || fs_err::remove_dir_all(job_root)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("failed to remove workspace for job {}: {}", id, e),
            Err(e) => tracing::warn!("workspace cleanup task failed for job {}: {}", id, e),
        }
    }

    Ok(Json(json!({ "message": "Job deleted successfully" })))
}
