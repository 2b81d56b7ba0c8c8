//! Pipeline API handlers

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use rapidflow_core::config::parse_pipeline_config;
use rapidflow_core::domain::{Job, Pipeline};
use rapidflow_engine::repository::{job as job_repo, pipeline as pipeline_repo};

use crate::api::error::{ApiError, ApiResult};
use crate::AppState;

/// POST /pipelines
///
/// Body is the raw pipeline configuration in any supported dialect; it is
/// validated, then stored verbatim.
pub async fn create_pipeline(
    State(state): State<AppState>,
    body: String,
) -> ApiResult<(StatusCode, Json<Pipeline>)> {
    let config = parse_pipeline_config(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let id = pipeline_repo::create(&state.pool, &config.name, &body).await?;
    let pipeline = pipeline_repo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Pipeline {} not found", id)))?;

    tracing::info!("Pipeline created: {} ({})", pipeline.name, pipeline.id);
    Ok((StatusCode::CREATED, Json(pipeline)))
}

/// GET /pipelines
pub async fn list_pipelines(State(state): State<AppState>) -> ApiResult<Json<Vec<Pipeline>>> {
    let pipelines = pipeline_repo::list_all(&state.pool).await?;
    Ok(Json(pipelines))
}

/// GET /pipelines/{id}
pub async fn get_pipeline(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Pipeline>> {
    let pipeline = pipeline_repo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Pipeline not found".to_string()))?;
    Ok(Json(pipeline))
}

/// GET /pipelines/{id}/jobs
pub async fn get_pipeline_jobs(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<Job>>> {
    let jobs = job_repo::find_by_pipeline(&state.pool, id).await?;
    Ok(Json(jobs))
}
