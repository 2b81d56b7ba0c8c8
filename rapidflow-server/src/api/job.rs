//! Job API handlers

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use rapidflow_core::config::parse_pipeline_config;
use rapidflow_core::domain::{Deployment, Environment, Job, JobStatus, Pipeline, Runnable, Step};
use rapidflow_engine::intake::{self, IntakeError};
use rapidflow_engine::repository::{
    deployment as deployment_repo, job as job_repo, pipeline as pipeline_repo,
    runnable as runnable_repo, step as step_repo,
};

use crate::api::error::{ApiError, ApiResult};
use crate::AppState;

/// Aggregate view of a job and everything hanging off it. Reads are not
/// transactional, so an in-flight job may show a partially updated graph.
#[derive(Debug, Serialize)]
pub struct JobWithDetails {
    pub job: Job,
    pub pipeline: Pipeline,
    pub steps: Vec<Step>,
    pub environments: Vec<Environment>,
    pub runnables: Vec<Runnable>,
    pub deployments: Vec<Deployment>,
}

/// POST /pipelines/{id}/jobs
///
/// Parses the stored pipeline config and inserts the denormalized job
/// graph in `pending` state; the dispatcher picks it up from there.
pub async fn create_job(
    State(state): State<AppState>,
    Path(pipeline_id): Path<i64>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let pipeline = pipeline_repo::find_by_id(&state.pool, pipeline_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("pipeline not found".to_string()))?;

    let config = parse_pipeline_config(&pipeline.config)
        .map_err(|e| ApiError::BadRequest(format!("invalid config: {}", e)))?;

    let job_id = intake::create_job(&state.pool, pipeline_id, &config)
        .await
        .map_err(|e| match e {
            IntakeError::Validation(msg) => ApiError::BadRequest(msg),
            IntakeError::Database(err) => ApiError::DatabaseError(err),
            IntakeError::Serialize(err) => ApiError::BadRequest(err.to_string()),
        })?;

    let job = job_repo::find_by_id(&state.pool, job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("job not found".to_string()))?;

    tracing::info!("Job {} created for pipeline {}", job_id, pipeline_id);
    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /jobs
pub async fn list_jobs(State(state): State<AppState>) -> ApiResult<Json<Vec<Job>>> {
    let jobs = job_repo::list_all(&state.pool).await?;
    Ok(Json(jobs))
}

/// GET /jobs/{id}
pub async fn get_job(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Job>> {
    let job = job_repo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("job not found".to_string()))?;
    Ok(Json(job))
}

/// GET /jobs/{id}/details
pub async fn get_job_details(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<JobWithDetails>> {
    let job = job_repo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("job not found".to_string()))?;
    let pipeline = pipeline_repo::find_by_id(&state.pool, job.pipeline_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("pipeline not found".to_string()))?;

    let steps = step_repo::find_by_job(&state.pool, id).await?;
    let environments = job_repo::envs_by_job(&state.pool, id).await?;
    let runnables = runnable_repo::find_by_job(&state.pool, id).await?;
    let deployments = deployment_repo::find_by_job(&state.pool, id).await?;

    Ok(Json(JobWithDetails {
        job,
        pipeline,
        steps,
        environments,
        runnables,
        deployments,
    }))
}

/// POST /jobs/{id}/cancel
///
/// Sets the persistent cancellation flag and pokes the engine's registry.
/// If the job is not running in this process the dispatcher observes the
/// flag on its next tick.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let job = job_repo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("job not found".to_string()))?;

    if job.status != JobStatus::Running && job.status != JobStatus::Pending {
        return Err(ApiError::BadRequest(format!(
            "job cannot be cancelled (status: {})",
            job.status.as_str()
        )));
    }

    job_repo::mark_cancelled(&state.pool, id).await?;

    if job.status == JobStatus::Running && !state.engine.cancel(id) {
        tracing::debug!("Job {} is not running in this process", id);
    }

    job_repo::finish(&state.pool, id, JobStatus::Cancelled).await?;
    step_repo::cancel_open_steps(&state.pool, id).await?;

    Ok(Json(serde_json::json!({ "message": "job cancelled successfully" })))
}

/// GET /jobs/{id}/steps
pub async fn get_job_steps(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<Step>>> {
    let steps = step_repo::find_by_job(&state.pool, id).await?;
    Ok(Json(steps))
}

/// GET /steps/{id}
pub async fn get_step(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Step>> {
    let step = step_repo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("step not found".to_string()))?;
    Ok(Json(step))
}
