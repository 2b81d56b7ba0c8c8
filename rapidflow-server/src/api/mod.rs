//! API router

pub mod error;
pub mod health;
pub mod job;
pub mod pipeline;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/pipelines", post(pipeline::create_pipeline).get(pipeline::list_pipelines))
        .route("/pipelines/{id}", get(pipeline::get_pipeline))
        .route("/pipelines/{id}/jobs", get(pipeline::get_pipeline_jobs).post(job::create_job))
        .route("/jobs", get(job::list_jobs))
        .route("/jobs/{id}", get(job::get_job))
        .route("/jobs/{id}/details", get(job::get_job_details))
        .route("/jobs/{id}/cancel", post(job::cancel_job))
        .route("/jobs/{id}/steps", get(job::get_job_steps))
        .route("/steps/{id}", get(job::get_step))
        .route("/health", get(health::health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
