//! Run command
//!
//! Inserts the pipeline and its job graph, then drives the job to
//! completion on the current task. Same insertions and executor as the
//! server path, no dispatcher.

use anyhow::{Context, Result};
use tracing::{error, info};

use rapidflow_core::config::parse_pipeline_config;
use rapidflow_engine::intake;
use rapidflow_engine::repository::pipeline;

pub async fn run_pipeline(file: &str) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read pipeline file {}", file))?;
    let config = parse_pipeline_config(&raw).context("invalid pipeline config")?;

    let engine = super::build_engine().await?;

    let pipeline_id = pipeline::create(engine.pool(), &config.name, &raw).await?;
    let job_id = intake::create_job(engine.pool(), pipeline_id, &config)
        .await
        .context("failed to create job")?;

    info!("Pipeline created and job {} queued", job_id);

    if let Err(e) = engine.run_job(job_id).await {
        error!("Error running job {}: {:#}", job_id, e);
        return Err(e);
    }

    Ok(())
}
