//! Pipeline intake
//!
//! Materializes a parsed pipeline configuration into the denormalized job
//! graph: the job row, its steps and files, its environment entries, and
//! its enabled runnables with their deployments. Disabled runnables are
//! never persisted. Validation errors surface here, before anything
//! reaches the executor.

use sqlx::SqlitePool;
use thiserror::Error;

use rapidflow_core::domain::{OutputConfig, PipelineConfig};

use crate::ports;
use crate::repository::{deployment, job, runnable, step};

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Insert a pending job for a pipeline from its parsed configuration.
///
/// Returns the new job id.
pub async fn create_job(
    pool: &SqlitePool,
    pipeline_id: i64,
    config: &PipelineConfig,
) -> Result<i64, IntakeError> {
    validate(config)?;

    let new = job::NewJob {
        branch: non_empty(&config.branch),
        repo_name: non_empty(&config.repo_name),
        repo_url: non_empty(&config.repo_url),
        language: non_empty(&config.language),
        version: non_empty(&config.version),
        folder: non_empty(&config.folder),
        expose_ports: config.expose_ports,
        temporary: config.temporary,
    };
    let job_id = job::create(pool, pipeline_id, &new).await?;

    for (i, step_config) in config.steps.iter().enumerate() {
        let step_id = step::create(
            pool,
            job_id,
            (i + 1) as i64,
            &step_config.step_type,
            &step_config.content,
        )
        .await?;
        for (name, content) in &step_config.files {
            step::insert_file(pool, step_id, name, content).await?;
        }
    }

    for (key, value) in &config.env {
        job::insert_env(pool, job_id, key, value).await?;
    }

    for runnable_config in &config.runnables {
        if !runnable_config.enabled {
            continue;
        }

        let config_json = serde_json::to_string(runnable_config)?;
        let runnable_id = runnable::create(
            pool,
            job_id,
            &runnable_config.name,
            &runnable_config.runnable_type,
            &config_json,
        )
        .await?;

        for output in &runnable_config.outputs {
            let output_json = serde_json::to_string(&output.config)?;
            deployment::create(pool, runnable_id, &output.output_type, &output_json).await?;
        }
    }

    Ok(job_id)
}

fn validate(config: &PipelineConfig) -> Result<(), IntakeError> {
    for runnable_config in &config.runnables {
        if !runnable_config.enabled {
            continue;
        }
        for spec in &runnable_config.ports {
            ports::parse_port_mapping(spec)
                .map_err(|e| IntakeError::Validation(e.to_string()))?;
        }
        for output in &runnable_config.outputs {
            validate_output(output)?;
        }
    }
    Ok(())
}

fn validate_output(output: &OutputConfig) -> Result<(), IntakeError> {
    // SSH-backed outputs fail fast when the connection fields are absent;
    // every other config bag stays opaque until deploy time.
    if output.output_type == "vps" || output.output_type == "nginx" {
        for field in ["host", "ssh_user", "ssh_key_path"] {
            let present = output
                .config
                .get(field)
                .and_then(|v| v.as_str())
                .is_some_and(|s| !s.is_empty());
            if !present {
                return Err(IntakeError::Validation(format!(
                    "output '{}' is missing required SSH field '{}'",
                    output.output_type, field
                )));
            }
        }
    }
    Ok(())
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.clone().filter(|s| !s.is_empty())
}
