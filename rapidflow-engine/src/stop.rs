//! Stop-pipeline sweep
//!
//! The authoritative reclaimer for temporary jobs: cancels running
//! executors, removes runnable containers by name, removes the main job
//! container, deletes recorded temp directories, and moves every touched
//! job to `stopped`.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

use rapidflow_core::domain::RunnableConfig;

use crate::cancel::CancellationRegistry;
use crate::docker::ContainerRuntime;
use crate::repository::{job, runnable};

/// Stop every job of a pipeline and reclaim its resources.
///
/// Returns the number of jobs stopped.
pub async fn stop_pipeline(
    pool: &SqlitePool,
    runtime: &dyn ContainerRuntime,
    cancels: &CancellationRegistry,
    pipeline_id: i64,
) -> Result<usize> {
    let jobs = job::find_by_pipeline(pool, pipeline_id).await?;
    if jobs.is_empty() {
        info!("No jobs found for pipeline {}", pipeline_id);
        return Ok(0);
    }

    info!("Stopping pipeline {} with {} jobs", pipeline_id, jobs.len());

    for item in &jobs {
        info!("Stopping job {}", item.id);
        cancels.cancel(item.id);

        // Runnable containers are found by their configured (or defaulted)
        // names; only container runnables launch one.
        match runnable::find_by_job(pool, item.id).await {
            Ok(runnables) => {
                for r in runnables {
                    if r.runnable_type != "docker_container" {
                        continue;
                    }
                    let name = serde_json::from_str::<RunnableConfig>(&r.config)
                        .ok()
                        .and_then(|c| c.container_name.filter(|n| !n.is_empty()))
                        .unwrap_or_else(|| format!("rapidflow-run-{}-{}", r.job_id, r.name));

                    info!("Removing runnable container: {}", name);
                    if let Err(e) = remove_by_name(runtime, &name).await {
                        warn!("Failed to remove runnable container {}: {:#}", name, e);
                    }
                }
            }
            Err(e) => warn!("Failed to load runnables for job {}: {}", item.id, e),
        }

        if let Some(container_id) = item.container_id.as_deref().filter(|s| !s.is_empty()) {
            info!("Removing job container: {}", container_id);
            if let Err(e) = runtime.remove(container_id).await {
                warn!("Failed to remove job container {}: {:#}", container_id, e);
            }
        }

        if let Some(temp_dir) = item.temp_dir.as_deref().filter(|s| !s.is_empty()) {
            info!("Removing temporary directory: {}", temp_dir);
            if let Err(e) = std::fs::remove_dir_all(temp_dir) {
                warn!("Failed to remove temporary directory {}: {}", temp_dir, e);
            }
        }

        job::mark_stopped(pool, item.id).await?;
    }

    info!("Pipeline {} stopped and cleaned up", pipeline_id);
    Ok(jobs.len())
}

async fn remove_by_name(runtime: &dyn ContainerRuntime, name: &str) -> Result<()> {
    for container in runtime.list_containers().await? {
        if container.names.iter().any(|n| n == name) {
            runtime.remove(&container.id).await?;
            return Ok(());
        }
    }
    info!("Container {} not found", name);
    Ok(())
}
