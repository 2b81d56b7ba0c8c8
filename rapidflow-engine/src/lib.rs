//! RapidFlow Engine
//!
//! The job execution engine: persistent job queue, per-job state machine,
//! container lifecycle, repository acquisition, language auto-detection,
//! ordered step execution with streamed output capture, cooperative
//! cancellation, and the post-build runnable/deployment pipeline.

pub mod archive;
pub mod cancel;
pub mod config;
pub mod db;
pub mod detect;
pub mod docker;
pub mod executor;
pub mod git;
pub mod intake;
pub mod ports;
pub mod queue;
pub mod repository;
pub mod stop;

use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;

use cancel::CancellationRegistry;
use config::EngineConfig;
use docker::ContainerRuntime;
use executor::Executor;
use rapidflow_providers::ProviderRegistry;

/// Engine facade
///
/// Owns the shared pieces (store pool, container runtime, provider registry,
/// cancellation table) and hands them to the executor and dispatcher.
#[derive(Clone)]
pub struct Engine {
    pool: SqlitePool,
    runtime: Arc<dyn ContainerRuntime>,
    providers: Arc<ProviderRegistry>,
    cancels: Arc<CancellationRegistry>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        pool: SqlitePool,
        runtime: Arc<dyn ContainerRuntime>,
        providers: Arc<ProviderRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            pool,
            runtime,
            providers,
            cancels: Arc::new(CancellationRegistry::new()),
            config,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn cancels(&self) -> &Arc<CancellationRegistry> {
        &self.cancels
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn executor(&self) -> Executor {
        Executor::new(
            self.pool.clone(),
            Arc::clone(&self.runtime),
            Arc::clone(&self.providers),
            Arc::clone(&self.cancels),
            self.config.clone(),
        )
    }

    /// Request cancellation of a running job.
    ///
    /// Returns false if the job is not currently running in this process;
    /// the persistent `cancelled` flag is the caller's responsibility and
    /// the dispatcher sweep will observe it on its next tick.
    pub fn cancel(&self, job_id: i64) -> bool {
        self.cancels.cancel(job_id)
    }

    /// Run a single job to completion on the current task (synchronous
    /// CLI variant; same state machine, no dispatcher).
    pub async fn run_job(&self, job_id: i64) -> Result<()> {
        self.executor().run(job_id).await
    }

    /// Spawn the background dispatcher loop.
    pub fn spawn_dispatcher(&self) -> tokio::task::JoinHandle<()> {
        let dispatcher = queue::Dispatcher::new(self.clone());
        tokio::spawn(async move { dispatcher.run().await })
    }

    /// Stop every job of a pipeline and reclaim its resources.
    pub async fn stop_pipeline(&self, pipeline_id: i64) -> Result<usize> {
        stop::stop_pipeline(
            &self.pool,
            self.runtime.as_ref(),
            &self.cancels,
            pipeline_id,
        )
        .await
    }
}
