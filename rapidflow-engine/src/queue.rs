//! Job dispatcher
//!
//! Single long-running loop: sweep the cancellation table, claim the oldest
//! pending job, and spawn an executor task for it. Concurrency is bounded by
//! a semaphore; the claim is skipped while a job is already registered as
//! running so the pending row cannot be double-dispatched before the
//! executor flips it to `running`.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use rapidflow_core::domain::JobStatus;

use crate::repository::job;
use crate::Engine;

pub struct Dispatcher {
    engine: Engine,
    semaphore: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(engine: Engine) -> Self {
        let permits = engine.config().max_parallel_jobs;
        Self {
            engine,
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    pub async fn run(&self) {
        info!(
            "Starting dispatcher (poll interval: {:?}, max parallel jobs: {})",
            self.engine.config().poll_interval,
            self.semaphore.available_permits()
        );

        loop {
            if let Err(e) = self.tick().await {
                error!("Error selecting jobs: {:#}", e);
                tokio::time::sleep(self.engine.config().error_backoff).await;
            }
        }
    }

    async fn tick(&self) -> anyhow::Result<()> {
        let pool = self.engine.pool();

        // Fire cancellation for running jobs whose flag was set externally.
        // Idempotent; a miss just means the job is not running here.
        for job_id in job::find_running_cancelled(pool).await? {
            self.engine.cancels().cancel(job_id);
        }

        // At capacity: keep sweeping cancellations but claim nothing.
        let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
            tokio::time::sleep(self.engine.config().poll_interval).await;
            return Ok(());
        };

        let Some(job_id) = job::claim_next_pending(pool).await? else {
            tokio::time::sleep(self.engine.config().poll_interval).await;
            return Ok(());
        };

        if self.engine.cancels().contains(job_id) {
            // Claimed on a previous tick; the executor has not yet marked
            // it running.
            tokio::time::sleep(self.engine.config().poll_interval).await;
            return Ok(());
        }
        self.engine.cancels().register(job_id);

        debug!("Dispatching job {}", job_id);

        let engine = self.engine.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.executor().run(job_id).await {
                error!("Error running job {}: {:#}", job_id, e);
                let _ = job::finish(engine.pool(), job_id, JobStatus::Failed).await;
            }
            drop(permit);
        });

        Ok(())
    }
}
