//! Cancellation registry
//!
//! Process-wide table mapping job id to its cancellation token. Writers are
//! executor entry and exit; readers are the external cancel API and the
//! dispatcher sweep.

use std::collections::HashMap;
use std::sync::RwLock;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct CancellationRegistry {
    running: RwLock<HashMap<i64, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the token for a job.
    ///
    /// Idempotent so the dispatcher can pre-register a claimed job before
    /// the executor task starts.
    pub fn register(&self, job_id: i64) -> CancellationToken {
        let mut running = self.running.write().unwrap();
        running.entry(job_id).or_default().clone()
    }

    /// Fire the token for a running job.
    ///
    /// Returns false if the job is not currently running in this process.
    pub fn cancel(&self, job_id: i64) -> bool {
        let running = self.running.read().unwrap();
        match running.get(&job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, job_id: i64) {
        self.running.write().unwrap().remove(&job_id);
    }

    pub fn contains(&self, job_id: i64) -> bool {
        self.running.read().unwrap().contains_key(&job_id)
    }
}
