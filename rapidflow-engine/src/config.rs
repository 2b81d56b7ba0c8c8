//! Engine configuration
//!
//! Defines all configurable parameters for the engine including the
//! dispatcher pacing, the parallel-job cap, and the host paths the
//! executor touches.

use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration
///
/// Pacing and caps are configurable to allow tuning for different hosts;
/// defaults match a small single-machine deployment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the SQLite database file.
    pub database_path: String,

    /// Directory holding fallback installer scripts ({language}-{version}.sh).
    pub scripts_dir: PathBuf,

    /// Root for per-job temporary directories (clones, artifact staging).
    pub tmp_root: PathBuf,

    /// How long the dispatcher sleeps when the queue is empty.
    pub poll_interval: Duration,

    /// How long the dispatcher sleeps after a transient store error.
    pub error_backoff: Duration,

    /// Max jobs executing concurrently.
    pub max_parallel_jobs: usize,
}

impl EngineConfig {
    /// Creates configuration from environment variables.
    ///
    /// Recognized variables (all optional):
    /// - RAPIDFLOW_DB (default: ./data/rapidflow.db)
    /// - RAPIDFLOW_SCRIPTS_DIR (default: scripts)
    /// - RAPIDFLOW_TMP (default: the system temp directory)
    /// - RAPIDFLOW_POLL_INTERVAL (seconds, default: 1)
    /// - RAPIDFLOW_MAX_PARALLEL_JOBS (default: 4)
    pub fn from_env() -> Self {
        let database_path =
            std::env::var("RAPIDFLOW_DB").unwrap_or_else(|_| "./data/rapidflow.db".to_string());

        let scripts_dir = std::env::var("RAPIDFLOW_SCRIPTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("scripts"));

        let tmp_root = std::env::var("RAPIDFLOW_TMP")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir());

        let poll_interval = std::env::var("RAPIDFLOW_POLL_INTERVAL")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(1));

        let max_parallel_jobs = std::env::var("RAPIDFLOW_MAX_PARALLEL_JOBS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(4);

        Self {
            database_path,
            scripts_dir,
            tmp_root,
            poll_interval,
            error_backoff: Duration::from_secs(2),
            max_parallel_jobs,
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_path.is_empty() {
            anyhow::bail!("database_path cannot be empty");
        }
        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }
        if self.max_parallel_jobs == 0 {
            anyhow::bail!("max_parallel_jobs must be greater than 0");
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: "./data/rapidflow.db".to_string(),
            scripts_dir: PathBuf::from("scripts"),
            tmp_root: std::env::temp_dir(),
            poll_interval: Duration::from_secs(1),
            error_backoff: Duration::from_secs(2),
            max_parallel_jobs: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.error_backoff, Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();
        assert!(config.validate().is_ok());

        config.max_parallel_jobs = 0;
        assert!(config.validate().is_err());

        config.max_parallel_jobs = 4;
        config.database_path = String::new();
        assert!(config.validate().is_err());
    }
}
