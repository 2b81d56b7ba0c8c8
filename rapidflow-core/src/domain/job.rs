//! Job domain types
//!
//! A job is one execution of a pipeline. The config slice the executor
//! needs (branch, repo, language, ...) is denormalized onto the job row
//! so a job remains reproducible even if the pipeline text changes.

use serde::{Deserialize, Serialize};

/// Job execution record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub pipeline_id: i64,
    pub status: JobStatus,
    pub branch: Option<String>,
    pub repo_name: Option<String>,
    pub repo_url: Option<String>,
    pub language: Option<String>,
    pub version: Option<String>,
    pub folder: Option<String>,
    pub expose_ports: bool,
    pub temporary: bool,
    /// Host directory holding the cloned repository, recorded for cleanup.
    pub temp_dir: Option<String>,
    /// Cancellation request flag; set independently of `status`.
    pub cancelled: bool,
    pub container_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Job execution status
///
/// Terminal statuses (everything past `Running`) are sticky; the engine
/// never transitions out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
    Stopped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Stopped => "stopped",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "running" => JobStatus::Running,
            "success" => JobStatus::Success,
            "failed" => JobStatus::Failed,
            "cancelled" => JobStatus::Cancelled,
            "stopped" => JobStatus::Stopped,
            _ => JobStatus::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

/// One script unit of a job, run inside the job's container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: i64,
    pub job_id: i64,
    /// 1-based position; steps run in strict `order_num` order.
    pub order_num: i64,
    #[serde(rename = "type")]
    pub step_type: String,
    pub content: String,
    pub status: StepStatus,
    pub output: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Step execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Success => "success",
            StepStatus::Failed => "failed",
            StepStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "running" => StepStatus::Running,
            "success" => StepStatus::Success,
            "failed" => StepStatus::Failed,
            "cancelled" => StepStatus::Cancelled,
            _ => StepStatus::Pending,
        }
    }
}

/// One KEY=VALUE environment entry of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub id: i64,
    pub job_id: i64,
    pub key: String,
    pub value: String,
}

/// A file materialized into the container workspace before its step runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub id: i64,
    pub step_id: i64,
    pub name: String,
    pub content: String,
}
