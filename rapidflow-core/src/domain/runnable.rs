//! Runnable and deployment domain types

use serde::{Deserialize, Serialize};

/// Post-build packaging record
///
/// `artifact_url` is an opaque handle: a filesystem path, an image name,
/// or the sentinel `container:{id}:{name}` for a live container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Runnable {
    pub id: i64,
    pub job_id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub runnable_type: String,
    /// JSON of the originating `RunnableConfig`.
    pub config: String,
    pub status: RunnableStatus,
    pub output: Option<String>,
    pub artifact_url: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnableStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl RunnableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunnableStatus::Pending => "pending",
            RunnableStatus::Running => "running",
            RunnableStatus::Success => "success",
            RunnableStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "running" => RunnableStatus::Running,
            "success" => RunnableStatus::Success,
            "failed" => RunnableStatus::Failed,
            _ => RunnableStatus::Pending,
        }
    }
}

/// One publication of a runnable's artifact to one output destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: i64,
    pub runnable_id: i64,
    pub output_type: String,
    /// JSON of the provider-specific config bag.
    pub config: String,
    pub status: DeploymentStatus,
    pub url: Option<String>,
    pub output: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Success,
    Failed,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "success" => DeploymentStatus::Success,
            "failed" => DeploymentStatus::Failed,
            _ => DeploymentStatus::Pending,
        }
    }
}
