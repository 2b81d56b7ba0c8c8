//! Pipeline domain types
//!
//! A pipeline is an immutable named specification of how to build and
//! optionally deploy a piece of software. The raw config text is stored
//! verbatim; `PipelineConfig` is its parsed in-memory form.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Pipeline record
///
/// Immutable after creation; the engine never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: i64,
    pub name: String,
    /// Raw configuration text exactly as authored.
    pub config: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Parsed pipeline configuration
///
/// Produced by the dialect ingestor from YAML, JSON, or TOML input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub repo_name: Option<String>,
    #[serde(default)]
    pub repo_url: Option<String>,
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub expose_ports: bool,
    #[serde(default)]
    pub temporary: bool,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub steps: Vec<StepConfig>,
    #[serde(default)]
    pub runnables: Vec<RunnableConfig>,
}

/// One script unit within a pipeline
///
/// Only `bash` steps are executable; unknown types are skipped with
/// status "success".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepConfig {
    #[serde(rename = "type")]
    pub step_type: String,
    pub content: String,
    /// Files written into the container workspace before the script runs.
    #[serde(default)]
    pub files: HashMap<String, String>,
}

/// Post-build packaging declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnableConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub runnable_type: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub container_name: Option<String>,
    #[serde(default)]
    pub image_name: Option<String>,
    #[serde(default)]
    pub entrypoint: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    #[serde(default)]
    pub outputs: Vec<OutputConfig>,
}

/// Runnable types the engine can produce.
pub const RUNNABLE_TYPES: &[&str] = &["docker_container", "docker_image", "artifacts", "serverless"];

/// One deployment destination for a runnable's artifact
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(rename = "type")]
    pub output_type: String,
    /// Provider-specific bag; opaque to the engine.
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
}
