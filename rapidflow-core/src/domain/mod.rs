//! Domain types
//!
//! Persisted entities shared between the engine, the HTTP facade, and the CLI.

pub mod job;
pub mod pipeline;
pub mod runnable;

pub use job::{Environment, File, Job, JobStatus, Step, StepStatus};
pub use pipeline::{OutputConfig, Pipeline, PipelineConfig, RunnableConfig, StepConfig};
pub use runnable::{Deployment, DeploymentStatus, Runnable, RunnableStatus};
