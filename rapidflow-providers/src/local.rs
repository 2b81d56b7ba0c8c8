//! Local filesystem provider
//!
//! Copies a file artifact to the configured path, or, for the
//! `container:{id}:{name}` sentinel, writes a JSON blob describing the
//! running container.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

use rapidflow_core::domain::{Deployment, Runnable};

use crate::OutputProvider;

const CONTAINER_PREFIX: &str = "container:";

#[derive(Debug, Default)]
pub struct LocalProvider;

#[derive(Debug, Deserialize)]
struct LocalConfig {
    path: String,
}

impl LocalProvider {
    pub fn new() -> Self {
        Self
    }

    fn deploy_file(&self, artifact_path: &str, dest: &Path) -> Result<()> {
        std::fs::copy(artifact_path, dest)
            .with_context(|| format!("failed to copy {} to {}", artifact_path, dest.display()))?;
        std::fs::set_permissions(dest, std::fs::Permissions::from_mode(0o644))?;

        info!("Deployed file to local path: {}", dest.display());
        Ok(())
    }

    fn deploy_container_info(
        &self,
        runnable: &Runnable,
        deployment: &Deployment,
        artifact_path: &str,
        dest: &Path,
    ) -> Result<()> {
        let parts: Vec<&str> = artifact_path.split(':').collect();
        let [_, container_id, container_name] = parts.as_slice() else {
            anyhow::bail!("invalid container artifact format: {}", artifact_path);
        };

        let info = serde_json::json!({
            "type": "docker_container",
            "runnable_name": runnable.name,
            "runnable_type": runnable.runnable_type,
            "container_id": container_id,
            "container_name": container_name,
            "deployment_id": deployment.id,
            "status": "running",
            "artifact_path": artifact_path,
        });

        std::fs::write(dest, serde_json::to_string_pretty(&info)?)
            .with_context(|| format!("failed to write container info to {}", dest.display()))?;
        std::fs::set_permissions(dest, std::fs::Permissions::from_mode(0o644))?;

        info!("Deployed container info to local path: {}", dest.display());
        Ok(())
    }
}

#[async_trait]
impl OutputProvider for LocalProvider {
    fn provider_type(&self) -> &'static str {
        "local"
    }

    async fn deploy(
        &self,
        _cancel: &CancellationToken,
        runnable: &Runnable,
        deployment: &Deployment,
        artifact_path: &str,
    ) -> Result<()> {
        let config: LocalConfig =
            serde_json::from_str(&deployment.config).context("invalid local config")?;

        let dest = Path::new(&config.path);
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create directory {}", parent.display()))?;
                std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o755))?;
            }
        }

        if artifact_path.starts_with(CONTAINER_PREFIX) {
            self.deploy_container_info(runnable, deployment, artifact_path, dest)
        } else {
            self.deploy_file(artifact_path, dest)
        }
    }
}
