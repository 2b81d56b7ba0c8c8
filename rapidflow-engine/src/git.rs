//! Repository cloning

use anyhow::{Context, Result};
use std::path::Path;
use tokio::process::Command;
use tracing::info;

/// Shallow-clone a repository into `target_dir`.
///
/// Clones at depth 1 with `--branch` when a branch is given.
pub async fn clone_repository(repo_url: &str, branch: Option<&str>, target_dir: &Path) -> Result<()> {
    info!(
        "Cloning repository {} (branch: {}) to {}",
        repo_url,
        branch.unwrap_or("default"),
        target_dir.display()
    );

    let mut command = Command::new("git");
    command.arg("clone");
    if let Some(branch) = branch {
        command.arg("--branch").arg(branch);
    }
    command.arg("--depth").arg("1").arg(repo_url).arg(target_dir);

    let output = command
        .output()
        .await
        .context("Failed to execute git clone")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!(
            "failed to clone repository {}: {}",
            repo_url,
            stderr.trim()
        );
    }

    info!("Repository cloned successfully");
    Ok(())
}
