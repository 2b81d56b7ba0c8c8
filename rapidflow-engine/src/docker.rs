//! Container runtime
//!
//! Capability abstraction over the container daemon, driven through the
//! `docker` CLI. Every long-running operation carries the owning job's
//! cancellation token; when it fires the child process is killed and the
//! operation returns an error.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ports::PortMapping;

/// Options for container creation.
#[derive(Debug, Default, Clone)]
pub struct CreateContainerOpts {
    pub image: String,
    /// KEY=VALUE pairs.
    pub env: Vec<String>,
    pub cmd: Vec<String>,
    pub tty: bool,
    /// Container ports to expose without a host binding.
    pub exposed_ports: Vec<String>,
    pub port_bindings: Vec<PortMapping>,
    /// host:container bind mounts.
    pub binds: Vec<String>,
    pub working_dir: Option<String>,
    pub entrypoint: Vec<String>,
    pub name: Option<String>,
}

/// Result of an in-container exec.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub exit_code: i64,
    /// Combined stdout+stderr in the order produced.
    pub output: String,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: String,
    pub names: Vec<String>,
}

/// Abstraction over a container daemon.
///
/// `exec` must stream combined output line-by-line to `on_line` as lines
/// become available and still return the full captured buffer.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn pull_image(&self, cancel: &CancellationToken, reference: &str) -> Result<()>;

    async fn create_container(
        &self,
        cancel: &CancellationToken,
        opts: CreateContainerOpts,
    ) -> Result<String>;

    async fn start_container(&self, cancel: &CancellationToken, id: &str) -> Result<()>;

    async fn exec(
        &self,
        cancel: &CancellationToken,
        id: &str,
        cmd: &[String],
        on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<ExecResult>;

    async fn commit(
        &self,
        cancel: &CancellationToken,
        id: &str,
        reference: &str,
    ) -> Result<String>;

    /// Copy `src_path` out of the container into the host directory `dst_dir`.
    async fn copy_from(
        &self,
        cancel: &CancellationToken,
        id: &str,
        src_path: &str,
        dst_dir: &Path,
    ) -> Result<()>;

    async fn save_image(
        &self,
        cancel: &CancellationToken,
        image: &str,
        dst_path: &Path,
    ) -> Result<()>;

    /// Force-remove a container. Used on cleanup paths, so no token.
    async fn remove(&self, id: &str) -> Result<()>;

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>>;
}

/// Runtime backed by the local `docker` binary.
#[derive(Debug, Default)]
pub struct DockerCli;

impl DockerCli {
    pub fn new() -> Self {
        Self
    }

    fn command(args: &[&str]) -> Command {
        let mut command = Command::new("docker");
        command.args(args);
        command.stdin(Stdio::null());
        command
    }

    /// Run a docker command to completion, killing it if the token fires.
    async fn run_captured(
        &self,
        cancel: &CancellationToken,
        what: &str,
        mut command: Command,
    ) -> Result<(i32, String, String)> {
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn docker for {}", what))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("missing stdout pipe for {}", what))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("missing stderr pipe for {}", what))?;

        let mut out = Vec::new();
        let mut err = Vec::new();

        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                anyhow::bail!("{} cancelled", what);
            }
            read = async {
                let (o, e) = tokio::join!(stdout.read_to_end(&mut out), stderr.read_to_end(&mut err));
                o.and(e)
            } => {
                read.with_context(|| format!("failed reading docker output for {}", what))?;
            }
        }

        let status = child
            .wait()
            .await
            .with_context(|| format!("failed waiting on docker for {}", what))?;

        Ok((
            status.code().unwrap_or(-1),
            String::from_utf8_lossy(&out).to_string(),
            String::from_utf8_lossy(&err).to_string(),
        ))
    }

    async fn run_checked(
        &self,
        cancel: &CancellationToken,
        what: &str,
        command: Command,
    ) -> Result<String> {
        let (code, stdout, stderr) = self.run_captured(cancel, what, command).await?;
        if code != 0 {
            anyhow::bail!(
                "docker {} failed: exit_code={}, stderr='{}'",
                what,
                code,
                stderr.trim()
            );
        }
        Ok(stdout)
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn pull_image(&self, cancel: &CancellationToken, reference: &str) -> Result<()> {
        debug!("Pulling image {}", reference);
        // Progress output is discarded.
        self.run_checked(cancel, "pull", Self::command(&["pull", reference]))
            .await?;
        Ok(())
    }

    async fn create_container(
        &self,
        cancel: &CancellationToken,
        opts: CreateContainerOpts,
    ) -> Result<String> {
        let mut command = Self::command(&["create"]);
        if opts.tty {
            command.arg("-t");
        }
        if let Some(name) = &opts.name {
            command.arg("--name").arg(name);
        }
        for env in &opts.env {
            command.arg("-e").arg(env);
        }
        for bind in &opts.binds {
            command.arg("-v").arg(bind);
        }
        for port in &opts.exposed_ports {
            command.arg("--expose").arg(port);
        }
        for mapping in &opts.port_bindings {
            command.arg("-p").arg(mapping.render());
        }
        if let Some(dir) = &opts.working_dir {
            command.arg("-w").arg(dir);
        }
        // The docker CLI takes a single-token entrypoint; further elements
        // become leading command arguments.
        let mut trailing_cmd: Vec<&str> = Vec::new();
        if let Some((head, rest)) = opts.entrypoint.split_first() {
            command.arg("--entrypoint").arg(head);
            trailing_cmd.extend(rest.iter().map(String::as_str));
        }
        command.arg(&opts.image);
        trailing_cmd.extend(opts.cmd.iter().map(String::as_str));
        command.args(&trailing_cmd);

        let stdout = self.run_checked(cancel, "create", command).await?;
        let id = stdout.trim().to_string();
        if id.is_empty() {
            anyhow::bail!("docker create returned no container id");
        }
        debug!("Created container {}", id);
        Ok(id)
    }

    async fn start_container(&self, cancel: &CancellationToken, id: &str) -> Result<()> {
        self.run_checked(cancel, "start", Self::command(&["start", id]))
            .await?;
        Ok(())
    }

    async fn exec(
        &self,
        cancel: &CancellationToken,
        id: &str,
        cmd: &[String],
        on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<ExecResult> {
        let mut command = Self::command(&["exec", id]);
        command.args(cmd);
        command.stdout(Stdio::piped()).stderr(Stdio::piped());

        let child = command.spawn().context("failed to spawn docker exec")?;
        stream_exec(child, cancel, on_line).await
    }

    async fn commit(
        &self,
        cancel: &CancellationToken,
        id: &str,
        reference: &str,
    ) -> Result<String> {
        let stdout = self
            .run_checked(cancel, "commit", Self::command(&["commit", id, reference]))
            .await?;
        Ok(stdout.trim().to_string())
    }

    async fn copy_from(
        &self,
        cancel: &CancellationToken,
        id: &str,
        src_path: &str,
        dst_dir: &Path,
    ) -> Result<()> {
        std::fs::create_dir_all(dst_dir)
            .with_context(|| format!("failed to create {}", dst_dir.display()))?;

        let mut command = Self::command(&["cp"]);
        command
            .arg(format!("{}:{}", id, src_path))
            .arg(dst_dir.as_os_str());
        self.run_checked(cancel, "cp", command).await?;
        Ok(())
    }

    async fn save_image(
        &self,
        cancel: &CancellationToken,
        image: &str,
        dst_path: &Path,
    ) -> Result<()> {
        let mut command = Self::command(&["save", "-o"]);
        command.arg(dst_path.as_os_str()).arg(image);
        self.run_checked(cancel, "save", command).await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let output = Self::command(&["rm", "-f", id])
            .output()
            .await
            .context("failed to spawn docker rm")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("Failed to remove container {}: {}", id, stderr.trim());
            anyhow::bail!("docker rm failed for {}: {}", id, stderr.trim());
        }
        Ok(())
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let output = Self::command(&["ps", "-a", "--format", "{{.ID}}\t{{.Names}}"])
            .output()
            .await
            .context("failed to spawn docker ps")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("docker ps failed: {}", stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut containers = Vec::new();
        for line in stdout.lines() {
            let Some((id, names)) = line.split_once('\t') else {
                continue;
            };
            containers.push(ContainerSummary {
                id: id.trim().to_string(),
                names: names
                    .split(',')
                    .map(|n| n.trim().trim_start_matches('/').to_string())
                    .filter(|n| !n.is_empty())
                    .collect(),
            });
        }
        Ok(containers)
    }
}

/// Drain a spawned exec's stdout and stderr line-by-line until both close,
/// invoking `on_line` per line, then reap the exit code. Kills the child
/// when the token fires.
async fn stream_exec(
    mut child: Child,
    cancel: &CancellationToken,
    on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
) -> Result<ExecResult> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("missing stdout pipe for exec"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow::anyhow!("missing stderr pipe for exec"))?;

    let mut out_lines = BufReader::new(stdout).lines();
    let mut err_lines = BufReader::new(stderr).lines();
    let mut out_done = false;
    let mut err_done = false;
    let mut captured = String::new();

    while !out_done || !err_done {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                anyhow::bail!("exec cancelled");
            }
            line = out_lines.next_line(), if !out_done => match line? {
                Some(line) => {
                    on_line(&line);
                    captured.push_str(&line);
                    captured.push('\n');
                }
                None => out_done = true,
            },
            line = err_lines.next_line(), if !err_done => match line? {
                Some(line) => {
                    on_line(&line);
                    captured.push_str(&line);
                    captured.push('\n');
                }
                None => err_done = true,
            },
        }
    }

    let status = child.wait().await.context("failed waiting on exec")?;

    Ok(ExecResult {
        exit_code: status.code().unwrap_or(-1) as i64,
        output: captured,
    })
}
