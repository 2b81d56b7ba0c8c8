//! SSH session helper for the remote-deploy providers
//!
//! Drives the `ssh` binary: `run_command` executes a remote command,
//! `upload` pipes content into `cat > remotePath`. Host-key verification
//! is intentionally permissive; production deployments require strict
//! checking.

use anyhow::{Context, Result};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug)]
pub struct SshSession {
    host: String,
    user: String,
    key_path: String,
    port: String,
}

impl SshSession {
    /// Validate the connection fields and the private key file up front.
    pub fn connect(host: &str, user: &str, key_path: &str, port: &str) -> Result<Self> {
        if host.is_empty() || user.is_empty() || key_path.is_empty() {
            anyhow::bail!("missing required SSH fields (host, ssh_user, ssh_key_path)");
        }
        if !std::path::Path::new(key_path).exists() {
            anyhow::bail!("failed to read SSH key: {}", key_path);
        }

        Ok(Self {
            host: host.to_string(),
            user: user.to_string(),
            key_path: key_path.to_string(),
            port: if port.is_empty() { "22".to_string() } else { port.to_string() },
        })
    }

    fn command(&self) -> Command {
        let mut command = Command::new("ssh");
        command
            .arg("-i")
            .arg(&self.key_path)
            .arg("-p")
            .arg(&self.port)
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg("UserKnownHostsFile=/dev/null")
            .arg("-o")
            .arg("BatchMode=yes")
            .arg(format!("{}@{}", self.user, self.host));
        command
    }

    /// Run a remote command; non-zero exit fails with the combined output.
    pub async fn run_command(&self, cancel: &CancellationToken, command: &str) -> Result<()> {
        debug!("Running SSH command on {}: {}", self.host, command);

        let child = self
            .command()
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("failed to spawn ssh")?;

        let (status, combined) = reap(child, cancel, "ssh command").await?;
        if !status.success() {
            anyhow::bail!("command failed: {}, output: {}", command, combined.trim());
        }

        debug!("SSH command output: {}", combined.trim());
        Ok(())
    }

    /// Upload content to a remote path by piping it into `cat`.
    pub async fn upload(
        &self,
        cancel: &CancellationToken,
        content: &str,
        remote_path: &str,
    ) -> Result<()> {
        let mut child = self
            .command()
            .arg(format!("cat > {}", remote_path))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("failed to spawn ssh for upload")?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("missing stdin pipe for ssh upload"))?;
        stdin
            .write_all(content.as_bytes())
            .await
            .context("failed to stream upload content")?;
        drop(stdin);

        let (status, combined) = reap(child, cancel, "ssh upload").await?;
        if !status.success() {
            anyhow::bail!("failed to upload file: {}", combined.trim());
        }

        info!("Uploaded file to {}", remote_path);
        Ok(())
    }
}

/// Drain a child's output and reap it, killing it if the token fires.
async fn reap(
    mut child: tokio::process::Child,
    cancel: &CancellationToken,
    what: &str,
) -> Result<(std::process::ExitStatus, String)> {
    use tokio::io::AsyncReadExt;

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
            read.with_context(|| format!("failed reading output for {}", what))?;
        }
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("failed waiting on {}", what))?;

    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&out),
        String::from_utf8_lossy(&err)
    );
    Ok((status, combined))
}

/// Pull, replace, and verify the service container on the remote host.
pub async fn deploy_container(
    session: &SshSession,
    cancel: &CancellationToken,
    image_name: &str,
    container_name: &str,
    service_port: &str,
) -> Result<()> {
    let commands = [
        format!("docker pull {}", image_name),
        format!("docker stop {} || true", container_name),
        format!("docker rm {} || true", container_name),
        format!(
            "docker run -d --name {} -p {}:{} {}",
            container_name, service_port, service_port, image_name
        ),
        format!("docker ps | grep {}", container_name),
    ];

    for command in &commands {
        session
            .run_command(cancel, command)
            .await
            .with_context(|| format!("failed to execute command '{}'", command))?;
    }

    info!("Deployed container {} over SSH", container_name);
    Ok(())
}
