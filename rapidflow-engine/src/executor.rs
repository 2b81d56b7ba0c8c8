//! Job executor
//!
//! Drives a single job through its state machine: preflight cancellation
//! check, source acquisition, language inference, image pull with ubuntu
//! fallback, container provisioning, the ordered step loop with streamed
//! output capture, the runnable/deployment phases, and cleanup.
//!
//! Cancellation is cooperative: the token is polled between stages and
//! inside every exec drain. On cancellation the job settles to `cancelled`
//! and all non-terminal steps are marked `cancelled`; on any other stage
//! failure the job settles to `failed`. Both settle paths still run cleanup.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use rapidflow_core::domain::{
    Job, JobStatus, Runnable, RunnableConfig, RunnableStatus, StepStatus,
};
use rapidflow_providers::ProviderRegistry;

use crate::archive;
use crate::cancel::CancellationRegistry;
use crate::config::EngineConfig;
use crate::detect;
use crate::docker::{ContainerRuntime, CreateContainerOpts};
use crate::git;
use crate::ports::{self, PortMapping};
use crate::repository::{deployment, job, runnable, step};

const WORKSPACE: &str = "/workspace";
const APP_DIR: &str = "/app";
const FALLBACK_IMAGE: &str = "ubuntu:latest";
const HEREDOC_MARKER: &str = "RAPIDFLOW_EOF";

pub struct Executor {
    pool: SqlitePool,
    runtime: Arc<dyn ContainerRuntime>,
    providers: Arc<ProviderRegistry>,
    cancels: Arc<CancellationRegistry>,
    config: EngineConfig,
}

impl Executor {
    pub fn new(
        pool: SqlitePool,
        runtime: Arc<dyn ContainerRuntime>,
        providers: Arc<ProviderRegistry>,
        cancels: Arc<CancellationRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            pool,
            runtime,
            providers,
            cancels,
            config,
        }
    }

    /// Run a job to completion.
    ///
    /// Cancellation is not an error: a cancelled job settles to `cancelled`
    /// and this returns Ok. Any other failure settles the job to `failed`
    /// and surfaces the error to the caller once.
    pub async fn run(&self, job_id: i64) -> Result<()> {
        let token = self.cancels.register(job_id);
        info!("Starting job {}", job_id);

        let result = self.run_inner(job_id, &token).await;
        self.cancels.remove(job_id);

        match result {
            Ok(()) => Ok(()),
            Err(e) if token.is_cancelled() => {
                info!("Job {} was cancelled: {:#}", job_id, e);
                self.settle_cancelled(job_id).await;
                Ok(())
            }
            Err(e) => {
                let _ = job::finish(&self.pool, job_id, JobStatus::Failed).await;
                Err(e)
            }
        }
    }

    async fn settle_cancelled(&self, job_id: i64) {
        if let Err(e) = job::finish(&self.pool, job_id, JobStatus::Cancelled).await {
            error!("Failed to settle cancelled job {}: {}", job_id, e);
        }
        if let Err(e) = step::cancel_open_steps(&self.pool, job_id).await {
            error!("Failed to cancel open steps of job {}: {}", job_id, e);
        }
    }

    async fn run_inner(&self, job_id: i64, token: &CancellationToken) -> Result<()> {
        let mut job = job::find_by_id(&self.pool, job_id)
            .await?
            .with_context(|| format!("job {} not found", job_id))?;

        if job.status.is_terminal() {
            debug!("Job {} already settled ({})", job_id, job.status.as_str());
            return Ok(());
        }

        // Preflight: a cancellation requested before we started settles
        // the job without touching any external resource.
        if job.cancelled {
            self.settle_cancelled(job_id).await;
            return Ok(());
        }

        job::set_running(&self.pool, job_id).await?;

        let (project_path, temp_dir) = self.acquire_sources(&job).await?;

        // Back-fill missing language/version before the base image is chosen.
        if job.language.as_deref().unwrap_or("").is_empty()
            || job.version.as_deref().unwrap_or("").is_empty()
        {
            let detected = detect::detect_language(&project_path);
            if job.language.as_deref().unwrap_or("").is_empty() {
                job::set_language(&self.pool, job_id, &detected.language).await?;
                job.language = Some(detected.language);
            }
            if job.version.as_deref().unwrap_or("").is_empty() {
                job::set_version(&self.pool, job_id, &detected.version).await?;
                job.version = Some(detected.version);
            }
            info!(
                "Job {}: language={}, version={}",
                job_id,
                job.language.as_deref().unwrap_or(""),
                job.version.as_deref().unwrap_or("")
            );
        }

        let envs = job::envs_by_job(&self.pool, job_id).await?;
        let mut env_vars: Vec<String> = envs
            .iter()
            .map(|e| format!("{}={}", e.key, e.value))
            .collect();
        if let Some(branch) = &job.branch {
            env_vars.push(format!("BRANCH={}", branch));
        }

        let mut exposed_ports = Vec::new();
        let mut port_bindings = Vec::new();
        if job.expose_ports {
            for env in &envs {
                if env.key == "PORT" {
                    exposed_ports.push(env.value.clone());
                    port_bindings.push(PortMapping {
                        host_ip: "0.0.0.0".to_string(),
                        host_port: env.value.clone(),
                        container_port: env.value.clone(),
                    });
                }
            }
        }

        self.ensure_not_cancelled(job_id, token)?;

        let language = job.language.clone().unwrap_or_default();
        let version = job.version.clone().unwrap_or_default();
        let mut base_image = detect::base_image(&language, &version);
        let mut fallback = false;

        info!("Pulling image {}", base_image);
        if let Err(e) = self.runtime.pull_image(token, &base_image).await {
            self.ensure_not_cancelled(job_id, token)?;
            warn!(
                "Failed to pull image {}: {:#}, falling back to {}",
                base_image, e, FALLBACK_IMAGE
            );
            fallback = true;
            base_image = FALLBACK_IMAGE.to_string();
            self.runtime.pull_image(token, &base_image).await?;
        }

        self.ensure_not_cancelled(job_id, token)?;

        let mut binds = Vec::new();
        if project_path.exists() {
            let abs = std::path::absolute(&project_path)
                .with_context(|| format!("failed to resolve {}", project_path.display()))?;
            binds.push(format!("{}:{}", abs.display(), WORKSPACE));
        }

        // The container is a long-lived shell host; steps are exec'd into it.
        let container_id = self
            .runtime
            .create_container(
                token,
                CreateContainerOpts {
                    image: base_image,
                    env: env_vars,
                    cmd: vec!["sleep".to_string(), "infinity".to_string()],
                    tty: true,
                    exposed_ports,
                    port_bindings,
                    binds,
                    ..Default::default()
                },
            )
            .await?;

        job::set_container_id(&self.pool, job_id, &container_id).await?;

        if job.temporary {
            info!(
                "Job {} is temporary - resources remain until the pipeline is stopped",
                job_id
            );
        }

        let result = self
            .run_in_container(&job, token, &container_id, fallback, &language, &version)
            .await;

        // Temporary jobs keep their container (and clone dir) alive for the
        // stop-pipeline sweep; everything else is reclaimed here on every
        // exit path.
        if !job.temporary {
            if let Err(e) = self.runtime.remove(&container_id).await {
                warn!("Failed to remove container {}: {:#}", container_id, e);
            }
            if let Some(dir) = &temp_dir {
                if let Err(e) = std::fs::remove_dir_all(dir) {
                    warn!("Failed to remove temp directory {}: {}", dir.display(), e);
                }
            }
        }

        result
    }

    /// Resolve the project directory, cloning the repository when a URL is
    /// configured. Returns the project path and the owned temp directory.
    async fn acquire_sources(&self, job: &Job) -> Result<(PathBuf, Option<PathBuf>)> {
        if let Some(repo_url) = job.repo_url.as_deref().filter(|s| !s.is_empty()) {
            let temp_dir = self
                .config
                .tmp_root
                .join(format!("rapidflow-repo-{}", job.id));
            std::fs::create_dir_all(&temp_dir)
                .with_context(|| format!("failed to create temp directory {}", temp_dir.display()))?;

            // Recorded up front so stop-pipeline can reclaim it later.
            job::set_temp_dir(&self.pool, job.id, &temp_dir.to_string_lossy()).await?;

            let branch = job.branch.as_deref().filter(|s| !s.is_empty()).unwrap_or("main");
            git::clone_repository(repo_url, Some(branch), &temp_dir).await?;

            let project_path = match job.folder.as_deref().filter(|s| !s.is_empty()) {
                Some(folder) => temp_dir.join(folder),
                None => temp_dir.clone(),
            };
            return Ok((project_path, Some(temp_dir)));
        }

        if let Some(folder) = job.folder.as_deref().filter(|s| !s.is_empty()) {
            return Ok((PathBuf::from(folder), None));
        }

        anyhow::bail!("either repo_url or folder must be specified");
    }

    async fn run_in_container(
        &self,
        job: &Job,
        token: &CancellationToken,
        container_id: &str,
        fallback: bool,
        language: &str,
        version: &str,
    ) -> Result<()> {
        self.runtime.start_container(token, container_id).await?;
        info!("Container started: {}", container_id);

        if fallback {
            self.run_install_script(job, token, container_id, language, version)
                .await?;
        }

        if let Some(repo_name) = job.repo_name.as_deref().filter(|s| !s.is_empty()) {
            self.clone_inside_container(job, token, container_id, repo_name)
                .await?;
        } else {
            debug!("Using local folder");
        }

        self.run_steps(job, token, container_id).await?;

        job::finish(&self.pool, job.id, JobStatus::Success).await?;

        // Runnable production is isolated: its failures never demote the job.
        if let Err(e) = self.process_runnables(job, token, container_id).await {
            error!("Error processing runnables for job {}: {:#}", job.id, e);
        }

        Ok(())
    }

    /// Reconstitute the requested toolchain inside the fallback image using
    /// the on-disk installer script, if one exists.
    async fn run_install_script(
        &self,
        job: &Job,
        token: &CancellationToken,
        container_id: &str,
        language: &str,
        version: &str,
    ) -> Result<()> {
        let script_path = self
            .config
            .scripts_dir
            .join(format!("{}-{}.sh", language, version));
        if !script_path.exists() {
            warn!("No install script found for {}-{}", language, version);
            return Ok(());
        }

        info!("Running install script {}", script_path.display());
        let content = std::fs::read_to_string(&script_path)
            .with_context(|| format!("failed to read {}", script_path.display()))?;

        let write = self
            .exec_quiet(token, container_id, &write_file_command("/tmp/install.sh", &content))
            .await?;
        if !write.success() {
            anyhow::bail!("failed to create install script");
        }
        let chmod = self
            .exec_quiet(token, container_id, "chmod +x /tmp/install.sh")
            .await?;
        if !chmod.success() {
            anyhow::bail!("failed to create install script");
        }

        let mut on_line = |line: &str| info!("{}", line);
        let run = self
            .runtime
            .exec(
                token,
                container_id,
                &["/tmp/install.sh".to_string()],
                &mut on_line,
            )
            .await?;
        if !run.success() {
            anyhow::bail!("install script failed");
        }
        Ok(())
    }

    /// Legacy path: clone by repo name directly inside the container.
    async fn clone_inside_container(
        &self,
        job: &Job,
        token: &CancellationToken,
        container_id: &str,
        repo_name: &str,
    ) -> Result<()> {
        info!("Cloning repo {}", repo_name);
        let clone = self
            .exec_quiet(
                token,
                container_id,
                &format!("git clone {} {}", repo_name, WORKSPACE),
            )
            .await?;
        if !clone.success() {
            anyhow::bail!("failed to clone repo");
        }

        if let Some(branch) = job.branch.as_deref().filter(|s| !s.is_empty()) {
            info!("Checking out branch {}", branch);
            let checkout = self
                .exec_quiet(
                    token,
                    container_id,
                    &format!("cd {} && git checkout {}", WORKSPACE, branch),
                )
                .await?;
            if !checkout.success() {
                anyhow::bail!("failed to checkout branch");
            }
        }
        Ok(())
    }

    async fn run_steps(
        &self,
        job: &Job,
        token: &CancellationToken,
        container_id: &str,
    ) -> Result<()> {
        let steps = step::find_by_job(&self.pool, job.id).await?;
        info!("Running {} steps", steps.len());

        for current in steps {
            self.ensure_not_cancelled(job.id, token)?;

            debug!("Running step {}", current.id);
            step::set_status(&self.pool, current.id, StepStatus::Running, None).await?;

            let files = step::files_by_step(&self.pool, current.id).await?;
            let mut files_failed = false;
            for file in files {
                let write = self
                    .exec_quiet(token, container_id, &write_file_command(&file.name, &file.content))
                    .await?;
                if !write.success() {
                    // Deliberate soft failure: the step is marked failed but
                    // the loop continues with the next step.
                    step::set_status(
                        &self.pool,
                        current.id,
                        StepStatus::Failed,
                        Some("Failed to create file"),
                    )
                    .await?;
                    files_failed = true;
                    break;
                }
            }
            if files_failed {
                continue;
            }

            if current.step_type != "bash" {
                // Unknown step types are ignored.
                step::set_status(&self.pool, current.id, StepStatus::Success, None).await?;
                continue;
            }

            let mut on_line = |line: &str| info!("{}", line);
            let exec = self
                .runtime
                .exec(
                    token,
                    container_id,
                    &shell_command(&current.content),
                    &mut on_line,
                )
                .await?;

            let status = if exec.success() {
                StepStatus::Success
            } else {
                StepStatus::Failed
            };
            step::set_status(&self.pool, current.id, status, Some(&exec.output)).await?;

            if status == StepStatus::Failed {
                job::finish(&self.pool, job.id, JobStatus::Failed).await?;
                anyhow::bail!("step {} failed", current.id);
            }
        }

        Ok(())
    }

    // =========================================================================
    // Runnables phase
    // =========================================================================

    async fn process_runnables(
        &self,
        job: &Job,
        token: &CancellationToken,
        container_id: &str,
    ) -> Result<()> {
        let runnables = runnable::find_pending_by_job(&self.pool, job.id).await?;
        if runnables.is_empty() {
            debug!("No runnables defined for job {}", job.id);
            return Ok(());
        }

        info!("Processing {} runnables for job {}", runnables.len(), job.id);

        let staging = self
            .config
            .tmp_root
            .join(format!("rapidflow-job-{}", job.id));
        std::fs::create_dir_all(&staging)
            .with_context(|| format!("failed to create staging directory {}", staging.display()))?;

        for item in runnables {
            runnable::set_status(&self.pool, item.id, RunnableStatus::Running, None).await?;

            match self
                .produce_runnable(job, token, &item, container_id, &staging)
                .await
            {
                Ok(artifact) => {
                    runnable::set_artifact(&self.pool, item.id, &artifact).await?;
                    self.process_deployments(token, &item, &artifact).await?;
                }
                Err(e) => {
                    warn!("Failed to process runnable {}: {:#}", item.name, e);
                    runnable::set_status(
                        &self.pool,
                        item.id,
                        RunnableStatus::Failed,
                        Some(&format!("{:#}", e)),
                    )
                    .await?;
                }
            }
        }

        if let Err(e) = std::fs::remove_dir_all(&staging) {
            debug!("Failed to remove staging directory {}: {}", staging.display(), e);
        }

        Ok(())
    }

    async fn produce_runnable(
        &self,
        job: &Job,
        token: &CancellationToken,
        item: &Runnable,
        container_id: &str,
        staging: &Path,
    ) -> Result<String> {
        info!("Processing runnable: {} (type: {})", item.name, item.runnable_type);

        let config: RunnableConfig =
            serde_json::from_str(&item.config).context("failed to parse runnable config")?;

        match item.runnable_type.as_str() {
            "docker_container" => {
                self.produce_container(job, token, item, config, container_id)
                    .await
            }
            "docker_image" => {
                self.produce_image(token, item, &config, container_id, staging)
                    .await
            }
            "artifacts" | "serverless" => {
                self.produce_archive(token, item, container_id, staging).await
            }
            other => anyhow::bail!("unsupported runnable type: {}", other),
        }
    }

    /// Commit the build container to an image and launch a fresh container
    /// from it, returning the `container:{id}:{name}` sentinel.
    async fn produce_container(
        &self,
        job: &Job,
        token: &CancellationToken,
        item: &Runnable,
        mut config: RunnableConfig,
        container_id: &str,
    ) -> Result<String> {
        // The workspace is a bind mount; copy it into the container
        // filesystem so the committed image is self-contained.
        let copy = self
            .exec_quiet(
                token,
                container_id,
                &format!("mkdir -p {0} && cp -r {1}/* {0}/ && ls -la {0}/", APP_DIR, WORKSPACE),
            )
            .await?;
        if !copy.success() {
            anyhow::bail!(
                "copy failed with exit code {}: {}",
                copy.exit_code,
                copy.output.trim()
            );
        }

        if config.ports.is_empty() && job.expose_ports {
            let envs = job::envs_by_job(&self.pool, job.id).await?;
            if let Some(port) = envs.iter().find(|e| e.key == "PORT") {
                debug!("Using default port from environment: {}", port.value);
                config.ports = vec![port.value.clone()];
            } else {
                debug!("Using fallback default port: 3000");
                config.ports = vec!["3000".to_string()];
            }
        }

        // Entrypoints authored against the bind mount must point at the
        // copied tree instead.
        let entrypoint: Vec<String> = config
            .entrypoint
            .iter()
            .map(|entry| match entry.strip_prefix("/workspace/") {
                Some(rest) => format!("{}/{}", APP_DIR, rest),
                None => entry.clone(),
            })
            .collect();

        if let Some(head) = entrypoint.first() {
            let check = self
                .exec_quiet(token, container_id, &format!("ls -la {}", head))
                .await?;
            if !check.success() {
                anyhow::bail!(
                    "entrypoint file {} does not exist (exit code {}): {}",
                    head,
                    check.exit_code,
                    check.output.trim()
                );
            }

            let chmod = self
                .exec_quiet(token, container_id, &format!("chmod +x {0} && ls -la {0}", head))
                .await?;
            if !chmod.success() {
                anyhow::bail!(
                    "chmod failed with exit code {}: {}",
                    chmod.exit_code,
                    chmod.output.trim()
                );
            }
        }

        let image_name = non_empty(config.image_name.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| format!("rapidflow-job-{}-{}", item.job_id, item.name));

        let image_id = self.runtime.commit(token, container_id, &image_name).await?;
        info!("Created image {} with name {}", image_id, image_name);

        let mut exposed_ports = Vec::new();
        let mut port_bindings = Vec::new();
        for spec in &config.ports {
            let mapping = ports::parse_port_mapping(spec)
                .with_context(|| format!("failed to parse port mapping '{}'", spec))?;
            exposed_ports.push(mapping.container_port.clone());
            port_bindings.push(mapping);
        }

        let container_name = non_empty(config.container_name.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| format!("rapidflow-run-{}-{}", item.job_id, item.name));

        if let Err(e) = self.remove_container_by_name(&container_name).await {
            warn!(
                "Failed to handle existing container '{}': {:#}",
                container_name, e
            );
        }

        let env = config
            .environment
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let new_id = self
            .runtime
            .create_container(
                token,
                CreateContainerOpts {
                    image: image_id,
                    env,
                    tty: false,
                    exposed_ports,
                    port_bindings,
                    working_dir: Some(APP_DIR.to_string()),
                    entrypoint,
                    name: Some(container_name.clone()),
                    ..Default::default()
                },
            )
            .await?;
        self.runtime.start_container(token, &new_id).await?;

        info!("Started container {} (name: {})", new_id, container_name);
        Ok(format!("container:{}:{}", new_id, container_name))
    }

    async fn produce_image(
        &self,
        token: &CancellationToken,
        item: &Runnable,
        config: &RunnableConfig,
        container_id: &str,
        staging: &Path,
    ) -> Result<String> {
        let image_name = non_empty(config.image_name.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| format!("rapidflow-job-{}-{}", item.job_id, item.name));

        let image_id = self.runtime.commit(token, container_id, &image_name).await?;

        let image_path = staging.join(format!("{}-image.tar", item.name));
        self.runtime
            .save_image(token, &image_id, &image_path)
            .await
            .context("failed to save image")?;

        info!("Saved image '{}' to {}", image_name, image_path.display());
        Ok(image_path.to_string_lossy().into_owned())
    }

    async fn produce_archive(
        &self,
        token: &CancellationToken,
        item: &Runnable,
        container_id: &str,
        staging: &Path,
    ) -> Result<String> {
        self.runtime
            .copy_from(token, container_id, WORKSPACE, staging)
            .await
            .context("failed to copy workspace")?;

        let zip_path = staging.join(format!("{}-artifacts.zip", item.name));
        archive::create_zip_archive(&staging.join("workspace"), &zip_path)
            .context("failed to create zip archive")?;

        info!("Created artifacts zip: {}", zip_path.display());
        Ok(zip_path.to_string_lossy().into_owned())
    }

    // =========================================================================
    // Deployments phase
    // =========================================================================

    async fn process_deployments(
        &self,
        token: &CancellationToken,
        item: &Runnable,
        artifact_path: &str,
    ) -> Result<()> {
        let deployments = deployment::find_pending_by_runnable(&self.pool, item.id).await?;
        info!(
            "Processing {} deployments for runnable {}",
            deployments.len(),
            item.name
        );

        for dep in deployments {
            let provider = match self.providers.lookup(&dep.output_type) {
                Some(provider) => provider,
                None => {
                    deployment::set_status(
                        &self.pool,
                        dep.id,
                        rapidflow_core::domain::DeploymentStatus::Failed,
                        Some(&format!("provider type {} not found", dep.output_type)),
                    )
                    .await?;
                    continue;
                }
            };

            match provider.deploy(token, item, &dep, artifact_path).await {
                Ok(()) => {
                    deployment::set_status(
                        &self.pool,
                        dep.id,
                        rapidflow_core::domain::DeploymentStatus::Success,
                        None,
                    )
                    .await?;
                }
                Err(e) => {
                    warn!("Failed to process deployment {}: {:#}", dep.id, e);
                    deployment::set_status(
                        &self.pool,
                        dep.id,
                        rapidflow_core::domain::DeploymentStatus::Failed,
                        Some(&format!("{:#}", e)),
                    )
                    .await?;
                }
            }
        }

        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn remove_container_by_name(&self, name: &str) -> Result<()> {
        let containers = self.runtime.list_containers().await?;
        for container in containers {
            if container.names.iter().any(|n| n == name) {
                info!("Removing existing container '{}' (ID: {})", name, container.id);
                self.runtime.remove(&container.id).await?;
                return Ok(());
            }
        }
        debug!("Container {} not found", name);
        Ok(())
    }

    /// Exec a shell command, logging output at debug level only.
    async fn exec_quiet(
        &self,
        token: &CancellationToken,
        container_id: &str,
        command: &str,
    ) -> Result<crate::docker::ExecResult> {
        let mut on_line = |line: &str| debug!("{}", line);
        self.runtime
            .exec(token, container_id, &shell_command(command), &mut on_line)
            .await
    }

    fn ensure_not_cancelled(&self, job_id: i64, token: &CancellationToken) -> Result<()> {
        if token.is_cancelled() {
            anyhow::bail!("job {} was cancelled", job_id);
        }
        Ok(())
    }
}

fn shell_command(content: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), content.to_string()]
}

/// Quote-safe file write. The observable content matches a naive
/// `echo '{content}' > {name}` for quote-free input.
fn write_file_command(name: &str, content: &str) -> String {
    format!(
        "cat > {} <<'{}'\n{}\n{}",
        name, HEREDOC_MARKER, content, HEREDOC_MARKER
    )
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}
