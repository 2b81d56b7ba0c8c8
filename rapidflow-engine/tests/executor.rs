//! End-to-end executor scenarios against an in-memory store and a scripted
//! container runtime.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use rapidflow_core::config::parse_pipeline_config;
use rapidflow_core::domain::{
    Deployment, DeploymentStatus, JobStatus, Runnable, RunnableStatus, StepStatus,
};
use rapidflow_engine::cancel::CancellationRegistry;
use rapidflow_engine::config::EngineConfig;
use rapidflow_engine::docker::{
    ContainerRuntime, ContainerSummary, CreateContainerOpts, ExecResult,
};
use rapidflow_engine::executor::Executor;
use rapidflow_engine::repository::{deployment, job, pipeline, runnable, step};
use rapidflow_engine::{db, intake, stop, Engine};
use rapidflow_providers::{OutputProvider, ProviderRegistry};

// =============================================================================
// Stub runtime
// =============================================================================

#[derive(Debug, Clone)]
struct StubContainer {
    id: String,
    name: String,
    running: bool,
}

#[derive(Debug, Default)]
struct StubState {
    containers: Vec<StubContainer>,
    removed: Vec<String>,
    pulls: Vec<String>,
    fail_pulls: HashSet<String>,
    execs: Vec<String>,
    commits: Vec<String>,
}

/// Scripted runtime: exec behavior is keyed off the command text.
#[derive(Debug, Default)]
struct StubRuntime {
    state: Mutex<StubState>,
    counter: AtomicI64,
}

impl StubRuntime {
    fn new() -> Self {
        Self::default()
    }

    fn fail_pull(&self, reference: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_pulls
            .insert(reference.to_string());
    }

    fn removed(&self) -> Vec<String> {
        self.state.lock().unwrap().removed.clone()
    }

    fn pulls(&self) -> Vec<String> {
        self.state.lock().unwrap().pulls.clone()
    }

    fn execs(&self) -> Vec<String> {
        self.state.lock().unwrap().execs.clone()
    }

    fn live_containers(&self) -> Vec<StubContainer> {
        self.state.lock().unwrap().containers.clone()
    }

    fn commits(&self) -> Vec<String> {
        self.state.lock().unwrap().commits.clone()
    }
}

#[async_trait]
impl ContainerRuntime for StubRuntime {
    async fn pull_image(&self, _cancel: &CancellationToken, reference: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.pulls.push(reference.to_string());
        if state.fail_pulls.contains(reference) {
            anyhow::bail!("pull failed for {}", reference);
        }
        Ok(())
    }

    async fn create_container(
        &self,
        _cancel: &CancellationToken,
        opts: CreateContainerOpts,
    ) -> Result<String> {
        let id = format!("ctr-{}", self.counter.fetch_add(1, Ordering::SeqCst));
        self.state.lock().unwrap().containers.push(StubContainer {
            id: id.clone(),
            name: opts.name.unwrap_or_default(),
            running: false,
        });
        Ok(id)
    }

    async fn start_container(&self, _cancel: &CancellationToken, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.containers.iter_mut().find(|c| c.id == id) {
            Some(container) => {
                container.running = true;
                Ok(())
            }
            None => anyhow::bail!("no such container: {}", id),
        }
    }

    async fn exec(
        &self,
        cancel: &CancellationToken,
        _id: &str,
        cmd: &[String],
        on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<ExecResult> {
        let content = if cmd.len() == 3 && cmd[0] == "sh" {
            cmd[2].clone()
        } else {
            cmd.join(" ")
        };
        self.state.lock().unwrap().execs.push(content.clone());

        if content.contains("sleep 30") {
            cancel.cancelled().await;
            anyhow::bail!("exec cancelled");
        }
        if content.starts_with("cat > fail") {
            return Ok(ExecResult {
                exit_code: 1,
                output: String::new(),
            });
        }
        if let Some(rest) = content.strip_prefix("exit ") {
            return Ok(ExecResult {
                exit_code: rest.trim().parse().unwrap_or(1),
                output: String::new(),
            });
        }
        if let Some(rest) = content.strip_prefix("echo ") {
            on_line(rest);
            return Ok(ExecResult {
                exit_code: 0,
                output: format!("{}\n", rest),
            });
        }
        Ok(ExecResult {
            exit_code: 0,
            output: String::new(),
        })
    }

    async fn commit(
        &self,
        _cancel: &CancellationToken,
        _id: &str,
        reference: &str,
    ) -> Result<String> {
        self.state.lock().unwrap().commits.push(reference.to_string());
        Ok(format!("sha256:stub-{}", reference))
    }

    async fn copy_from(
        &self,
        _cancel: &CancellationToken,
        _id: &str,
        _src_path: &str,
        dst_dir: &Path,
    ) -> Result<()> {
        let workspace = dst_dir.join("workspace");
        std::fs::create_dir_all(&workspace)?;
        std::fs::write(workspace.join("artifact.txt"), b"built")?;
        Ok(())
    }

    async fn save_image(
        &self,
        _cancel: &CancellationToken,
        _image: &str,
        dst_path: &Path,
    ) -> Result<()> {
        std::fs::write(dst_path, b"image-tar")?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.removed.push(id.to_string());
        state.containers.retain(|c| c.id != id);
        Ok(())
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .containers
            .iter()
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                names: vec![c.name.clone()],
            })
            .collect())
    }
}

struct FailingProvider;

#[async_trait]
impl OutputProvider for FailingProvider {
    fn provider_type(&self) -> &'static str {
        "blackhole"
    }

    async fn deploy(
        &self,
        _cancel: &CancellationToken,
        _runnable: &Runnable,
        _deployment: &Deployment,
        _artifact_path: &str,
    ) -> Result<()> {
        anyhow::bail!("blackhole always fails")
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    pool: SqlitePool,
    runtime: Arc<StubRuntime>,
    cancels: Arc<CancellationRegistry>,
    executor: Executor,
    pipeline_id: i64,
    job_id: i64,
    _tmp: TempDir,
    scripts_dir: std::path::PathBuf,
}

async fn harness(config_text: &str) -> Harness {
    let pool = db::create_memory_pool().await.unwrap();
    db::run_migrations(&pool).await.unwrap();

    let tmp = TempDir::new().unwrap();
    let tmp_root = tmp.path().join("tmp");
    let scripts_dir = tmp.path().join("scripts");
    std::fs::create_dir_all(&tmp_root).unwrap();
    std::fs::create_dir_all(&scripts_dir).unwrap();

    let config = parse_pipeline_config(config_text).unwrap();
    let pipeline_id = pipeline::create(&pool, &config.name, config_text)
        .await
        .unwrap();
    let job_id = intake::create_job(&pool, pipeline_id, &config).await.unwrap();

    let runtime = Arc::new(StubRuntime::new());
    let cancels = Arc::new(CancellationRegistry::new());

    let mut providers = ProviderRegistry::with_defaults();
    providers.register(Arc::new(FailingProvider));

    let engine_config = EngineConfig {
        tmp_root: tmp_root.clone(),
        scripts_dir: scripts_dir.clone(),
        ..EngineConfig::default()
    };

    let executor = Executor::new(
        pool.clone(),
        Arc::clone(&runtime) as Arc<dyn ContainerRuntime>,
        Arc::new(providers),
        Arc::clone(&cancels),
        engine_config,
    );

    Harness {
        pool,
        runtime,
        cancels,
        executor,
        pipeline_id,
        job_id,
        _tmp: tmp,
        scripts_dir,
    }
}

async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within timeout");
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn scenario_a_happy_path() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    std::fs::create_dir_all(&src).unwrap();

    let config = format!(
        r#"
name: A
language: golang
version: "1.21"
folder: {}
env:
  FOO: bar
steps:
  - type: bash
    content: echo hello
  - type: bash
    content: echo world
"#,
        src.display()
    );
    let h = harness(&config).await;

    h.executor.run(h.job_id).await.unwrap();

    let job = job::find_by_id(&h.pool, h.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Success);
    assert!(job.started_at.is_some());
    assert!(job.finished_at.is_some());

    let steps = step::find_by_job(&h.pool, h.job_id).await.unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].status, StepStatus::Success);
    assert!(steps[0].output.as_deref().unwrap().contains("hello"));
    assert_eq!(steps[1].status, StepStatus::Success);
    assert!(steps[1].output.as_deref().unwrap().contains("world"));

    // Non-temporary: the build container is removed on exit.
    let container_id = job.container_id.unwrap();
    assert!(h.runtime.removed().contains(&container_id));
    assert!(h.runtime.live_containers().is_empty());
}

#[tokio::test]
async fn scenario_b_mid_pipeline_failure() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    std::fs::create_dir_all(&src).unwrap();

    let config = format!(
        r#"
name: B
language: golang
version: "1.21"
folder: {}
steps:
  - type: bash
    content: exit 7
  - type: bash
    content: echo world
"#,
        src.display()
    );
    let h = harness(&config).await;

    assert!(h.executor.run(h.job_id).await.is_err());

    let job = job::find_by_id(&h.pool, h.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);

    let steps = step::find_by_job(&h.pool, h.job_id).await.unwrap();
    assert_eq!(steps[0].status, StepStatus::Failed);
    assert_eq!(steps[1].status, StepStatus::Pending);

    let container_id = job.container_id.unwrap();
    assert!(h.runtime.removed().contains(&container_id));
}

#[tokio::test]
async fn scenario_c_external_cancellation_during_step() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    std::fs::create_dir_all(&src).unwrap();

    let config = format!(
        r#"
name: C
language: golang
version: "1.21"
folder: {}
steps:
  - type: bash
    content: echo ready
  - type: bash
    content: sleep 30
"#,
        src.display()
    );
    let h = harness(&config).await;

    let executor = h.executor;
    let job_id = h.job_id;
    let handle = tokio::spawn(async move { executor.run(job_id).await });

    let pool = h.pool.clone();
    wait_until(|| {
        let pool = pool.clone();
        async move {
            let steps = step::find_by_job(&pool, job_id).await.unwrap();
            steps.len() == 2 && steps[1].status == StepStatus::Running
        }
    })
    .await;

    job::mark_cancelled(&h.pool, job_id).await.unwrap();
    assert!(h.cancels.cancel(job_id));

    handle.await.unwrap().unwrap();

    let job = job::find_by_id(&h.pool, job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.finished_at.is_some());

    let steps = step::find_by_job(&h.pool, job_id).await.unwrap();
    assert_eq!(steps[0].status, StepStatus::Success);
    assert_eq!(steps[1].status, StepStatus::Cancelled);

    let container_id = job.container_id.unwrap();
    assert!(h.runtime.removed().contains(&container_id));
}

#[tokio::test]
async fn scenario_d_runnable_with_failing_deployment() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    std::fs::create_dir_all(&src).unwrap();
    let deploy_target = tmp.path().join("deployed/artifact.zip");

    let config = format!(
        r#"
name: D
language: golang
version: "1.21"
folder: {}
steps:
  - type: bash
    content: echo build
runnables:
  - name: pkg
    type: artifacts
    enabled: true
    outputs:
      - type: local
        config:
          path: {}
      - type: webhook
        config:
          url: http://127.0.0.1:9/hook
          method: POST
"#,
        src.display(),
        deploy_target.display()
    );
    let h = harness(&config).await;

    h.executor.run(h.job_id).await.unwrap();

    let job = job::find_by_id(&h.pool, h.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Success);

    let runnables = runnable::find_by_job(&h.pool, h.job_id).await.unwrap();
    assert_eq!(runnables.len(), 1);
    assert_eq!(runnables[0].status, RunnableStatus::Success);
    assert!(runnables[0]
        .artifact_url
        .as_deref()
        .unwrap()
        .ends_with("pkg-artifacts.zip"));

    let deployments = deployment::find_by_runnable(&h.pool, runnables[0].id)
        .await
        .unwrap();
    assert_eq!(deployments.len(), 2);
    assert_eq!(deployments[0].status, DeploymentStatus::Success);
    assert_eq!(deployments[1].status, DeploymentStatus::Failed);
    assert!(deployments[1].output.is_some());

    // The local deployment really copied the artifact.
    assert!(deploy_target.exists());
}

#[tokio::test]
async fn scenario_e_fallback_image_and_detection() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    std::fs::create_dir_all(&src).unwrap();
    std::fs::write(src.join("go.mod"), "module demo\n\ngo 1.22\n").unwrap();

    let config = format!(
        r#"
name: E
folder: {}
steps:
  - type: bash
    content: echo built
"#,
        src.display()
    );
    let h = harness(&config).await;

    std::fs::write(
        h.scripts_dir.join("golang-1.22.sh"),
        "#!/bin/sh\necho installing go\n",
    )
    .unwrap();
    h.runtime.fail_pull("golang:1.22");

    h.executor.run(h.job_id).await.unwrap();

    let job = job::find_by_id(&h.pool, h.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Success);
    assert_eq!(job.language.as_deref(), Some("golang"));
    assert_eq!(job.version.as_deref(), Some("1.22"));

    assert_eq!(h.runtime.pulls(), vec!["golang:1.22", "ubuntu:latest"]);

    // The install script ran before the step loop.
    let execs = h.runtime.execs();
    let install_pos = execs.iter().position(|e| e == "/tmp/install.sh").unwrap();
    let step_pos = execs.iter().position(|e| e == "echo built").unwrap();
    assert!(install_pos < step_pos);
}

#[tokio::test]
async fn scenario_f_temporary_job_lifecycle() {
    let tmp = TempDir::new().unwrap();

    // A real repository so the shallow clone path runs end to end.
    let repo = tmp.path().join("repo");
    std::fs::create_dir_all(&repo).unwrap();
    let git = |args: &[&str]| {
        let status = std::process::Command::new("git")
            .args(args)
            .current_dir(&repo)
            .status()
            .unwrap();
        assert!(status.success(), "git {:?} failed", args);
    };
    git(&["init", "-q", "-b", "main"]);
    git(&["config", "user.email", "ci@test"]);
    git(&["config", "user.name", "ci"]);
    std::fs::write(repo.join("server"), "#!/bin/sh\n").unwrap();
    git(&["add", "."]);
    git(&["commit", "-q", "-m", "init"]);

    let config = format!(
        r#"
name: F
language: golang
version: "1.21"
repo_url: {}
temporary: true
steps:
  - type: bash
    content: echo build
runnables:
  - name: web
    type: docker_container
    enabled: true
    image_name: my-img
    container_name: my-run
    entrypoint: ["/workspace/server"]
    ports: ["8080:3000"]
"#,
        repo.display()
    );
    let h = harness(&config).await;

    h.executor.run(h.job_id).await.unwrap();

    let job = job::find_by_id(&h.pool, h.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Success);

    // The clone landed in the recorded temp directory.
    let temp_dir = job.temp_dir.clone().unwrap();
    assert!(temp_dir.contains(&format!("rapidflow-repo-{}", h.job_id)));
    assert!(Path::new(&temp_dir).join("server").exists());

    // Build container still alive, runnable container running under its name.
    let build_container = job.container_id.clone().unwrap();
    let live = h.runtime.live_containers();
    assert!(live.iter().any(|c| c.id == build_container && c.running));
    assert!(live.iter().any(|c| c.name == "my-run" && c.running));

    let runnables = runnable::find_by_job(&h.pool, h.job_id).await.unwrap();
    assert_eq!(runnables[0].status, RunnableStatus::Success);
    let sentinel = runnables[0].artifact_url.clone().unwrap();
    assert!(sentinel.starts_with("container:"));
    assert!(sentinel.ends_with(":my-run"));
    assert_eq!(h.runtime.commits(), vec!["my-img"]);

    // stop-pipeline reclaims everything and marks the job stopped.
    stop::stop_pipeline(
        &h.pool,
        h.runtime.as_ref(),
        &h.cancels,
        h.pipeline_id,
    )
    .await
    .unwrap();

    assert!(h.runtime.live_containers().is_empty());
    assert!(!Path::new(&temp_dir).exists());

    let job = job::find_by_id(&h.pool, h.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Stopped);
}

// =============================================================================
// Universal invariants
// =============================================================================

#[tokio::test]
async fn preflight_cancellation_settles_without_resources() {
    let h = harness(
        r#"
name: preflight
folder: ./does-not-matter
steps:
  - type: bash
    content: echo never
"#,
    )
    .await;

    job::mark_cancelled(&h.pool, h.job_id).await.unwrap();
    h.executor.run(h.job_id).await.unwrap();

    let job = job::find_by_id(&h.pool, h.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.container_id.is_none());

    let steps = step::find_by_job(&h.pool, h.job_id).await.unwrap();
    assert_eq!(steps[0].status, StepStatus::Cancelled);

    assert!(h.runtime.pulls().is_empty());
    assert!(h.runtime.live_containers().is_empty());
}

#[tokio::test]
async fn missing_sources_is_terminal_before_any_container() {
    let h = harness(
        r#"
name: no-sources
steps:
  - type: bash
    content: echo never
"#,
    )
    .await;

    let err = h.executor.run(h.job_id).await.unwrap_err();
    assert!(err.to_string().contains("either repo_url or folder"));

    let job = job::find_by_id(&h.pool, h.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(h.runtime.live_containers().is_empty());
}

#[tokio::test]
async fn file_write_failure_is_soft() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    std::fs::create_dir_all(&src).unwrap();

    let config = format!(
        r#"
name: soft
language: golang
version: "1.21"
folder: {}
steps:
  - type: bash
    content: echo first
    files:
      fail.txt: boom
  - type: bash
    content: echo second
"#,
        src.display()
    );
    let h = harness(&config).await;

    h.executor.run(h.job_id).await.unwrap();

    let steps = step::find_by_job(&h.pool, h.job_id).await.unwrap();
    // The failed file write marks the step failed but does not halt the job.
    assert_eq!(steps[0].status, StepStatus::Failed);
    assert_eq!(steps[0].output.as_deref(), Some("Failed to create file"));
    assert_eq!(steps[1].status, StepStatus::Success);

    let job = job::find_by_id(&h.pool, h.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Success);
}

#[tokio::test]
async fn unknown_step_type_is_ignored_with_success() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    std::fs::create_dir_all(&src).unwrap();

    let config = format!(
        r#"
name: odd-step
language: golang
version: "1.21"
folder: {}
steps:
  - type: groovy
    content: println "nope"
  - type: bash
    content: echo fine
"#,
        src.display()
    );
    let h = harness(&config).await;

    h.executor.run(h.job_id).await.unwrap();

    let steps = step::find_by_job(&h.pool, h.job_id).await.unwrap();
    assert_eq!(steps[0].status, StepStatus::Success);
    assert_eq!(steps[1].status, StepStatus::Success);
}

#[tokio::test]
async fn provider_failure_is_isolated_from_runnable_and_peers() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    std::fs::create_dir_all(&src).unwrap();
    let deploy_target = tmp.path().join("out/artifact.zip");

    let config = format!(
        r#"
name: isolation
language: golang
version: "1.21"
folder: {}
steps:
  - type: bash
    content: echo build
runnables:
  - name: pkg
    type: artifacts
    enabled: true
    outputs:
      - type: blackhole
        config: {{}}
      - type: local
        config:
          path: {}
"#,
        src.display(),
        deploy_target.display()
    );
    let h = harness(&config).await;

    h.executor.run(h.job_id).await.unwrap();

    let runnables = runnable::find_by_job(&h.pool, h.job_id).await.unwrap();
    assert_eq!(runnables[0].status, RunnableStatus::Success);

    let deployments = deployment::find_by_runnable(&h.pool, runnables[0].id)
        .await
        .unwrap();
    assert_eq!(deployments[0].status, DeploymentStatus::Failed);
    assert!(deployments[0]
        .output
        .as_deref()
        .unwrap()
        .contains("blackhole always fails"));
    assert_eq!(deployments[1].status, DeploymentStatus::Success);
    assert!(deploy_target.exists());

    let job = job::find_by_id(&h.pool, h.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Success);
}

#[tokio::test]
async fn unknown_provider_fails_only_that_deployment() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    std::fs::create_dir_all(&src).unwrap();
    let deploy_target = tmp.path().join("out/artifact.zip");

    let config = format!(
        r#"
name: no-provider
language: golang
version: "1.21"
folder: {}
steps:
  - type: bash
    content: echo build
runnables:
  - name: pkg
    type: artifacts
    enabled: true
    outputs:
      - type: carrier-pigeon
        config: {{}}
      - type: local
        config:
          path: {}
"#,
        src.display(),
        deploy_target.display()
    );
    let h = harness(&config).await;

    h.executor.run(h.job_id).await.unwrap();

    let runnables = runnable::find_by_job(&h.pool, h.job_id).await.unwrap();
    assert_eq!(runnables[0].status, RunnableStatus::Success);

    let deployments = deployment::find_by_runnable(&h.pool, runnables[0].id)
        .await
        .unwrap();
    assert_eq!(deployments[0].status, DeploymentStatus::Failed);
    assert!(deployments[0]
        .output
        .as_deref()
        .unwrap()
        .contains("provider type carrier-pigeon not found"));
    assert_eq!(deployments[1].status, DeploymentStatus::Success);
}

#[tokio::test]
async fn runnable_producer_failure_does_not_fail_job() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    std::fs::create_dir_all(&src).unwrap();

    // An unsupported type is written directly to the store, bypassing
    // intake validation, to exercise the executor's defensive path.
    let config = format!(
        r#"
name: bad-runnable
language: golang
version: "1.21"
folder: {}
steps:
  - type: bash
    content: echo build
"#,
        src.display()
    );
    let h = harness(&config).await;

    runnable::create(&h.pool, h.job_id, "mystery", "rocket", "{}")
        .await
        .unwrap();
    let runnable_id = runnable::find_by_job(&h.pool, h.job_id).await.unwrap()[0].id;
    deployment::create(&h.pool, runnable_id, "local", "{\"path\": \"/tmp/x\"}")
        .await
        .unwrap();

    h.executor.run(h.job_id).await.unwrap();

    let job = job::find_by_id(&h.pool, h.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Success);

    let runnables = runnable::find_by_job(&h.pool, h.job_id).await.unwrap();
    assert_eq!(runnables[0].status, RunnableStatus::Failed);
    assert!(runnables[0]
        .output
        .as_deref()
        .unwrap()
        .contains("unsupported runnable type"));

    // Its deployments were skipped entirely.
    let deployments = deployment::find_by_runnable(&h.pool, runnable_id)
        .await
        .unwrap();
    assert_eq!(deployments[0].status, DeploymentStatus::Pending);
}

#[tokio::test]
async fn dispatcher_picks_up_pending_job() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    std::fs::create_dir_all(&src).unwrap();

    let config_text = format!(
        r#"
name: queued
language: golang
version: "1.21"
folder: {}
steps:
  - type: bash
    content: echo queued
"#,
        src.display()
    );

    let pool = db::create_memory_pool().await.unwrap();
    db::run_migrations(&pool).await.unwrap();

    let config = parse_pipeline_config(&config_text).unwrap();
    let pipeline_id = pipeline::create(&pool, &config.name, &config_text)
        .await
        .unwrap();
    let job_id = intake::create_job(&pool, pipeline_id, &config).await.unwrap();

    let engine_config = EngineConfig {
        tmp_root: tmp.path().join("tmp"),
        scripts_dir: tmp.path().join("scripts"),
        poll_interval: Duration::from_millis(50),
        ..EngineConfig::default()
    };
    let engine = Engine::new(
        pool.clone(),
        Arc::new(StubRuntime::new()),
        Arc::new(ProviderRegistry::with_defaults()),
        engine_config,
    );

    let dispatcher = engine.spawn_dispatcher();

    wait_until(|| {
        let pool = pool.clone();
        async move {
            let job = job::find_by_id(&pool, job_id).await.unwrap().unwrap();
            job.status == JobStatus::Success
        }
    })
    .await;

    dispatcher.abort();
}

#[tokio::test]
async fn terminal_statuses_are_sticky() {
    let h = harness(
        r#"
name: sticky
folder: ./x
steps: []
"#,
    )
    .await;

    job::finish(&h.pool, h.job_id, JobStatus::Cancelled).await.unwrap();
    job::finish(&h.pool, h.job_id, JobStatus::Failed).await.unwrap();

    let job = job::find_by_id(&h.pool, h.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
}
