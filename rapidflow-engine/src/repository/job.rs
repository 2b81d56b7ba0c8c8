//! Job repository
//!
//! Status mutators are sticky: a job that has reached a terminal status is
//! never transitioned out of it, except by the stop-pipeline sweep which
//! uses its dedicated `mark_stopped`.

use rapidflow_core::domain::{Environment, Job, JobStatus};
use sqlx::SqlitePool;

/// Denormalized config slice recorded on a new job row.
#[derive(Debug, Default, Clone)]
pub struct NewJob {
    pub branch: Option<String>,
    pub repo_name: Option<String>,
    pub repo_url: Option<String>,
    pub language: Option<String>,
    pub version: Option<String>,
    pub folder: Option<String>,
    pub expose_ports: bool,
    pub temporary: bool,
}

/// Insert a job in `pending` state.
pub async fn create(pool: &SqlitePool, pipeline_id: i64, new: &NewJob) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO jobs (pipeline_id, status, branch, repo_name, repo_url, language,
                          version, folder, expose_ports, temporary, cancelled, created_at)
        VALUES (?, 'pending', ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(pipeline_id)
    .bind(&new.branch)
    .bind(&new.repo_name)
    .bind(&new.repo_url)
    .bind(&new.language)
    .bind(&new.version)
    .bind(&new.folder)
    .bind(new.expose_ports)
    .bind(new.temporary)
    .bind(chrono::Utc::now())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.into()))
}

pub async fn find_by_pipeline(pool: &SqlitePool, pipeline_id: i64) -> Result<Vec<Job>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobRow>(
        "SELECT * FROM jobs WHERE pipeline_id = ? ORDER BY created_at DESC",
    )
    .bind(pipeline_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Job>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs ORDER BY created_at DESC")
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Oldest pending job, if any. Single-dispatcher discipline: the caller is
/// the only claimer, so no row locking is taken here.
pub async fn claim_next_pending(pool: &SqlitePool) -> Result<Option<i64>, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM jobs WHERE status = 'pending' ORDER BY created_at ASC, id ASC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(id,)| id))
}

/// Jobs whose cancellation flag was set while they run.
pub async fn find_running_cancelled(pool: &SqlitePool) -> Result<Vec<i64>, sqlx::Error> {
    let rows: Vec<(i64,)> =
        sqlx::query_as("SELECT id FROM jobs WHERE status = 'running' AND cancelled = 1")
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Transition a pending job to `running` with a start timestamp.
pub async fn set_running(pool: &SqlitePool, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE jobs SET status = 'running', started_at = ? WHERE id = ? AND status = 'pending'",
    )
    .bind(chrono::Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Settle a job to a terminal status with a finished timestamp.
///
/// No-op if the job is already terminal.
pub async fn finish(pool: &SqlitePool, id: i64, status: JobStatus) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE jobs SET status = ?, finished_at = ?
        WHERE id = ? AND status IN ('pending', 'running')
        "#,
    )
    .bind(status.as_str())
    .bind(chrono::Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Move a job to `stopped` regardless of its current status. Reserved for
/// the stop-pipeline sweep.
pub async fn mark_stopped(pool: &SqlitePool, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE jobs SET status = 'stopped', finished_at = ? WHERE id = ?")
        .bind(chrono::Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Recovery sweep: demote jobs left in `running` by a crashed process.
///
/// Returns the number of jobs demoted.
pub async fn demote_orphaned_running(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE jobs SET status = 'failed', finished_at = ? WHERE status = 'running'",
    )
    .bind(chrono::Utc::now())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Set the cancellation request flag without changing status.
pub async fn mark_cancelled(pool: &SqlitePool, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE jobs SET cancelled = 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn set_language(pool: &SqlitePool, id: i64, language: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE jobs SET language = ? WHERE id = ?")
        .bind(language)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn set_version(pool: &SqlitePool, id: i64, version: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE jobs SET version = ? WHERE id = ?")
        .bind(version)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn set_temp_dir(pool: &SqlitePool, id: i64, temp_dir: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE jobs SET temp_dir = ? WHERE id = ?")
        .bind(temp_dir)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn set_container_id(
    pool: &SqlitePool,
    id: i64,
    container_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE jobs SET container_id = ? WHERE id = ?")
        .bind(container_id)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

// =============================================================================
// Environments
// =============================================================================

pub async fn insert_env(
    pool: &SqlitePool,
    job_id: i64,
    key: &str,
    value: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO environments (job_id, key, value) VALUES (?, ?, ?)")
        .bind(job_id)
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn envs_by_job(pool: &SqlitePool, job_id: i64) -> Result<Vec<Environment>, sqlx::Error> {
    sqlx::query_as::<_, EnvRow>(
        "SELECT id, job_id, key, value FROM environments WHERE job_id = ? ORDER BY id",
    )
    .bind(job_id)
    .fetch_all(pool)
    .await
    .map(|rows| rows.into_iter().map(|r| r.into()).collect())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: i64,
    pipeline_id: i64,
    status: String,
    branch: Option<String>,
    repo_name: Option<String>,
    repo_url: Option<String>,
    language: Option<String>,
    version: Option<String>,
    folder: Option<String>,
    expose_ports: Option<bool>,
    temporary: Option<bool>,
    temp_dir: Option<String>,
    cancelled: Option<bool>,
    container_id: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Job {
            id: row.id,
            pipeline_id: row.pipeline_id,
            status: JobStatus::parse(&row.status),
            branch: row.branch,
            repo_name: row.repo_name,
            repo_url: row.repo_url,
            language: row.language,
            version: row.version,
            folder: row.folder,
            expose_ports: row.expose_ports.unwrap_or(false),
            temporary: row.temporary.unwrap_or(false),
            temp_dir: row.temp_dir,
            cancelled: row.cancelled.unwrap_or(false),
            container_id: row.container_id,
            created_at: row.created_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct EnvRow {
    id: i64,
    job_id: i64,
    key: String,
    value: String,
}

impl From<EnvRow> for Environment {
    fn from(row: EnvRow) -> Self {
        Environment {
            id: row.id,
            job_id: row.job_id,
            key: row.key,
            value: row.value,
        }
    }
}
