//! Step and file repository

use rapidflow_core::domain::{File, Step, StepStatus};
use sqlx::SqlitePool;

pub async fn create(
    pool: &SqlitePool,
    job_id: i64,
    order_num: i64,
    step_type: &str,
    content: &str,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO steps (job_id, order_num, type, content, status, created_at)
        VALUES (?, ?, ?, ?, 'pending', ?)
        "#,
    )
    .bind(job_id)
    .bind(order_num)
    .bind(step_type)
    .bind(content)
    .bind(chrono::Utc::now())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Steps of a job in execution order.
pub async fn find_by_job(pool: &SqlitePool, job_id: i64) -> Result<Vec<Step>, sqlx::Error> {
    let rows =
        sqlx::query_as::<_, StepRow>("SELECT * FROM steps WHERE job_id = ? ORDER BY order_num")
            .bind(job_id)
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Step>, sqlx::Error> {
    let row = sqlx::query_as::<_, StepRow>("SELECT * FROM steps WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.into()))
}

pub async fn set_status(
    pool: &SqlitePool,
    id: i64,
    status: StepStatus,
    output: Option<&str>,
) -> Result<(), sqlx::Error> {
    match output {
        Some(output) => {
            sqlx::query("UPDATE steps SET status = ?, output = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(output)
                .bind(id)
                .execute(pool)
                .await?;
        }
        None => {
            sqlx::query("UPDATE steps SET status = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(id)
                .execute(pool)
                .await?;
        }
    }

    Ok(())
}

/// Mark every step of a job that has not reached a terminal state as
/// cancelled. Used when the job's cancellation is observed.
pub async fn cancel_open_steps(pool: &SqlitePool, job_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE steps SET status = 'cancelled' WHERE job_id = ? AND status IN ('pending', 'running')",
    )
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(())
}

// =============================================================================
// Files
// =============================================================================

pub async fn insert_file(
    pool: &SqlitePool,
    step_id: i64,
    name: &str,
    content: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO files (step_id, name, content) VALUES (?, ?, ?)")
        .bind(step_id)
        .bind(name)
        .bind(content)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn files_by_step(pool: &SqlitePool, step_id: i64) -> Result<Vec<File>, sqlx::Error> {
    sqlx::query_as::<_, FileRow>(
        "SELECT id, step_id, name, content FROM files WHERE step_id = ? ORDER BY id",
    )
    .bind(step_id)
    .fetch_all(pool)
    .await
    .map(|rows| rows.into_iter().map(|r| r.into()).collect())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct StepRow {
    id: i64,
    job_id: i64,
    order_num: i64,
    #[sqlx(rename = "type")]
    step_type: String,
    content: String,
    status: String,
    output: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<StepRow> for Step {
    fn from(row: StepRow) -> Self {
        Step {
            id: row.id,
            job_id: row.job_id,
            order_num: row.order_num,
            step_type: row.step_type,
            content: row.content,
            status: StepStatus::parse(&row.status),
            output: row.output,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FileRow {
    id: i64,
    step_id: i64,
    name: String,
    content: String,
}

impl From<FileRow> for File {
    fn from(row: FileRow) -> Self {
        File {
            id: row.id,
            step_id: row.step_id,
            name: row.name,
            content: row.content,
        }
    }
}
