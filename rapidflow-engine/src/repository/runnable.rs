//! Runnable repository

use rapidflow_core::domain::{Runnable, RunnableStatus};
use sqlx::SqlitePool;

pub async fn create(
    pool: &SqlitePool,
    job_id: i64,
    name: &str,
    runnable_type: &str,
    config_json: &str,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO runnables (job_id, name, type, config, status, created_at)
        VALUES (?, ?, ?, ?, 'pending', ?)
        "#,
    )
    .bind(job_id)
    .bind(name)
    .bind(runnable_type)
    .bind(config_json)
    .bind(chrono::Utc::now())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn find_by_job(pool: &SqlitePool, job_id: i64) -> Result<Vec<Runnable>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RunnableRow>(
        "SELECT * FROM runnables WHERE job_id = ? ORDER BY id",
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Pending runnables of a job in declaration order.
pub async fn find_pending_by_job(
    pool: &SqlitePool,
    job_id: i64,
) -> Result<Vec<Runnable>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RunnableRow>(
        "SELECT * FROM runnables WHERE job_id = ? AND status = 'pending' ORDER BY id",
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

pub async fn set_status(
    pool: &SqlitePool,
    id: i64,
    status: RunnableStatus,
    output: Option<&str>,
) -> Result<(), sqlx::Error> {
    match output {
        Some(output) => {
            sqlx::query("UPDATE runnables SET status = ?, output = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(output)
                .bind(id)
                .execute(pool)
                .await?;
        }
        None => {
            sqlx::query("UPDATE runnables SET status = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(id)
                .execute(pool)
                .await?;
        }
    }

    Ok(())
}

/// Record the produced artifact handle and mark the runnable successful.
pub async fn set_artifact(
    pool: &SqlitePool,
    id: i64,
    artifact_url: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE runnables SET artifact_url = ?, status = 'success' WHERE id = ?")
        .bind(artifact_url)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

#[derive(sqlx::FromRow)]
struct RunnableRow {
    id: i64,
    job_id: i64,
    name: String,
    #[sqlx(rename = "type")]
    runnable_type: String,
    config: String,
    status: String,
    output: Option<String>,
    artifact_url: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<RunnableRow> for Runnable {
    fn from(row: RunnableRow) -> Self {
        Runnable {
            id: row.id,
            job_id: row.job_id,
            name: row.name,
            runnable_type: row.runnable_type,
            config: row.config,
            status: RunnableStatus::parse(&row.status),
            output: row.output,
            artifact_url: row.artifact_url,
            created_at: row.created_at,
        }
    }
}
