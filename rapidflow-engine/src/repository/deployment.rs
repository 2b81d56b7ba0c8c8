//! Deployment repository

use rapidflow_core::domain::{Deployment, DeploymentStatus};
use sqlx::SqlitePool;

pub async fn create(
    pool: &SqlitePool,
    runnable_id: i64,
    output_type: &str,
    config_json: &str,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO deployments (runnable_id, output_type, config, status, created_at)
        VALUES (?, ?, ?, 'pending', ?)
        "#,
    )
    .bind(runnable_id)
    .bind(output_type)
    .bind(config_json)
    .bind(chrono::Utc::now())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn find_by_runnable(
    pool: &SqlitePool,
    runnable_id: i64,
) -> Result<Vec<Deployment>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DeploymentRow>(
        "SELECT * FROM deployments WHERE runnable_id = ? ORDER BY id",
    )
    .bind(runnable_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Pending deployments of a runnable in declaration order.
pub async fn find_pending_by_runnable(
    pool: &SqlitePool,
    runnable_id: i64,
) -> Result<Vec<Deployment>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DeploymentRow>(
        "SELECT * FROM deployments WHERE runnable_id = ? AND status = 'pending' ORDER BY id",
    )
    .bind(runnable_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

pub async fn find_by_job(pool: &SqlitePool, job_id: i64) -> Result<Vec<Deployment>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DeploymentRow>(
        r#"
        SELECT d.* FROM deployments d
        JOIN runnables r ON r.id = d.runnable_id
        WHERE r.job_id = ?
        ORDER BY d.id
        "#,
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

pub async fn set_status(
    pool: &SqlitePool,
    id: i64,
    status: DeploymentStatus,
    output: Option<&str>,
) -> Result<(), sqlx::Error> {
    match output {
        Some(output) => {
            sqlx::query("UPDATE deployments SET status = ?, output = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(output)
                .bind(id)
                .execute(pool)
                .await?;
        }
        None => {
            sqlx::query("UPDATE deployments SET status = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(id)
                .execute(pool)
                .await?;
        }
    }

    Ok(())
}

#[derive(sqlx::FromRow)]
struct DeploymentRow {
    id: i64,
    runnable_id: i64,
    output_type: String,
    config: String,
    status: String,
    url: Option<String>,
    output: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<DeploymentRow> for Deployment {
    fn from(row: DeploymentRow) -> Self {
        Deployment {
            id: row.id,
            runnable_id: row.runnable_id,
            output_type: row.output_type,
            config: row.config,
            status: DeploymentStatus::parse(&row.status),
            url: row.url,
            output: row.output,
            created_at: row.created_at,
        }
    }
}
