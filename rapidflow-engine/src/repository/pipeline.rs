//! Pipeline repository

use rapidflow_core::domain::Pipeline;
use sqlx::SqlitePool;

/// Create a new pipeline from its raw config text.
pub async fn create(pool: &SqlitePool, name: &str, config: &str) -> Result<i64, sqlx::Error> {
    let result = sqlx::query("INSERT INTO pipelines (name, config, created_at) VALUES (?, ?, ?)")
        .bind(name)
        .bind(config)
        .bind(chrono::Utc::now())
        .execute(pool)
        .await?;

    Ok(result.last_insert_rowid())
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Pipeline>, sqlx::Error> {
    let row = sqlx::query_as::<_, PipelineRow>(
        "SELECT id, name, config, created_at FROM pipelines WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Pipeline>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PipelineRow>(
        "SELECT id, name, config, created_at FROM pipelines ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Aggregate line for the `list-pipelines` CLI view.
#[derive(Debug, sqlx::FromRow)]
pub struct PipelineSummary {
    pub id: i64,
    pub name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub job_count: i64,
    pub last_job_time: Option<String>,
    pub job_statuses: Option<String>,
}

pub async fn list_summaries(pool: &SqlitePool) -> Result<Vec<PipelineSummary>, sqlx::Error> {
    sqlx::query_as::<_, PipelineSummary>(
        r#"
        SELECT p.id, p.name, p.created_at,
               COUNT(j.id) AS job_count,
               MAX(j.created_at) AS last_job_time,
               GROUP_CONCAT(DISTINCT j.status) AS job_statuses
        FROM pipelines p
        LEFT JOIN jobs j ON p.id = j.pipeline_id
        GROUP BY p.id, p.name, p.created_at
        ORDER BY p.created_at DESC
        "#,
    )
    .fetch_all(pool)
    .await
}

#[derive(sqlx::FromRow)]
struct PipelineRow {
    id: i64,
    name: String,
    config: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<PipelineRow> for Pipeline {
    fn from(row: PipelineRow) -> Self {
        Pipeline {
            id: row.id,
            name: row.name,
            config: row.config,
            created_at: row.created_at,
        }
    }
}
