//! List command

use anyhow::Result;

use rapidflow_engine::repository::pipeline;

pub async fn list_pipelines() -> Result<()> {
    let engine = super::build_engine().await?;
    let summaries = pipeline::list_summaries(engine.pool()).await?;

    println!(
        "{:<4} {:<40} {:<8} {:<20} {}",
        "ID", "Name", "Jobs", "Last Run", "Status"
    );
    println!("{}", "-".repeat(80));

    for summary in summaries {
        println!(
            "{:<4} {:<40} {:<8} {:<20} {}",
            summary.id,
            summary.name,
            summary.job_count,
            summary.last_job_time.as_deref().unwrap_or("Never"),
            summary.job_statuses.as_deref().unwrap_or("No jobs"),
        );
    }

    Ok(())
}
