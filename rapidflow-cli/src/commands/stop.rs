//! Stop command

use anyhow::Result;
use tracing::info;

pub async fn stop_pipeline(pipeline_id: i64) -> Result<()> {
    let engine = super::build_engine().await?;
    let stopped = engine.stop_pipeline(pipeline_id).await?;
    info!("Pipeline {} stopped ({} jobs)", pipeline_id, stopped);
    Ok(())
}
