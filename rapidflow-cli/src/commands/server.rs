//! Server command
//!
//! Starts the dispatcher and the HTTP facade over a shared engine.

use anyhow::{Context, Result};
use tracing::info;

use rapidflow_engine::repository::job;
use rapidflow_server::{api, AppState};

pub async fn run_server() -> Result<()> {
    let engine = super::build_engine().await?;

    // Crash recovery: rows stuck in `running` belong to a previous process.
    let demoted = job::demote_orphaned_running(engine.pool()).await?;
    if demoted > 0 {
        info!("Demoted {} orphaned running job(s) to failed", demoted);
    }

    engine.spawn_dispatcher();

    let state = AppState::new(engine.pool().clone(), engine);
    let app = api::create_router(state);

    let addr = std::env::var("RAPIDFLOW_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    info!("Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
