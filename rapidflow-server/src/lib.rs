//! RapidFlow HTTP facade
//!
//! Thin adapter over the shared store and the engine's cancel surface.
//! Handlers read and write the same rows the executor does; the only
//! engine interaction is poking the cancellation registry.

pub mod api;

use rapidflow_engine::Engine;
use sqlx::SqlitePool;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub engine: Engine,
}

impl AppState {
    pub fn new(pool: SqlitePool, engine: Engine) -> Self {
        Self { pool, engine }
    }
}
