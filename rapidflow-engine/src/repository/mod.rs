//! Store surface
//!
//! Thin persistence layer over SQLite. One module per entity; plain
//! functions taking the pool, row structs mapped back into domain types.
//! Writes are scoped to single rows and never composed across tables, so
//! readers must treat the job graph as eventually consistent.

pub mod deployment;
pub mod job;
pub mod pipeline;
pub mod runnable;
pub mod step;
