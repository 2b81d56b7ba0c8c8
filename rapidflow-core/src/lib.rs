//! RapidFlow Core
//!
//! Core types for the RapidFlow CI/CD engine.
//!
//! This crate contains:
//! - Domain types: persisted entities (Pipeline, Job, Step, Runnable, ...)
//! - Config: the pipeline configuration record and its dialect ingestor

pub mod config;
pub mod domain;
