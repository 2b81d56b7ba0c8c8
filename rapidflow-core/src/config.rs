//! Pipeline configuration ingestor
//!
//! Accepts three textual dialects interchangeably: JSON, YAML, and TOML.
//! The dialect is auto-detected from the first non-whitespace character and
//! the line structure; all three produce the same [`PipelineConfig`].
//!
//! Detection is resolved in the order JSON, YAML, TOML. Inputs whose line
//! structure carries markers of both YAML and TOML are rejected explicitly
//! instead of picking one silently.

use crate::domain::pipeline::{PipelineConfig, RUNNABLE_TYPES};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("empty pipeline configuration")]
    Empty,
    #[error("configuration matches both YAML and TOML dialects; cannot auto-detect")]
    AmbiguousDialect,
    #[error("configuration matches no known dialect (JSON, YAML, TOML)")]
    UnknownDialect,
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Json,
    Yaml,
    Toml,
}

/// Parse a pipeline configuration in any supported dialect and validate it.
pub fn parse_pipeline_config(input: &str) -> Result<PipelineConfig, ConfigError> {
    let config = match detect_dialect(input)? {
        Dialect::Json => serde_json::from_str(input)?,
        Dialect::Yaml => serde_yaml::from_str(input)?,
        Dialect::Toml => toml::from_str(input)?,
    };
    validate(&config)?;
    Ok(config)
}

/// Detect the configuration dialect without parsing the full document.
pub fn detect_dialect(input: &str) -> Result<Dialect, ConfigError> {
    let trimmed = input.trim_start();
    let first = trimmed.chars().next().ok_or(ConfigError::Empty)?;
    if first == '{' || (first == '[' && looks_like_json_array(trimmed)) {
        return Ok(Dialect::Json);
    }

    let mut yaml_markers = false;
    let mut toml_markers = false;
    for line in input.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with("- ") || line == "-" {
            yaml_markers = true;
        } else if (line.starts_with('[') && line.ends_with(']')) || is_toml_assignment(line) {
            toml_markers = true;
        } else if line.contains(':') {
            yaml_markers = true;
        }
    }

    match (yaml_markers, toml_markers) {
        (true, true) => Err(ConfigError::AmbiguousDialect),
        (true, false) => Ok(Dialect::Yaml),
        (false, true) => Ok(Dialect::Toml),
        (false, false) => Err(ConfigError::UnknownDialect),
    }
}

// A leading '[' could open either a JSON array or a TOML table header.
fn looks_like_json_array(trimmed: &str) -> bool {
    matches!(trimmed[1..].trim_start().chars().next(), Some('{' | '"' | ']'))
}

fn is_toml_assignment(line: &str) -> bool {
    match line.split_once('=') {
        Some((key, _)) => {
            let key = key.trim();
            !key.is_empty()
                && !key.contains(':')
                && key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '"')
        }
        None => false,
    }
}

fn validate(config: &PipelineConfig) -> Result<(), ConfigError> {
    if config.name.trim().is_empty() {
        return Err(ConfigError::Invalid("pipeline name must not be empty".into()));
    }
    let mut seen = std::collections::HashSet::new();
    for runnable in &config.runnables {
        if !RUNNABLE_TYPES.contains(&runnable.runnable_type.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "unknown runnable type '{}' for runnable '{}'",
                runnable.runnable_type, runnable.name
            )));
        }
        if !seen.insert(runnable.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "duplicate runnable name '{}'",
                runnable.name
            )));
        }
    }
    Ok(())
}
