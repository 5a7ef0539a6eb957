//! Configuration loading from disk.
//!
//! # Responsibilities
//! - Resolve the configuration location (CLI flag, then environment)
//! - Parse a TOML file into the flat property model
//! - Merge an optional `-ext` override file over the base settings
//!
//! # Design Decisions
//! - TOML tables flatten to `prefix.key` so a `[provider]` section reads
//!   as per-driver settings and top-level keys as defaults
//! - Override entries land after base entries; lookups are last-wins

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::properties::PropertySet;

/// Environment variable naming the configuration file location.
pub const CONFIG_LOCATION_VAR: &str = "GATEWAY_CONFIG";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Configuration file was not found")]
    NotFound,
}

/// Resolve the configuration path: explicit argument first, then the
/// `GATEWAY_CONFIG` environment variable.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = std::env::var(CONFIG_LOCATION_VAR) {
        tracing::info!(path = %env_path, "Scanning configuration from environment");
        return Ok(PathBuf::from(env_path));
    }
    Err(ConfigError::NotFound)
}

/// Load properties from `path`, merging `<stem>-ext.toml` over it if present.
pub fn load_properties(path: &Path) -> Result<PropertySet, ConfigError> {
    let mut properties = parse_file(path)?;

    let ext_path = ext_file_path(path);
    if ext_path.is_file() {
        tracing::info!(path = %ext_path.display(), "Scanning configuration overrides");
        let overrides = parse_file(&ext_path)?;
        properties.merge(&overrides);
    }

    Ok(properties)
}

fn ext_file_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("gateway");
    path.with_file_name(format!("{stem}-ext.toml"))
}

fn parse_file(path: &Path) -> Result<PropertySet, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: toml::Value = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let mut properties = PropertySet::new();
    flatten_value(None, &value, &mut properties);
    Ok(properties)
}

/// Flatten nested TOML tables into dotted flat keys.
fn flatten_value(prefix: Option<&str>, value: &toml::Value, out: &mut PropertySet) {
    match value {
        toml::Value::Table(table) => {
            for (key, nested) in table {
                let flat = match prefix {
                    Some(prefix) => format!("{prefix}.{key}"),
                    None => key.clone(),
                };
                flatten_value(Some(&flat), nested, out);
            }
        }
        other => {
            if let Some(key) = prefix {
                out.put(key, scalar_to_string(other));
            }
        }
    }
}

fn scalar_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Array(items) => items
            .iter()
            .map(scalar_to_string)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}
