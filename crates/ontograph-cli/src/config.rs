//! `--config` file and logging setup.

use anyhow::{Context, Result};
use ontograph_storage::IngestConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Contents of the JSON file passed with `--config`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Used when `--log-level` is not given.
    pub log_level: Option<String>,
    pub ingest: IngestConfig,
}

impl CliConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}

/// Install the stderr subscriber. `RUST_LOG` wins over `level`.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: CliConfig = serde_json::from_str(r#"{"ingest": {"timeout_ms": 250}}"#).unwrap();
        assert_eq!(config.log_level, None);
        assert_eq!(config.ingest.timeout_ms, Some(250));
        assert!(config.ingest.require_active_mapping);
        assert!(config.ingest.require_shape_match);
    }

    #[test]
    fn no_path_means_default() {
        assert_eq!(CliConfig::load(None).unwrap(), CliConfig::default());
    }
}
