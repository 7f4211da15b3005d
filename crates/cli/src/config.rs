use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use raidsync_engine::EngineConfig;

pub const DEFAULT_CONFIG_FILE: &str = "raidsync.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Shared SQLite file the client and the bridge both open.
    pub database: PathBuf,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
    pub engine: EngineConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("raidsync.db"),
            log_level: "info".to_string(),
            engine: EngineConfig::default(),
        }
    }
}

impl CliConfig {
    /// Loads `path`, or `raidsync.toml` in the working directory. A missing
    /// file gives the defaults; a broken one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }
}
