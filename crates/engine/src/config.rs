use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::liveness::DEFAULT_ACTIVE_WINDOW_SECS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Character name of the user running this client.
    pub local_actor: String,
    pub active_window_secs: u64,
    /// Seconds after start before stale queue entries are swept.
    pub startup_cleanup_delay_secs: u64,
    pub startup_queue_cleanup: bool,
    pub tick_interval_secs: u64,
    /// Longest line the chat channel carries.
    pub max_command_len: usize,
    /// Offset applied to UTC when deciding which events are in the past.
    pub utc_offset_minutes: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            local_actor: String::new(),
            active_window_secs: DEFAULT_ACTIVE_WINDOW_SECS,
            startup_cleanup_delay_secs: 5,
            startup_queue_cleanup: true,
            tick_interval_secs: 5,
            max_command_len: 2_000,
            utc_offset_minutes: 0,
        }
    }
}

impl EngineConfig {
    pub fn with_local_actor(mut self, actor: impl Into<String>) -> Self {
        self.local_actor = actor.into();
        self
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        toml::from_str(contents).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Reads `path`, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("failed to read {}: {e}", path.display())))?;
        toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("failed to parse {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let cfg = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.active_window_secs, 120);
        assert!(cfg.startup_queue_cleanup);
    }

    #[test]
    fn partial_document_overrides_only_named_keys() {
        let cfg = EngineConfig::from_toml_str(
            "local_actor = \"Arthas\"\nactive_window_secs = 30\nstartup_queue_cleanup = false\n",
        )
        .unwrap();
        assert_eq!(cfg.local_actor, "Arthas");
        assert_eq!(cfg.active_window_secs, 30);
        assert!(!cfg.startup_queue_cleanup);
        assert_eq!(cfg.max_command_len, 2_000);
    }

    #[test]
    fn bad_types_are_config_errors() {
        let err = EngineConfig::from_toml_str("active_window_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EngineConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, EngineConfig::default());

        let path = dir.path().join("raidsync.toml");
        fs::write(&path, "tick_interval_secs = 1\n").unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap().tick_interval_secs, 1);
    }

    #[test]
    fn parse_errors_name_the_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raidsync.toml");
        fs::write(&path, "active_window_secs = \"soon\"\n").unwrap();
        let message = EngineConfig::load(&path).unwrap_err().to_string();
        assert!(message.starts_with("config error: failed to parse "), "{message}");
        assert!(message.contains("raidsync.toml"), "{message}");
        assert_eq!(message.matches("config error").count(), 1, "{message}");
    }
}
