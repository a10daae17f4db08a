//! Configuration types for the engine

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid asset name: {0}")]
    InvalidName(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for asset paths
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Root directory for all assets
    pub asset_root: PathBuf,
    /// Directory name for scripts (relative to asset_root)
    pub scripts_dir: String,
}

impl AssetConfig {
    /// Create a new AssetConfig with custom paths
    pub fn new(asset_root: PathBuf, scripts_dir: String) -> Self {
        debug!(
            asset_root = ?asset_root,
            scripts_dir = scripts_dir,
            "Creating new AssetConfig"
        );
        Self {
            asset_root,
            scripts_dir,
        }
    }

    /// Get the full path to a script file
    pub fn script_path(&self, name: &str) -> Result<PathBuf, ConfigError> {
        // Names are bare file stems; anything that could leave the directory is refused
        if name.is_empty() || name.contains("..") || name.contains('/') || name.contains('\\') {
            return Err(ConfigError::InvalidName(name.to_string()));
        }
        let path = self
            .asset_root
            .join(&self.scripts_dir)
            .join(format!("{name}.rhai"));
        debug!(name = name, path = ?path, "Generated script path");
        Ok(path)
    }
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("assets"),
            scripts_dir: "scripts".to_string(),
        }
    }
}

/// Engine-wide limits and switches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum payload size of a single message in bytes
    pub max_message_size: usize,
    /// Maximum number of queued messages per socket
    pub socket_capacity: usize,
    /// Maximum number of instances per collection
    pub max_instances: usize,
    /// Record hashed strings so identifiers can be printed by name
    pub reverse_hash_lookup: bool,
    /// Asset locations
    pub asset_config: AssetConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_message_size: 256,
            socket_capacity: 1024,
            max_instances: 1024,
            reverse_hash_lookup: cfg!(debug_assertions),
            asset_config: AssetConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON, filling missing fields with defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.check()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(path = ?path, "Loading engine config");
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.socket_capacity == 0 {
            return Err(ConfigError::Invalid("socket_capacity must be non-zero".into()));
        }
        if self.max_instances == 0 {
            return Err(ConfigError::Invalid("max_instances must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_asset_config_script_path() {
        let config = AssetConfig::new(PathBuf::from("game/assets"), "scripts".to_string());

        let path = config.script_path("test_script").unwrap();
        assert_eq!(path, PathBuf::from("game/assets/scripts/test_script.rhai"));
    }

    #[test]
    fn test_asset_config_rejects_path_traversal() {
        let config = AssetConfig::default();
        for name in ["../evil", "some/path/evil", "some\\path\\evil", ""] {
            assert!(matches!(
                config.script_path(name),
                Err(ConfigError::InvalidName(_))
            ));
        }
    }

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_message_size, 256);
        assert_eq!(config.socket_capacity, 1024);
        assert_eq!(config.max_instances, 1024);
    }

    #[test]
    fn test_engine_config_partial_json() {
        let config = EngineConfig::from_json(r#"{ "max_instances": 8 }"#).unwrap();
        assert_eq!(config.max_instances, 8);
        assert_eq!(config.max_message_size, 256);
        assert_eq!(config.asset_config.scripts_dir, "scripts");
    }

    #[test]
    fn test_engine_config_rejects_zero_capacity() {
        assert!(matches!(
            EngineConfig::from_json(r#"{ "socket_capacity": 0 }"#),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_engine_config_load_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "max_message_size": 64, "asset_config": {{ "asset_root": "data" }} }}"#
        )
        .unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.max_message_size, 64);
        assert_eq!(config.asset_config.asset_root, PathBuf::from("data"));
        assert_eq!(config.asset_config.scripts_dir, "scripts");
    }
}
