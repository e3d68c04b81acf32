//! Configuration module
//!
//! Handles loading and saving epmd-client configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::network::EpmdAddr;
use crate::protocol::{DEFAULT_HOST, DEFAULT_PORT};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Node to register
    #[serde(default)]
    pub node: NodeConfig,

    /// Port mapper daemon settings
    #[serde(default)]
    pub epmd: EpmdConfig,
}

/// General configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
}

/// Node registration settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node name, without the `@host` part
    pub name: Option<String>,
    /// Port the node listens on for distribution connections
    pub port: Option<u16>,
    /// Extra data sent with the registration
    #[serde(default)]
    pub extra: String,
}

/// Port mapper daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpmdConfig {
    /// Daemon host
    #[serde(default = "default_host")]
    pub host: String,
    /// Daemon port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound for a lookup or a registration handshake, in ms
    pub timeout_ms: Option<u64>,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for EpmdConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_ms: None,
        }
    }
}

impl EpmdConfig {
    pub fn addr(&self) -> EpmdAddr {
        EpmdAddr::new(self.host.clone(), self.port)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("epmd-client/config.toml")),
            Some(PathBuf::from("./epmd-client.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                return Self::load(path);
            }
        }

        // Return default config if no file found
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Sample configuration with every section filled in
pub fn sample_config() -> Config {
    Config {
        node: NodeConfig {
            name: Some("mynode".to_string()),
            port: Some(9999),
            extra: String::new(),
        },
        epmd: EpmdConfig {
            timeout_ms: Some(5000),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> ConfigResult<String> {
    Ok(toml::to_string_pretty(&sample_config())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.epmd.host, "localhost");
        assert_eq!(config.epmd.port, 4369);
        assert!(config.epmd.timeout().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let mut config = Config::default();
        config.node.name = Some("foo".to_string());
        let file = NamedTempFile::new().unwrap();

        config.save(file.path()).unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded.epmd.port, config.epmd.port);
        assert_eq!(loaded.node.name.as_deref(), Some("foo"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("[epmd]\nport = 4370\n").unwrap();
        assert_eq!(config.epmd.host, "localhost");
        assert_eq!(config.epmd.addr(), EpmdAddr::new("localhost", 4370));
        assert!(config.node.name.is_none());
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load(Path::new("/nonexistent/epmd-client.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_save_sample_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/epmd-client.toml");

        sample_config().save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.node.port, Some(9999));
        assert_eq!(loaded.epmd.timeout_ms, Some(5000));
    }

    #[test]
    fn test_sample_config() {
        let sample = generate_sample_config().unwrap();
        let parsed: Config = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.node.name.as_deref(), Some("mynode"));
        assert_eq!(parsed.epmd.timeout(), Some(Duration::from_millis(5000)));
    }
}
