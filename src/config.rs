//! Command-line configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via FLOWR_CONFIG)
//! 3. Environment variables

use flowr_storage::FsyncPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// flowr configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("FLOWR_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.storage.apply_env_overrides();
        self.logging.apply_env_overrides();
    }
}

/// Where records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// One checksummed file per record under `data_dir`.
    #[default]
    File,
    /// Nothing survives the process.
    Memory,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StoreBackend,
    /// Data directory.
    pub data_dir: PathBuf,
    /// Fsync policy.
    pub fsync: FsyncPolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            data_dir: PathBuf::from("./data"),
            fsync: FsyncPolicy::EveryWrite,
        }
    }
}

impl StorageConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("FLOWR_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }

        if let Ok(policy) = std::env::var("FLOWR_FSYNC") {
            self.fsync = match policy.to_lowercase().as_str() {
                "never" => FsyncPolicy::Never,
                _ => FsyncPolicy::EveryWrite,
            };
        }

        if let Ok(backend) = std::env::var("FLOWR_STORE") {
            self.backend = match backend.to_lowercase().as_str() {
                "memory" => StoreBackend::Memory,
                _ => StoreBackend::File,
            };
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is not set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("FLOWR_LOG_LEVEL") {
            self.level = level;
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage.backend, StoreBackend::File);
        assert_eq!(config.storage.data_dir, PathBuf::from("./data"));
        assert_eq!(config.storage.fsync, FsyncPolicy::EveryWrite);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "storage:\n  backend: memory\n  fsync: never").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.storage.backend, StoreBackend::Memory);
        assert_eq!(config.storage.fsync, FsyncPolicy::Never);
        assert_eq!(config.storage.data_dir, PathBuf::from("./data"));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_from_file_errors() {
        let missing = Config::from_file("/nonexistent/flowr.yaml");
        assert!(matches!(missing, Err(ConfigError::IoError(..))));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "storage: [not, a, map]").unwrap();
        let bad = Config::from_file(file.path());
        assert!(matches!(bad, Err(ConfigError::ParseError(..))));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.storage.data_dir, config.storage.data_dir);
        assert_eq!(parsed.storage.backend, config.storage.backend);
    }
}
