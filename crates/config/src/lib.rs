use std::env;
use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Largest payload that fits one 64 KiB protocol message after the data-message header
pub const DEFAULT_MAX_VALUE_SIZE: u32 = 65_536 - 64;

/// Default initial sizing hint for the heap backend's key map
pub const DEFAULT_HASHMAP_SIZE: usize = 128 * 1024;

/// Errors that can occur in configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No `DATABASE` specified for `DATASTORE` in configuration")]
    MissingBackend,

    #[error("Unsupported datastore backend: {0}")]
    UnsupportedBackend(String),

    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidEnvVar(String, String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Failed to read file: {0}")]
    FileReadError(String),

    #[error("Failed to parse YAML: {0}")]
    YamlParseError(#[from] serde_yaml::Error),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Settings specific to the in-memory heap backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapConfig {
    #[serde(default = "default_hashmap_size")]
    pub hashmap_size: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            hashmap_size: default_hashmap_size(),
        }
    }
}

/// Datastore configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastoreConfig {
    /// Name of the backend to load, e.g. `heap`
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default = "default_quota")]
    pub quota: u64,
    #[serde(default = "default_max_value_size")]
    pub max_value_size: u32,
    #[serde(default)]
    pub heap: HeapConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_hashmap_size() -> usize {
    DEFAULT_HASHMAP_SIZE
}

fn default_quota() -> u64 {
    100 * 1024 * 1024
}

fn default_max_value_size() -> u32 {
    DEFAULT_MAX_VALUE_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            database: None,
            quota: default_quota(),
            max_value_size: default_max_value_size(),
            heap: HeapConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl DatastoreConfig {
    /// Configuration selecting the given backend, everything else defaulted
    pub fn with_database(name: &str) -> Self {
        Self {
            database: Some(name.to_string()),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from a variable lookup.
    ///
    /// `DATASTORE_CONFIG_FILE` names a YAML file that takes precedence when it exists.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(config_path) = lookup("DATASTORE_CONFIG_FILE") {
            if Path::new(&config_path).exists() {
                return Self::from_file(&config_path);
            }
            debug!("Configuration file {} not found, using environment", config_path);
        }

        let database = lookup("DATASTORE_DATABASE").filter(|name| !name.trim().is_empty());

        let quota = parse_var(&lookup, "DATASTORE_QUOTA")?.unwrap_or_else(default_quota);
        let max_value_size = parse_var(&lookup, "DATASTORE_MAX_VALUE_SIZE")?
            .unwrap_or_else(default_max_value_size);
        let hashmap_size = parse_var(&lookup, "DATASTORE_HEAP_HASHMAPSIZE")?
            .unwrap_or_else(default_hashmap_size);
        let log_level = lookup("DATASTORE_LOG_LEVEL").unwrap_or_else(default_log_level);

        let config = DatastoreConfig {
            database,
            quota,
            max_value_size,
            heap: HeapConfig { hashmap_size },
            log_level,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileReadError(format!("Failed to read {}: {}", path, e)))?;

        let config: DatastoreConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// The configured backend name, or an error if none was given
    pub fn backend_name(&self) -> Result<&str> {
        self.database.as_deref().ok_or(ConfigError::MissingBackend)
    }

    /// Reject settings no backend can run with
    pub fn validate(&self) -> Result<()> {
        if self.quota == 0 {
            return Err(ConfigError::InvalidValue("quota must be positive".to_string()));
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, name: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar(name.to_string(), e.to_string())),
        None => Ok(None),
    }
}
