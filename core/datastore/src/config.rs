//! Runtime configuration for the datastore binary.
//!
//! Read from `~/.profiler/datastore/datastore.toml` unless
//! `PROFILER_DATASTORE_CONFIG` points elsewhere. A missing file means
//! defaults; a malformed one is an error the caller decides how to handle.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_ENV_VAR: &str = "PROFILER_DATASTORE_CONFIG";
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const SOCKET_NAME: &str = "datastore.sock";
const CACHE_DB_NAME: &str = "bytes.db";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("home directory not found")]
    HomeNotFound,

    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct IpcConfig {
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DatastoreConfig {
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub ipc: IpcConfig,
}

impl DatastoreConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll.interval_ms)
    }

    pub fn cache_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.cache.path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join(CACHE_DB_NAME)),
        }
    }

    pub fn socket_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.ipc.socket_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join(SOCKET_NAME)),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll.interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
    Ok(home.join(".profiler").join("datastore"))
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    Ok(data_dir()?.join("datastore.toml"))
}

pub fn load_config(path: Option<PathBuf>) -> Result<DatastoreConfig, ConfigError> {
    let config_path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    if !config_path.exists() {
        return Ok(DatastoreConfig::default());
    }

    let content = fs_err::read_to_string(&config_path).map_err(|source| ConfigError::Read {
        path: config_path.clone(),
        source,
    })?;
    parse_config(&config_path, &content)
}

fn parse_config(path: &Path, content: &str) -> Result<DatastoreConfig, ConfigError> {
    let config =
        toml::from_str::<DatastoreConfig>(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    config.validate()?;
    Ok(config)
}
