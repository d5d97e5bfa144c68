use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::access::{AuthError, OperatorKey};

pub const DEFAULT_CONFIG_FILE: &str = "pool.json";
pub const DEFAULT_STATE_FILE: &str = "pool.state.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid operator key in config: {0}")]
    OperatorKey(#[from] AuthError),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Human-readable pool name, shown by `status`.
    pub label: String,
    /// Snapshot file, resolved against the config file's directory when relative.
    pub state_path: PathBuf,
    /// Hex-encoded ed25519 verifying key of the operator.
    pub operator_pubkey_hex: String,
}

impl PoolConfig {
    pub fn new(label: impl Into<String>, operator: &OperatorKey) -> Self {
        Self {
            label: label.into(),
            state_path: PathBuf::from(DEFAULT_STATE_FILE),
            operator_pubkey_hex: operator.to_hex(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self =
            serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if config.state_path.is_relative() {
            if let Some(dir) = path.parent() {
                config.state_path = dir.join(&config.state_path);
            }
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_vec_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, json).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn operator(&self) -> Result<OperatorKey, ConfigError> {
        Ok(OperatorKey::from_hex(&self.operator_pubkey_hex)?)
    }
}
