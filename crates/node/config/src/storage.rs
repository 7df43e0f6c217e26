//! Storage configuration.

use std::{fmt, path::PathBuf, str::FromStr};

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Default storage backend name.
pub const DEFAULT_DB_BACKEND: &str = "memory";

/// Default data directory.
pub const DEFAULT_DB_PATH: &str = "./data";

/// Storage backends built into the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbBackend {
    /// Process-local store, lost on exit.
    Memory,
}

impl FromStr for DbBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(ConfigError::UnsupportedBackend(other.to_string())),
        }
    }
}

impl fmt::Display for DbBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("memory"),
        }
    }
}

/// State and block store configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// Backend name.
    #[serde(default = "default_db_backend")]
    pub db_backend: String,

    /// Data directory of persistent backends.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Root the stored state must have when reopened, as 0x-prefixed hex.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_state_root: Option<String>,

    /// Height genesis is committed at.
    #[serde(default)]
    pub init_height: u64,

    /// Committed blocks kept before pruning; zero keeps everything.
    #[serde(default)]
    pub keep_latest_blocks: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_backend: DEFAULT_DB_BACKEND.to_string(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            init_state_root: None,
            init_height: 0,
            keep_latest_blocks: 0,
        }
    }
}

impl StorageConfig {
    /// The configured backend.
    pub fn backend(&self) -> Result<DbBackend, ConfigError> {
        self.db_backend.parse()
    }

    /// The parsed initial state root.
    pub fn init_state_root(&self) -> Result<Option<B256>, ConfigError> {
        self.init_state_root
            .as_deref()
            .map(|hex| hex.parse::<B256>().map_err(|_| ConfigError::InvalidStateRoot(hex.to_string())))
            .transpose()
    }
}

fn default_db_backend() -> String {
    DEFAULT_DB_BACKEND.to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from(DEFAULT_DB_PATH)
}
