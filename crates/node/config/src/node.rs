//! Top-level node configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, ExecutionConfig, LedgerConfig, StorageConfig};

/// Complete node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeConfig {
    /// Execution settings.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Block lifecycle settings.
    #[serde(default)]
    pub ledger: LedgerConfig,
}

impl NodeConfig {
    /// Load from a TOML file, or the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml(&content)
    }

    /// Parse from a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Serialize to a TOML document.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the node cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.execution.wasm_gas_rate == 0 {
            return Err(ConfigError::InvalidValue { field: "wasm_gas_rate", reason: "must be positive" });
        }
        if self.execution.max_tx_bytes == 0 {
            return Err(ConfigError::InvalidValue { field: "max_tx_bytes", reason: "must be positive" });
        }
        if self.ledger.process_cache_capacity == 0 {
            return Err(ConfigError::InvalidValue { field: "process_cache_capacity", reason: "must be positive" });
        }
        self.storage.backend()?;
        self.storage.init_state_root()?;
        Ok(())
    }
}
