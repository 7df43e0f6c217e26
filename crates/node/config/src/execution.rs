//! Execution configuration.

use serde::{Deserialize, Serialize};

/// Default ratio between Wasm instruction cost and host gas.
pub const DEFAULT_WASM_GAS_RATE: u64 = 10_000;

/// Default largest accepted encoded transaction, 256 KiB.
pub const DEFAULT_MAX_TX_BYTES: usize = 256 * 1024;

/// Execution layer configuration.
///
/// `wasm_gas_rate` is consensus critical: every node of a network must agree on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionConfig {
    /// Wasm-to-host gas ratio.
    #[serde(default = "default_wasm_gas_rate")]
    pub wasm_gas_rate: u64,

    /// Capture per-transaction balance records.
    #[serde(default)]
    pub save_balance_record: bool,

    /// Relax some static transaction checks.
    #[serde(default)]
    pub is_test_mode: bool,

    /// Largest accepted encoded transaction.
    #[serde(default = "default_max_tx_bytes")]
    pub max_tx_bytes: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            wasm_gas_rate: DEFAULT_WASM_GAS_RATE,
            save_balance_record: false,
            is_test_mode: false,
            max_tx_bytes: DEFAULT_MAX_TX_BYTES,
        }
    }
}

const fn default_wasm_gas_rate() -> u64 {
    DEFAULT_WASM_GAS_RATE
}

const fn default_max_tx_bytes() -> usize {
    DEFAULT_MAX_TX_BYTES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_execution_config() {
        let config = ExecutionConfig::default();
        assert_eq!(config.wasm_gas_rate, DEFAULT_WASM_GAS_RATE);
        assert_eq!(config.max_tx_bytes, 262_144);
        assert!(!config.save_balance_record);
        assert!(!config.is_test_mode);
    }

    #[test]
    fn test_execution_config_toml_roundtrip() {
        let config = ExecutionConfig {
            wasm_gas_rate: 500,
            save_balance_record: true,
            is_test_mode: true,
            max_tx_bytes: 1024,
        };
        let serialized = toml::to_string(&config).expect("serialize toml");
        let deserialized: ExecutionConfig = toml::from_str(&serialized).expect("deserialize toml");
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_execution_config_partial_defaults() {
        let config: ExecutionConfig = toml::from_str("save_balance_record = true").expect("deserialize");
        assert!(config.save_balance_record);
        assert_eq!(config.wasm_gas_rate, DEFAULT_WASM_GAS_RATE);
        assert_eq!(config.max_tx_bytes, DEFAULT_MAX_TX_BYTES);
    }
}
