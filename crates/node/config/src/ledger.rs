//! Ledger configuration.

use serde::{Deserialize, Serialize};

/// Default number of processed blocks kept between check and commit.
pub const DEFAULT_PROCESS_CACHE_CAPACITY: usize = 16;

/// Default number of heights ahead of the committed one a processed block may be for.
pub const DEFAULT_PROCESS_CACHE_MAX_AGE: u64 = 64;

/// Default mempool capacity.
pub const DEFAULT_MEMPOOL_CAPACITY: usize = 10_000;

/// Block lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Processed blocks kept in the cache.
    #[serde(default = "default_process_cache_capacity")]
    pub process_cache_capacity: usize,

    /// Heights past the committed one a cached block may be for.
    #[serde(default = "default_process_cache_max_age")]
    pub process_cache_max_age: u64,

    /// Transaction verification workers; zero picks one per four CPUs.
    #[serde(default)]
    pub verify_workers: usize,

    /// Pooled transactions kept at most.
    #[serde(default = "default_mempool_capacity")]
    pub mempool_capacity: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            process_cache_capacity: DEFAULT_PROCESS_CACHE_CAPACITY,
            process_cache_max_age: DEFAULT_PROCESS_CACHE_MAX_AGE,
            verify_workers: 0,
            mempool_capacity: DEFAULT_MEMPOOL_CAPACITY,
        }
    }
}

const fn default_process_cache_capacity() -> usize {
    DEFAULT_PROCESS_CACHE_CAPACITY
}

const fn default_process_cache_max_age() -> u64 {
    DEFAULT_PROCESS_CACHE_MAX_AGE
}

const fn default_mempool_capacity() -> usize {
    DEFAULT_MEMPOOL_CAPACITY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ledger_config() {
        let config = LedgerConfig::default();
        assert_eq!(config.process_cache_capacity, DEFAULT_PROCESS_CACHE_CAPACITY);
        assert_eq!(config.process_cache_max_age, DEFAULT_PROCESS_CACHE_MAX_AGE);
        assert_eq!(config.verify_workers, 0);
        assert_eq!(config.mempool_capacity, DEFAULT_MEMPOOL_CAPACITY);
    }

    #[test]
    fn test_ledger_config_serde_defaults() {
        let config: LedgerConfig = serde_json::from_str(r#"{"verify_workers": 3}"#).expect("deserialize");
        assert_eq!(config.verify_workers, 3);
        assert_eq!(config.process_cache_capacity, DEFAULT_PROCESS_CACHE_CAPACITY);
    }
}
