//! Configuration types for hyla nodes.
#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/hyla-chain/hyla/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod error;
pub use error::ConfigError;

mod execution;
pub use execution::{DEFAULT_MAX_TX_BYTES, DEFAULT_WASM_GAS_RATE, ExecutionConfig};

mod ledger;
pub use ledger::{
    DEFAULT_MEMPOOL_CAPACITY, DEFAULT_PROCESS_CACHE_CAPACITY, DEFAULT_PROCESS_CACHE_MAX_AGE, LedgerConfig,
};

mod node;
pub use node::NodeConfig;

mod storage;
pub use storage::{DEFAULT_DB_BACKEND, DEFAULT_DB_PATH, DbBackend, StorageConfig};
