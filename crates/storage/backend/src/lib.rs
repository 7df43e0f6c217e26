//! Storage backends for hyla.
#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/hyla-chain/hyla/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod blocks;
pub use blocks::BlockStore;

mod election;
pub use election::{ElectionSnapshot, ElectionStore};

mod error;
pub use error::BackendError;

mod memory;
pub use memory::MemoryStore;

mod records;
pub use records::BalanceRecordStore;

mod utxo;
pub use utxo::UtxoStore;
