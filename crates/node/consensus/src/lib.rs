//! Process cache and mempool for Hyla.

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/hyla-chain/hyla/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod error;
pub use error::ConsensusError;

mod traits;
pub use hyla_executor::{BlockExecutor, ProcessResult};
pub use traits::{Mempool, ProcessedBlock};

pub mod components;
