//! Key-value storage abstractions for hyla.
#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/hyla-chain/hyla/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod batch;
pub use batch::{BatchOp, WriteBatch};

mod error;
pub use error::StoreError;

mod store;
pub use store::KvStore;
