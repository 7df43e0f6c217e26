//! Block lifecycle services for hyla nodes.

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/hyla-chain/hyla/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod error;
pub use error::{LedgerError, LedgerResult};

mod service;
pub use service::LedgerService;

mod view;
pub use view::{BLOCK_TIME_DRIFT, CommittedBlock, LedgerView};
