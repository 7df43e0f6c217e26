//! Journaled world state with token balances and system contract storage for hyla.
#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/hyla-chain/hyla/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod account;
pub use account::{StateAccount, hashed_address, storage_root, token_root};

mod error;
pub use error::StateError;

mod genesis;

mod journal;

mod object;

mod state;
pub use state::{SnapshotId, WorldState};

mod system;
pub use system::system_key;
