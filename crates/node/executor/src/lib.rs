//! Block execution for Hyla: transaction verification, state transition and block processing.

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/hyla-chain/hyla/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod blacklist;
pub use blacklist::{Blacklist, BlacklistUpdate};

mod config;
pub use config::ExecutorConfig;

mod error;
pub use error::{ProcessError, TransitionError};

mod fee;
pub use fee::{required_utxo_fee, required_utxo_gas};

mod outcome;
pub use outcome::{ProcessResult, TransitionOutcome};

mod processor;
pub use processor::{AWARD_PERIODS, BlockProcessor, SYSTEM_CALL_GAS};

mod traits;
pub use traits::BlockExecutor;

mod transition;
pub use transition::Transition;

mod verify;
pub use verify::Verifier;
