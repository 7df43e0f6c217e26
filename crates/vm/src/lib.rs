//! Stack and Wasm virtual machines for hyla.
#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/hyla-chain/hyla/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod context;
pub use context::{BLOCK_HASH_WINDOW, BlockContext, Message};

mod error;
pub use error::VmError;

pub mod evm;
pub use evm::{GasTable, StackVm};

mod frame;

mod machine;
pub use machine::{ActiveVm, CallOutcome, CreateOutcome, Machine, Vm, VmConfig};

pub mod wasm;
pub use wasm::{
    ModuleCache, OpcodeCosts, PreprocessingError, WasmConfig, WasmVm, encode_create_data, preprocess,
};
