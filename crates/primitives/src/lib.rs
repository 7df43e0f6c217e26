//! Consensus constants, fee arithmetic and hashing helpers for hyla.
#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/hyla-chain/hyla/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub use alloy_primitives::{Address, B256, Bloom, Bytes, KECCAK256_EMPTY, U256, keccak256};

mod address;
pub use address::{create2_address, create_address};

mod code;
pub use code::{WASM_MAGIC, is_wasm_code};

mod fee;
pub use fee::{
    COIN, GAS_PER_COIN, GAS_PRICE, MAX_GAS_LIMIT, MIN_GAS_LIMIT, PAR_GAS_PRICE,
    cal_new_amount_gas, cal_new_contract_amount_gas, gas_fee,
};

mod gas;
pub use gas::{
    CALL_CREATE_DEPTH, CALL_STIPEND, CREATE_DATA_GAS, MAX_CODE_SIZE, STACK_LIMIT, TX_DATA_NON_ZERO_GAS,
    TX_DATA_ZERO_GAS, TX_GAS, TX_GAS_CONTRACT_CREATION, intrinsic_gas,
};

mod merkle;
pub use merkle::{EMPTY_ROOT_HASH, merkle_root};

mod system;
pub use system::SystemContract;
