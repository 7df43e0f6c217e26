//! Undo records for state mutations.

use std::collections::BTreeMap;

use alloy_primitives::{Address, B256, Bytes, U256};

use crate::object::StateObject;

/// Inverse of one state mutation.
#[derive(Clone, Debug)]
pub(crate) enum JournalEntry {
    /// An object was created; restore the previous cache entry.
    Created { address: Address, prev: Option<Box<StateObject>> },
    Nonce { address: Address, prev: u64 },
    Balance { address: Address, token: Address, prev: U256 },
    Code { address: Address, prev_code: Bytes, prev_hash: B256 },
    /// `prev` is the pending write that was replaced, if any.
    Storage { address: Address, key: B256, prev: Option<Bytes> },
    Suicide { address: Address, prev: bool, prev_balance: U256, prev_tokens: BTreeMap<Address, U256> },
    Log { tx_hash: B256 },
    Refund { prev: u64 },
}
