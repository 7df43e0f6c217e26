//! Cached account objects.

use std::collections::BTreeMap;

use alloy_primitives::{Address, B256, Bytes, U256};
use hyla_primitives::{EMPTY_ROOT_HASH, KECCAK256_EMPTY};

use crate::account::hashed_address;

/// An account loaded into or created in the world state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct StateObject {
    pub(crate) hashed: B256,
    pub(crate) nonce: u64,
    pub(crate) balance: U256,
    pub(crate) tokens: BTreeMap<Address, U256>,
    pub(crate) code_hash: B256,
    pub(crate) code: Bytes,
    /// Root of the committed storage.
    pub(crate) storage_root: B256,
    /// Writes since the last commit; an empty value deletes the entry.
    pub(crate) storage: BTreeMap<B256, Bytes>,
    /// Committed storage is ignored.
    pub(crate) fresh: bool,
    pub(crate) suicided: bool,
}

impl StateObject {
    pub(crate) fn new(address: &Address) -> Self {
        Self {
            hashed: hashed_address(address),
            nonce: 0,
            balance: U256::ZERO,
            tokens: BTreeMap::new(),
            code_hash: KECCAK256_EMPTY,
            code: Bytes::new(),
            storage_root: EMPTY_ROOT_HASH,
            storage: BTreeMap::new(),
            fresh: true,
            suicided: false,
        }
    }

    pub(crate) fn balance(&self, token: &Address) -> U256 {
        if token.is_zero() {
            self.balance
        } else {
            self.tokens.get(token).copied().unwrap_or_default()
        }
    }

    pub(crate) fn set_balance(&mut self, token: &Address, amount: U256) {
        if token.is_zero() {
            self.balance = amount;
        } else {
            self.tokens.insert(*token, amount);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.nonce == 0
            && self.balance.is_zero()
            && self.tokens.values().all(U256::is_zero)
            && self.code_hash == KECCAK256_EMPTY
    }

    pub(crate) fn has_code(&self) -> bool {
        !self.code.is_empty()
    }
}
