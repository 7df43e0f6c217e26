//! Account encoding and store keys.

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use hyla_primitives::{EMPTY_ROOT_HASH, KECCAK256_EMPTY, merkle_root};

pub(crate) const ACCOUNT_PREFIX: u8 = b'a';
pub(crate) const TOKEN_PREFIX: u8 = b't';
pub(crate) const STORAGE_PREFIX: u8 = b's';
pub(crate) const CODE_PREFIX: u8 = b'c';
pub(crate) const ROOT_KEY: &[u8] = b"StateRoot";

/// Persisted account record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct StateAccount {
    /// Transaction count.
    pub nonce: u64,
    /// Native balance.
    pub balance: U256,
    /// Keccak of the code.
    pub code_hash: B256,
    /// Root of the storage entries.
    pub storage_root: B256,
    /// Root of the non-native token balances.
    pub token_root: B256,
}

impl Default for StateAccount {
    fn default() -> Self {
        Self {
            nonce: 0,
            balance: U256::ZERO,
            code_hash: KECCAK256_EMPTY,
            storage_root: EMPTY_ROOT_HASH,
            token_root: EMPTY_ROOT_HASH,
        }
    }
}

pub(crate) fn account_key(hashed: &B256) -> Vec<u8> {
    prefixed(ACCOUNT_PREFIX, hashed.as_slice())
}

pub(crate) fn token_prefix(hashed: &B256) -> Vec<u8> {
    prefixed(TOKEN_PREFIX, hashed.as_slice())
}

pub(crate) fn token_key(hashed: &B256, token: &Address) -> Vec<u8> {
    let mut key = token_prefix(hashed);
    key.extend_from_slice(token.as_slice());
    key
}

pub(crate) fn storage_prefix(hashed: &B256) -> Vec<u8> {
    prefixed(STORAGE_PREFIX, hashed.as_slice())
}

pub(crate) fn storage_key(hashed: &B256, key: &B256) -> Vec<u8> {
    let mut full = storage_prefix(hashed);
    full.extend_from_slice(key.as_slice());
    full
}

pub(crate) fn code_key(hash: &B256) -> Vec<u8> {
    prefixed(CODE_PREFIX, hash.as_slice())
}

fn prefixed(prefix: u8, body: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + body.len());
    key.push(prefix);
    key.extend_from_slice(body);
    key
}

/// Hash used to key an account in the store.
pub fn hashed_address(address: &Address) -> B256 {
    keccak256(address)
}

/// Root over ordered storage entries; empty values are skipped.
pub fn storage_root<'a>(entries: impl IntoIterator<Item = (&'a B256, &'a Bytes)>) -> B256 {
    merkle_root(entries.into_iter().filter(|(_, value)| !value.is_empty()).map(|(key, value)| {
        let mut leaf = key.to_vec();
        leaf.extend_from_slice(value);
        leaf
    }))
}

/// Root over ordered token balances; zero balances are skipped.
pub fn token_root<'a>(balances: impl IntoIterator<Item = (&'a Address, &'a U256)>) -> B256 {
    merkle_root(balances.into_iter().filter(|(_, amount)| !amount.is_zero()).map(|(token, amount)| {
        let mut leaf = token.to_vec();
        leaf.extend_from_slice(&amount.to_be_bytes::<32>());
        leaf
    }))
}
