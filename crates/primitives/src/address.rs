//! Contract address derivation.

use alloy_primitives::{Address, B256};

/// Address of a contract created by `sender` at `nonce`.
pub fn create_address(sender: &Address, nonce: u64) -> Address {
    sender.create(nonce)
}

/// Address of a contract created by `sender` with `salt` and init code hash.
///
/// Derived as `keccak(0xff ‖ sender ‖ salt ‖ init_code_hash)[12..]`.
pub fn create2_address(sender: &Address, salt: B256, init_code_hash: B256) -> Address {
    sender.create2(salt, init_code_hash)
}
