//! Block and transaction context visible to contracts.

use std::collections::BTreeMap;

use alloy_primitives::{Address, B256, U256};

/// Number of ancestors reachable through `BLOCKHASH`.
pub const BLOCK_HASH_WINDOW: u64 = 256;

/// Block-level values shared by every call in a block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockContext {
    /// Fee recipient of the block.
    pub coinbase: Address,
    /// Block height.
    pub number: u64,
    /// Block time in seconds.
    pub time: u64,
    /// Block gas limit.
    pub gas_limit: u64,
    /// Hashes of recent ancestors by height.
    pub ancestors: BTreeMap<u64, B256>,
}

impl BlockContext {
    /// Context for the block at `number`.
    pub const fn new(coinbase: Address, number: u64, time: u64, gas_limit: u64) -> Self {
        Self { coinbase, number, time, gas_limit, ancestors: BTreeMap::new() }
    }

    /// Register the hash of an ancestor.
    #[must_use]
    pub fn with_ancestor(mut self, number: u64, hash: B256) -> Self {
        self.ancestors.insert(number, hash);
        self
    }

    /// Hash of ancestor `number`, zero outside the reachable window.
    pub fn block_hash(&self, number: u64) -> B256 {
        let lower = self.number.saturating_sub(BLOCK_HASH_WINDOW);
        if number >= self.number || number < lower {
            return B256::ZERO;
        }
        self.ancestors.get(&number).copied().unwrap_or_default()
    }
}

/// Transaction-level values set by [`Machine::reset`](crate::Machine::reset).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    /// Externally visible originator.
    pub origin: Address,
    /// Price paid per unit of gas.
    pub gas_price: U256,
    /// Token the transaction moves, zero for the native token.
    pub token: Address,
}

impl Message {
    /// New message context.
    pub const fn new(origin: Address, gas_price: U256, token: Address) -> Self {
        Self { origin, gas_price, token }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_hash_window() {
        let ctx = BlockContext::new(Address::ZERO, 300, 0, 0)
            .with_ancestor(299, B256::repeat_byte(1))
            .with_ancestor(44, B256::repeat_byte(2))
            .with_ancestor(43, B256::repeat_byte(3));

        assert_eq!(ctx.block_hash(299), B256::repeat_byte(1));
        assert_eq!(ctx.block_hash(44), B256::repeat_byte(2));
        assert_eq!(ctx.block_hash(43), B256::ZERO);
        assert_eq!(ctx.block_hash(300), B256::ZERO);
        assert_eq!(ctx.block_hash(298), B256::ZERO);
    }

    #[test]
    fn message_new() {
        let msg = Message::new(Address::repeat_byte(1), U256::from(7), Address::ZERO);
        assert_eq!(msg.gas_price, U256::from(7));
        assert_eq!(msg.token, Address::ZERO);
    }
}
