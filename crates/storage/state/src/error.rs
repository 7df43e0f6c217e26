//! Error types for world state operations.

use alloy_primitives::{Address, U256};
use hyla_traits::StoreError;
use thiserror::Error;

/// Error type for world state operations.
#[derive(Debug, Error)]
pub enum StateError {
    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Stored state does not match its hash or does not decode.
    #[error("corrupt state: {0}")]
    CorruptState(String),

    /// Balance would go negative.
    #[error("insufficient balance of {address} in token {token}: have {have}, need {need}")]
    InsufficientBalance {
        /// Debited account.
        address: Address,
        /// Debited token.
        token: Address,
        /// Current balance.
        have: U256,
        /// Requested debit.
        need: U256,
    },

    /// A system contract value does not parse.
    #[error("invalid {key} in system contract {contract}: {reason}")]
    InvalidSystemValue {
        /// System contract address.
        contract: Address,
        /// Storage entry name.
        key: String,
        /// Parse failure.
        reason: String,
    },

    /// Genesis allocation cannot be applied.
    #[error("invalid genesis: {0}")]
    InvalidGenesis(String),
}
