//! Error types for consensus components.

use alloy_primitives::Address;
use hyla_domain::{KeyImage, TxError, TxId};
use hyla_state::StateError;
use thiserror::Error;

/// Error type for mempool admission and maintenance.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// Transaction is already pooled.
    #[error("transaction already in pool: {0:?}")]
    Duplicate(TxId),

    /// Pool holds as many transactions as it may.
    #[error("pool is full: capacity {0}")]
    PoolFull(usize),

    /// Transaction failed static validation.
    #[error("invalid transaction: {0}")]
    InvalidTx(#[from] TxError),

    /// Transaction touches a blacklisted address.
    #[error("blacklisted address: {0}")]
    Blacklisted(Address),

    /// A pooled transaction already spends this key image.
    #[error("key image already spent in pool: {0:?}")]
    KeyImageInPool(KeyImage),

    /// Transaction nonce was already consumed.
    #[error("stale nonce for {address}: state {state}, tx {tx}")]
    StaleNonce {
        /// Sender.
        address: Address,
        /// Nonce in state.
        state: u64,
        /// Nonce in the transaction.
        tx: u64,
    },

    /// State database error.
    #[error("state error: {0}")]
    State(#[from] StateError),
}

#[cfg(test)]
mod tests {
    use alloy_primitives::B256;

    use super::*;

    #[test]
    fn test_duplicate_display() {
        let err = ConsensusError::Duplicate(TxId(B256::ZERO));
        assert!(err.to_string().starts_with("transaction already in pool"));
    }

    #[test]
    fn test_pool_full_display() {
        assert_eq!(ConsensusError::PoolFull(8).to_string(), "pool is full: capacity 8");
    }

    #[test]
    fn test_tx_error_from() {
        let err: ConsensusError = TxError::EmptyCode.into();
        assert!(matches!(err, ConsensusError::InvalidTx(_)));
        assert!(err.to_string().starts_with("invalid transaction"));
    }

    #[test]
    fn test_stale_nonce_display() {
        let err = ConsensusError::StaleNonce { address: Address::ZERO, state: 4, tx: 2 };
        assert!(err.to_string().ends_with("state 4, tx 2"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConsensusError>();
    }
}
