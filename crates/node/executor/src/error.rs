//! Execution error types.

use alloy_primitives::{Address, U256};
use hyla_backend::BackendError;
use hyla_domain::{KeyImage, TxError, TxKind};
use hyla_election::ElectionError;
use hyla_state::StateError;
use thiserror::Error;

/// Errors that reject a transaction and abort the block containing it.
///
/// Failures local to the transaction are reported through
/// [`TransitionOutcome::vm_err`](crate::TransitionOutcome::vm_err) instead.
#[derive(Debug, Error)]
pub enum TransitionError {
    /// State database error.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Transaction nonce is ahead of the account.
    #[error("nonce too high for {address}: state {state}, tx {tx}")]
    NonceTooHigh {
        /// Sender.
        address: Address,
        /// Nonce in state.
        state: u64,
        /// Nonce in the transaction.
        tx: u64,
    },

    /// Transaction nonce was already used.
    #[error("nonce too low for {address}: state {state}, tx {tx}")]
    NonceTooLow {
        /// Sender.
        address: Address,
        /// Nonce in state.
        state: u64,
        /// Nonce in the transaction.
        tx: u64,
    },

    /// Account nonce cannot be bumped past the transaction.
    #[error("nonce overflow for {0}")]
    NonceOverflow(Address),

    /// Sender cannot pay for the gas it bought.
    #[error("insufficient balance for gas: {address} has {have}, needs {need}")]
    InsufficientBalanceForGas {
        /// Sender.
        address: Address,
        /// Native balance.
        have: U256,
        /// Gas cost.
        need: U256,
    },

    /// Gas limit does not cover the intrinsic gas.
    #[error("intrinsic gas too low: have {have}, need {need}")]
    IntrinsicGas {
        /// Gas available.
        have: u64,
        /// Intrinsic gas.
        need: u64,
    },

    /// Gas arithmetic overflowed.
    #[error("gas uint64 overflow")]
    GasOverflow,

    /// A key image is spent twice within the block.
    #[error("utxo double spend: {0:?}")]
    DoubleSpend(KeyImage),

    /// UTXO fee does not cover the required gas.
    #[error("utxo fee too low: have {have}, need {need}")]
    UtxoFeeTooLow {
        /// Fee carried by the transaction.
        have: U256,
        /// Required fee.
        need: U256,
    },

    /// Upgrade target holds no code.
    #[error("{0} is not a contract")]
    NotContract(Address),

    /// Account transaction without a recovered sender.
    #[error("missing sender")]
    MissingSender,
}

/// Errors that abort block processing.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// A transaction was rejected by the transition.
    #[error("transaction {index} rejected: {source}")]
    Transition {
        /// Position in the block.
        index: usize,
        /// Rejection reason.
        source: TransitionError,
    },

    /// A transaction failed verification.
    #[error("transaction {index} invalid: {source}")]
    InvalidTx {
        /// Position in the block.
        index: usize,
        /// Verification failure.
        source: TxError,
    },

    /// A transaction touches a blacklisted address.
    #[error("transaction {index} touches blacklisted address {address}")]
    Blacklisted {
        /// Position in the block.
        index: usize,
        /// Blacklisted address.
        address: Address,
    },

    /// A UTXO input references an output that does not exist.
    #[error("transaction {index} spends unknown output {output}")]
    UnknownOutput {
        /// Position in the block.
        index: usize,
        /// Output index.
        output: u64,
    },

    /// A UTXO input was spent by an earlier block.
    #[error("transaction {index} spends consumed key image {image:?}")]
    KeyImageSpent {
        /// Position in the block.
        index: usize,
        /// Key image.
        image: KeyImage,
    },

    /// A multi-signed transaction kind has no signer set in state.
    #[error("transaction {index}: no signer set for {kind:?}")]
    MissingSigners {
        /// Position in the block.
        index: usize,
        /// Transaction kind.
        kind: TxKind,
    },

    /// Transactions used more gas than the block allows.
    #[error("block gas limit exceeded: used {used}, limit {limit}")]
    GasLimitExceeded {
        /// Gas used so far.
        used: u64,
        /// Block gas limit.
        limit: u64,
    },

    /// State database error.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Block or UTXO store error.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Evidence could not be applied.
    #[error("election error: {0}")]
    Election(#[from] ElectionError),
}

impl ProcessError {
    /// Position of the offending transaction, if the error is about one.
    pub const fn tx_index(&self) -> Option<usize> {
        match self {
            Self::Transition { index, .. }
            | Self::InvalidTx { index, .. }
            | Self::Blacklisted { index, .. }
            | Self::UnknownOutput { index, .. }
            | Self::KeyImageSpent { index, .. }
            | Self::MissingSigners { index, .. } => Some(*index),
            Self::GasLimitExceeded { .. } | Self::State(_) | Self::Backend(_) | Self::Election(_) => None,
        }
    }

    /// Whether the error comes from storage rather than from the block's content.
    ///
    /// A fatal error says nothing about the block's validity.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::State(_)
                | Self::Backend(_)
                | Self::Election(_)
                | Self::Transition { source: TransitionError::State(_), .. }
        )
    }
}
