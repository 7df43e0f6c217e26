//! Ledger error types.

use alloy_primitives::B256;
use hyla_backend::BackendError;
use hyla_config::ConfigError;
use hyla_consensus::ConsensusError;
use hyla_election::ElectionError;
use hyla_executor::ProcessError;
use hyla_state::StateError;
use thiserror::Error;

/// Errors surfaced by ledger services.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Block processing failed.
    #[error("process error: {0}")]
    Process(#[from] ProcessError),

    /// Mempool admission or maintenance error.
    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    /// State database error.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Block, UTXO or balance record store error.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Candidate list could not be advanced.
    #[error("election error: {0}")]
    Election(#[from] ElectionError),

    /// Node configuration is invalid.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Block is not on top of the head.
    #[error("mismatched height: expected {expected}, got {got}")]
    HeightMismatch {
        /// Height after the head.
        expected: u64,
        /// Requested height.
        got: u64,
    },

    /// Commit of a block that was never processed.
    #[error("block {0} was not processed")]
    NotProcessed(B256),

    /// Re-executing a block gave different results than its header claims.
    #[error("block {height} does not match its execution result")]
    ResultMismatch {
        /// Block height.
        height: u64,
    },

    /// The committed head block is missing from the block store.
    #[error("missing block at height {0}")]
    MissingBlock(u64),

    /// Genesis produced a different root than configured.
    #[error("genesis root mismatch: expected {expected}, got {actual}")]
    GenesisRootMismatch {
        /// Configured root.
        expected: B256,
        /// Root after applying genesis.
        actual: B256,
    },

    /// The state of a processed block no longer hashes to the root it was checked against.
    #[error("state root mismatch at height {height}: processed {expected}, committing {actual}")]
    RootMismatch {
        /// Block height.
        height: u64,
        /// Root recorded when the block was processed.
        expected: B256,
        /// Root of the state about to be committed.
        actual: B256,
    },
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
