//! Core trait abstractions for consensus components.

use hyla_domain::{Transaction, TxId};
use hyla_executor::ProcessResult;
use hyla_state::WorldState;

use crate::ConsensusError;

/// A processed block: the temporary state it produced and its result.
///
/// Committing the block persists `state` as is.
#[derive(Clone, Debug)]
pub struct ProcessedBlock {
    /// State after the block.
    pub state: WorldState,
    /// Receipts, roots and side outputs of the block.
    pub result: ProcessResult,
}

impl ProcessedBlock {
    /// Pair a state with the result that produced it.
    pub const fn new(state: WorldState, result: ProcessResult) -> Self {
        Self { state, result }
    }

    /// Height of the processed block.
    pub const fn height(&self) -> u64 {
        self.result.height
    }
}

/// Mempool provides admitted transactions for block building.
pub trait Mempool: Clone + Send + Sync + 'static {
    /// Admit a transaction.
    ///
    /// Returns its identifier, or why it was rejected.
    fn insert(&self, tx: Transaction) -> Result<TxId, ConsensusError>;

    /// Whether a transaction is pooled.
    fn contains(&self, id: &TxId) -> bool;

    /// Up to `max_txs` transactions in the order they should execute.
    fn reap(&self, max_txs: usize) -> Vec<Transaction>;

    /// Drop transactions committed at `height` and those they made stale.
    ///
    /// `state` is the committed state; pooled transactions whose nonce it already consumed
    /// are removed. Returns the number of removed transactions.
    fn update(&self, height: u64, committed: &[Transaction], state: &WorldState) -> Result<usize, ConsensusError>;

    /// Number of pooled transactions.
    fn len(&self) -> usize;

    /// Check if the mempool is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
