//! Ledger service publishing events.

use std::fmt;

use futures::channel::mpsc::UnboundedReceiver;
use hyla_domain::{Block, Commit, LedgerEvent, LedgerEvents, Transaction, TxId, Validator};
use tracing::trace;

use crate::{LedgerResult, LedgerView};

/// Domain service that exposes the block lifecycle and publishes ledger events.
#[derive(Clone)]
pub struct LedgerService {
    view: LedgerView,
    events: LedgerEvents,
}

impl fmt::Debug for LedgerService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerService").finish_non_exhaustive()
    }
}

impl LedgerService {
    /// Create a new ledger service from a ledger view.
    pub fn new(view: LedgerView) -> Self {
        Self { view, events: LedgerEvents::new() }
    }

    fn publish(&self, event: LedgerEvent) {
        self.events.publish(event);
    }

    /// Subscribe to ledger events.
    pub fn subscribe(&self) -> UnboundedReceiver<LedgerEvent> {
        self.events.subscribe()
    }

    /// The underlying view, for queries.
    pub const fn view(&self) -> &LedgerView {
        &self.view
    }

    /// Submit a transaction and emit an event once it is pooled.
    pub fn submit_tx(&self, tx: Transaction) -> LedgerResult<TxId> {
        let id = self.view.submit_tx(tx)?;
        self.publish(LedgerEvent::TransactionSubmitted(id));
        Ok(id)
    }

    /// Build a proposal for `height`.
    pub async fn create_block(&self, height: u64, max_txs: usize, gas_limit: u64, time: u64) -> LedgerResult<Block> {
        self.view.create_block(height, max_txs, gas_limit, time).await
    }

    /// Execute a proposal and fill in its header.
    pub async fn pre_run_block(&self, block: &mut Block) -> LedgerResult<()> {
        self.view.pre_run_block(block).await
    }

    /// Validate a received block.
    pub async fn check_block(&self, block: &Block) -> LedgerResult<bool> {
        self.view.check_block(block).await
    }

    /// Commit a block, publish its events and return the next validator set.
    pub async fn commit_block(
        &self,
        block: Block,
        seen_commit: Commit,
        fast_sync: bool,
    ) -> LedgerResult<Vec<Validator>> {
        let committed = self.view.commit_block(block, seen_commit, fast_sync).await?;
        self.publish(LedgerEvent::BlockCommitted { height: committed.height, hash: committed.hash.0 });
        if !committed.logs.is_empty() {
            trace!(height = committed.height, logs = committed.logs.len(), "publish logs");
            self.publish(LedgerEvent::Logs(committed.logs));
        }
        Ok(committed.validators)
    }

    /// Interrupt running contract code.
    pub fn stop(&self) {
        self.view.stop();
    }
}
