//! Ledger view over the committed chain.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use alloy_primitives::{Address, B256, Bytes, U256};
use futures::lock::Mutex;
use hyla_backend::{BalanceRecordStore, BlockStore, ElectionSnapshot, ElectionStore, MemoryStore, UtxoStore};
use hyla_config::{DbBackend, NodeConfig};
use hyla_consensus::{
    ConsensusError, Mempool as _, ProcessedBlock,
    components::{InMemoryMempool, MempoolConfig, ProcessCache},
};
use hyla_domain::{
    Block, BlockBalanceRecords, BlockId, Coefficient, Commit, Genesis, Header, Log, Receipt, Transaction, TxId,
    Validator,
};
use hyla_election::{CandidateList, rank_candidates};
use hyla_executor::{Blacklist, BlockExecutor as _, BlockProcessor, ExecutorConfig, ProcessError, ProcessResult};
use hyla_state::WorldState;
use hyla_traits::KvStore;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::{LedgerError, LedgerResult};

/// Seconds a block may trail its parent's time before it is rejected.
pub const BLOCK_TIME_DRIFT: u64 = 300;

/// A committed block and the validator set elected for the next height.
#[derive(Clone, Debug)]
pub struct CommittedBlock {
    /// Committed height.
    pub height: u64,
    /// Committed block hash.
    pub hash: BlockId,
    /// Validators of the next height.
    pub validators: Vec<Validator>,
    /// Logs emitted by the block.
    pub logs: Vec<Log>,
}

/// Chain state guarded by the mutex inside `LedgerView`.
struct LedgerState {
    /// Committed world state.
    state: WorldState,
    /// Last committed block.
    head: Block,
    /// Candidate order carried into the next block.
    candidates: CandidateList,
    /// Validators of the next height.
    validators: Vec<Validator>,
    /// Coefficients loaded at the last commit.
    coefficient: Coefficient,
}

/// Everything a block on top of the head executes against.
struct Parent {
    state: WorldState,
    header: Header,
    hash: BlockId,
    candidates: CandidateList,
    validators: Vec<Validator>,
}

/// Ledger view that owns the committed chain and drives the block lifecycle.
///
/// Clones share all state. Commits are serialized by the chain mutex; processing of a
/// given block is serialized by the process cache.
#[derive(Clone)]
pub struct LedgerView {
    inner: Arc<Mutex<LedgerState>>,
    /// State transactions are checked against, replaced on every commit.
    check_state: Arc<RwLock<WorldState>>,
    processor: BlockProcessor,
    cache: ProcessCache,
    mempool: InMemoryMempool,
    blacklist: Blacklist,
    blocks: BlockStore,
    utxos: UtxoStore,
    records: BalanceRecordStore,
    elections: ElectionStore,
    keep_latest_blocks: u64,
}

impl fmt::Debug for LedgerView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerView").field("cache", &self.cache.len()).finish_non_exhaustive()
    }
}

impl LedgerView {
    /// Open a ledger over the configured backend, applying `genesis` to an empty store.
    pub fn open(config: &NodeConfig, genesis: &Genesis) -> LedgerResult<Self> {
        config.validate()?;
        let db: Arc<dyn KvStore> = match config.storage.backend()? {
            DbBackend::Memory => Arc::new(MemoryStore::new()),
        };
        Self::with_store(db, config, genesis)
    }

    /// Open a ledger over `db`.
    ///
    /// An empty store is initialized from `genesis` at the configured initial height. A store
    /// holding blocks is reopened at its head with the candidate order and validator set
    /// stored for it, and `genesis` is ignored.
    pub fn with_store(db: Arc<dyn KvStore>, config: &NodeConfig, genesis: &Genesis) -> LedgerResult<Self> {
        let blocks = BlockStore::new(Arc::clone(&db));
        let utxos = UtxoStore::new(Arc::clone(&db));
        let records = BalanceRecordStore::new(Arc::clone(&db));
        let elections = ElectionStore::new(Arc::clone(&db));
        let expected_root = config.storage.init_state_root()?;

        let (state, head) = match blocks.head()? {
            Some(height) => {
                let state = WorldState::open(Arc::clone(&db), expected_root)?;
                let head = blocks.block(height)?.ok_or(LedgerError::MissingBlock(height))?;
                info!(height, root = %state.root(), "reopened ledger");
                (state, head)
            }
            None => {
                let height = config.storage.init_height;
                let mut state = WorldState::new(Arc::clone(&db));
                let root = state.apply_genesis(genesis, height)?;
                if let Some(expected) = expected_root
                    && expected != root
                {
                    return Err(LedgerError::GenesisRootMismatch { expected, actual: root });
                }
                let header = Header { height, time: genesis.time, state_hash: root, ..Default::default() };
                let head = Block::new(header, Vec::new(), Vec::new(), Commit::default());
                blocks.put_block(&head, &[], None)?;
                (state, head)
            }
        };

        let coefficient = state.coefficient()?;
        let (candidates, validators) = match elections.get(head.height())? {
            Some(snapshot) => (CandidateList::from(snapshot.candidates), snapshot.validators),
            None => {
                let candidates = rank_candidates(&state, &head.header.last_commit_hash, &coefficient)?;
                let validators = state.current_validators()?;
                elections.put(&ElectionSnapshot {
                    height: head.height(),
                    candidates: candidates.as_slice().to_vec(),
                    validators: validators.clone(),
                })?;
                (candidates, validators)
            }
        };
        let blacklist = Blacklist::default();
        blacklist.reload(&state)?;

        let execution = &config.execution;
        let executor_config = ExecutorConfig::new(execution.wasm_gas_rate)
            .with_test_mode(execution.is_test_mode)
            .with_max_tx_bytes(execution.max_tx_bytes)
            .with_balance_records(execution.save_balance_record)
            .with_verify_workers(config.ledger.verify_workers);
        let processor = BlockProcessor::new(executor_config, blacklist.clone(), utxos.clone());
        let mempool = InMemoryMempool::new(
            MempoolConfig {
                capacity: config.ledger.mempool_capacity,
                max_tx_bytes: execution.max_tx_bytes,
                test_mode: execution.is_test_mode,
            },
            blacklist.clone(),
        );

        debug!(
            height = head.height(),
            candidates = candidates.len(),
            validators = validators.len(),
            "ledger ready"
        );
        Ok(Self {
            check_state: Arc::new(RwLock::new(state.copy())),
            inner: Arc::new(Mutex::new(LedgerState { state, head, candidates, validators, coefficient })),
            processor,
            cache: ProcessCache::new(config.ledger.process_cache_capacity, config.ledger.process_cache_max_age),
            mempool,
            blacklist,
            blocks,
            utxos,
            records,
            elections,
            keep_latest_blocks: config.storage.keep_latest_blocks,
        })
    }

    async fn parent(&self) -> Parent {
        let inner = self.inner.lock().await;
        Parent {
            state: inner.state.copy(),
            header: inner.head.header.clone(),
            hash: inner.head.id(),
            candidates: inner.candidates.clone(),
            validators: inner.validators.clone(),
        }
    }

    fn process(&self, block: &Block, parent: Parent) -> Result<ProcessedBlock, ProcessError> {
        let Parent { mut state, candidates, validators, .. } = parent;
        let result = self.processor.process(block, &mut state, candidates, &validators)?;
        Ok(ProcessedBlock::new(state, result))
    }

    /// Build a proposal for `height` from up to `max_txs` pooled transactions.
    ///
    /// The header carries the previous block's results until
    /// [`pre_run_block`](Self::pre_run_block) fills in its own.
    pub async fn create_block(&self, height: u64, max_txs: usize, gas_limit: u64, time: u64) -> LedgerResult<Block> {
        let inner = self.inner.lock().await;
        let head = &inner.head.header;
        if height != head.height + 1 {
            error!(head = head.height, height, "create block at mismatched height");
            return Err(LedgerError::HeightMismatch { expected: head.height + 1, got: height });
        }

        let txs = self.mempool.reap(max_txs);
        let last_commit = self.blocks.seen_commit(head.height)?.unwrap_or_default();
        let header = Header {
            parent_hash: inner.head.id(),
            height,
            time,
            gas_limit,
            state_hash: head.state_hash,
            receipt_hash: head.receipt_hash,
            gas_used: head.gas_used,
            ..Default::default()
        };
        let block = Block::new(header, txs, Vec::new(), last_commit);
        info!(height, txs = block.txs.len(), data_hash = %block.header.data_hash, "created block");
        Ok(block)
    }

    /// Execute a proposal and write its expected results into the header.
    ///
    /// The result is cached under the completed block's hash.
    pub async fn pre_run_block(&self, block: &mut Block) -> LedgerResult<()> {
        let parent = self.parent().await;
        let height = block.height();
        if height != parent.header.height + 1 {
            return Err(LedgerError::HeightMismatch { expected: parent.header.height + 1, got: height });
        }

        let ProcessedBlock { state, mut result } = self.process(block, parent)?;
        block.header.state_hash = result.state_root;
        block.header.receipt_hash = result.receipt_root;
        block.header.gas_used = result.gas_used;

        let hash = block.id();
        result.block_hash = hash;
        if let Some(records) = result.balance_records.as_mut() {
            records.block_hash = hash.0;
        }
        self.cache.insert(hash, ProcessedBlock::new(state, result));
        info!(height, hash = %hash.0, gas_used = block.header.gas_used, "pre-ran block");
        Ok(())
    }

    /// Validate a block against the head and its own execution.
    ///
    /// Returns `Ok(false)` for an invalid block. Errors are reserved for storage failures.
    pub async fn check_block(&self, block: &Block) -> LedgerResult<bool> {
        let parent = self.parent().await;
        let height = block.height();
        let header = &block.header;

        if height != parent.header.height + 1 {
            error!(head = parent.header.height, height, "check block at mismatched height");
            return Ok(false);
        }
        if header.time.saturating_add(BLOCK_TIME_DRIFT) <= parent.header.time {
            error!(
                height,
                parent_time = parent.header.time,
                time = header.time,
                "block time is too far behind its parent"
            );
            return Ok(false);
        }
        let data_hash = Block::compute_data_hash(&block.txs);
        if header.data_hash != data_hash {
            error!(height, want = %data_hash, got = %header.data_hash, "mismatched data hash");
            return Ok(false);
        }
        if header.parent_hash != parent.hash {
            error!(height, want = %parent.hash.0, got = %header.parent_hash.0, "mismatched parent hash");
            return Ok(false);
        }

        let hash = block.id();
        let processed = match self.cache.get_or_process(hash, || self.process(block, parent)) {
            Ok(processed) => processed,
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => {
                warn!(height, %err, "block processing failed");
                return Ok(false);
            }
        };

        let result = &processed.result;
        if !result.matches(header.gas_used, &header.state_hash, &header.receipt_hash) {
            error!(
                height,
                want_gas = result.gas_used,
                got_gas = header.gas_used,
                want_state = %result.state_root,
                got_state = %header.state_hash,
                want_receipts = %result.receipt_root,
                got_receipts = %header.receipt_hash,
                "block does not match its execution result"
            );
            return Ok(false);
        }
        debug!(height, hash = %hash.0, "checked block");
        Ok(true)
    }

    /// Persist a processed block and advance the head.
    ///
    /// The block must have been pre-run or checked, unless `fast_sync` is set, in which case
    /// it is executed here and must match its header.
    pub async fn commit_block(&self, block: Block, seen_commit: Commit, fast_sync: bool) -> LedgerResult<CommittedBlock> {
        let mut inner = self.inner.lock().await;
        let height = block.height();
        let expected = inner.head.height() + 1;
        if height != expected {
            return Err(LedgerError::HeightMismatch { expected, got: height });
        }

        let hash = block.id();
        let processed = match self.cache.take(&hash) {
            Some(processed) => processed,
            None if fast_sync => {
                let mut state = inner.state.copy();
                let result = self.processor.process(&block, &mut state, inner.candidates.clone(), &inner.validators)?;
                if !result.matches(block.header.gas_used, &block.header.state_hash, &block.header.receipt_hash) {
                    return Err(LedgerError::ResultMismatch { height });
                }
                ProcessedBlock::new(state, result)
            }
            None => return Err(LedgerError::NotProcessed(hash.0)),
        };
        info!(height, hash = %hash.0, "commit block");

        let ProcessedBlock { mut state, result } = processed;
        let ProcessResult {
            receipts, logs, logs_bloom, utxo_outputs, key_images, candidates, balance_records, state_root, ..
        } = result;
        let root = state.intermediate_root(false)?;
        if root != state_root {
            error!(height, %root, processed = %state_root, "state root changed after processing");
            return Err(LedgerError::RootMismatch { height, expected: state_root, actual: root });
        }

        let mut candidates =
            candidates.advance(&state, height, &block.header.last_commit_hash, &inner.coefficient)?;
        if block.header.recover > 0 {
            candidates.recover(&inner.validators);
        }
        let coefficient = state.coefficient()?;
        let validators = candidates.elect(&coefficient, state.white_validators()?);

        state.commit(height)?;
        let mut block = block;
        block.header.logs_bloom = logs_bloom;
        if let Some(mut records) = balance_records {
            records.block_hash = hash.0;
            records.time = block.header.time;
            self.records.put(&records)?;
        }
        self.elections.put(&ElectionSnapshot {
            height,
            candidates: candidates.as_slice().to_vec(),
            validators: validators.clone(),
        })?;
        self.blocks.put_block(&block, &receipts, Some(&seen_commit))?;
        self.utxos.apply(&utxo_outputs, &key_images)?;
        if self.keep_latest_blocks > 0 {
            self.blocks.prune(self.keep_latest_blocks)?;
            if height >= self.keep_latest_blocks {
                self.elections.prune_below(height + 1 - self.keep_latest_blocks)?;
            }
        }

        *self.check_state.write() = state.copy();
        self.blacklist.reload(&state)?;
        if let Err(err) = self.mempool.update(height, &block.txs, &state) {
            warn!(height, %err, "update mempool failed");
        }

        let txs = block.txs.len();
        inner.state = state;
        inner.head = block;
        inner.candidates = candidates;
        inner.validators = validators.clone();
        inner.coefficient = coefficient;
        drop(inner);

        self.cache.prune(height);
        info!(height, hash = %hash.0, %root, txs, validators = validators.len(), "committed block");
        Ok(CommittedBlock { height, hash, validators, logs })
    }

    /// Check a transaction against the check-tx state.
    pub fn check_tx(&self, tx: &Transaction) -> LedgerResult<()> {
        let sender = tx.sender().map_err(ConsensusError::from)?;
        if let (Some(address), Some(nonce)) = (sender, tx.nonce()) {
            let state = self.check_state.read().get_nonce(&address)?;
            if nonce < state {
                return Err(ConsensusError::StaleNonce { address, state, tx: nonce }.into());
            }
        }
        Ok(())
    }

    /// Check a transaction and admit it to the mempool.
    pub fn submit_tx(&self, tx: Transaction) -> LedgerResult<TxId> {
        self.check_tx(&tx)?;
        Ok(self.mempool.insert(tx)?)
    }

    /// Balance of `address` in `token` at the check-tx state.
    pub fn get_balance(&self, address: &Address, token: &Address) -> LedgerResult<U256> {
        Ok(self.check_state.read().get_balance(address, token)?)
    }

    /// Nonce of `address` at the check-tx state.
    pub fn get_nonce(&self, address: &Address) -> LedgerResult<u64> {
        Ok(self.check_state.read().get_nonce(address)?)
    }

    /// Storage root of `address` at the check-tx state.
    pub fn get_storage_root(&self, address: &Address) -> LedgerResult<B256> {
        Ok(self.check_state.read().storage_root(address)?)
    }

    /// Code of `address` at the check-tx state.
    pub fn get_code(&self, address: &Address) -> LedgerResult<Bytes> {
        Ok(self.check_state.read().get_code(address)?)
    }

    /// Copy of the check-tx state.
    pub fn pending_state(&self) -> WorldState {
        self.check_state.read().copy()
    }

    /// Copy of the committed state.
    pub async fn latest_state(&self) -> WorldState {
        self.inner.lock().await.state.copy()
    }

    /// Height of the head.
    pub async fn height(&self) -> u64 {
        self.inner.lock().await.head.height()
    }

    /// The head block.
    pub async fn head(&self) -> Block {
        self.inner.lock().await.head.clone()
    }

    /// Validators of the next height.
    pub async fn validators(&self) -> Vec<Validator> {
        self.inner.lock().await.validators.clone()
    }

    /// Coefficients loaded at the last commit.
    pub async fn coefficient(&self) -> Coefficient {
        self.inner.lock().await.coefficient
    }

    /// Committed block at `height`.
    pub fn block(&self, height: u64) -> LedgerResult<Option<Block>> {
        Ok(self.blocks.block(height)?)
    }

    /// Receipts of the committed block at `height`.
    pub fn receipts(&self, height: u64) -> LedgerResult<Option<Vec<Receipt>>> {
        Ok(self.blocks.receipts(height)?)
    }

    /// Balance records of the committed block at `height`.
    pub fn balance_records(&self, height: u64) -> LedgerResult<Option<BlockBalanceRecords>> {
        Ok(self.records.get(height)?)
    }

    /// Pending transactions.
    pub const fn mempool(&self) -> &InMemoryMempool {
        &self.mempool
    }

    /// Processed blocks awaiting commit.
    pub const fn cache(&self) -> &ProcessCache {
        &self.cache
    }

    /// Addresses rejected by the mempool and block verification.
    pub const fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    /// Interrupt running contract code; later executions fail until restart.
    pub fn stop(&self) {
        self.abort_flag().store(true, Ordering::SeqCst);
        info!("ledger stopped");
    }

    /// Whether [`stop`](Self::stop) was called.
    pub fn is_stopped(&self) -> bool {
        self.abort_flag().load(Ordering::SeqCst)
    }

    fn abort_flag(&self) -> Arc<AtomicBool> {
        self.processor.abort_handle()
    }
}
