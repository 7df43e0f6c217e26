//! In-memory mempool implementation.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use alloy_primitives::Address;
use hyla_domain::{KeyImage, MAX_TX_BYTES, Transaction, TxId};
use hyla_executor::Blacklist;
use hyla_state::WorldState;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::{ConsensusError, traits::Mempool};

/// Mempool admission limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MempoolConfig {
    /// Maximum pooled transactions.
    pub capacity: usize,
    /// Largest accepted encoded transaction.
    pub max_tx_bytes: usize,
    /// Relaxes static checks for local test networks.
    pub test_mode: bool,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self { capacity: 10_000, max_tx_bytes: MAX_TX_BYTES, test_mode: false }
    }
}

impl MempoolConfig {
    /// Sets the pool capacity.
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets test mode.
    pub const fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }
}

#[derive(Debug)]
struct PooledTx {
    tx: Transaction,
    id: TxId,
    sender: Option<Address>,
    key_images: Vec<KeyImage>,
}

#[derive(Debug, Default)]
struct PoolInner {
    by_seq: BTreeMap<u64, PooledTx>,
    by_id: HashMap<TxId, u64>,
    by_key_image: HashMap<KeyImage, TxId>,
    next_seq: u64,
}

impl PoolInner {
    fn remove(&mut self, seq: u64) -> Option<PooledTx> {
        let pooled = self.by_seq.remove(&seq)?;
        self.by_id.remove(&pooled.id);
        for image in &pooled.key_images {
            self.by_key_image.remove(image);
        }
        Some(pooled)
    }
}

/// Mempool keeping transactions in arrival order.
///
/// Pooled transactions never share a key image. Reaping returns each sender's
/// transactions in nonce order within the arrival order.
#[derive(Debug, Clone)]
pub struct InMemoryMempool {
    inner: Arc<RwLock<PoolInner>>,
    blacklist: Blacklist,
    config: MempoolConfig,
}

impl Default for InMemoryMempool {
    fn default() -> Self {
        Self::new(MempoolConfig::default(), Blacklist::default())
    }
}

impl InMemoryMempool {
    /// Create an empty mempool rejecting addresses in `blacklist`.
    #[must_use]
    pub fn new(config: MempoolConfig, blacklist: Blacklist) -> Self {
        Self { inner: Arc::default(), blacklist, config }
    }

    /// Admission limits.
    pub const fn config(&self) -> &MempoolConfig {
        &self.config
    }

    fn check(&self, tx: &Transaction) -> Result<Option<Address>, ConsensusError> {
        tx.check_basic(self.config.max_tx_bytes, self.config.test_mode)?;
        let sender = tx.sender()?;
        let to = tx.to();
        let token = tx.token();
        let touched = sender.iter().chain(to.as_ref()).chain((!token.is_zero()).then_some(&token));
        if let Some(address) = self.blacklist.find(touched) {
            return Err(ConsensusError::Blacklisted(address));
        }
        Ok(sender)
    }
}

impl Mempool for InMemoryMempool {
    fn insert(&self, tx: Transaction) -> Result<TxId, ConsensusError> {
        let id = tx.id();
        if self.contains(&id) {
            return Err(ConsensusError::Duplicate(id));
        }
        let sender = self.check(&tx)?;
        let key_images = match &tx {
            Transaction::Utxo(utxo) => utxo.key_images(),
            _ => Vec::new(),
        };

        let mut inner = self.inner.write();
        if inner.by_id.contains_key(&id) {
            return Err(ConsensusError::Duplicate(id));
        }
        if inner.by_seq.len() >= self.config.capacity {
            return Err(ConsensusError::PoolFull(self.config.capacity));
        }
        if let Some(image) = key_images.iter().find(|image| inner.by_key_image.contains_key(image)) {
            return Err(ConsensusError::KeyImageInPool(*image));
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        for image in &key_images {
            inner.by_key_image.insert(*image, id);
        }
        inner.by_id.insert(id, seq);
        inner.by_seq.insert(seq, PooledTx { tx, id, sender, key_images });
        trace!(id = ?id.0, seq, "admitted transaction");
        Ok(id)
    }

    fn contains(&self, id: &TxId) -> bool {
        self.inner.read().by_id.contains_key(id)
    }

    fn reap(&self, max_txs: usize) -> Vec<Transaction> {
        let inner = self.inner.read();
        let picked: Vec<&PooledTx> = inner.by_seq.values().take(max_txs).collect();

        let mut slots: HashMap<Address, Vec<usize>> = HashMap::new();
        for (slot, pooled) in picked.iter().enumerate() {
            if let Some(sender) = pooled.sender {
                slots.entry(sender).or_default().push(slot);
            }
        }
        let mut ordered = picked.clone();
        for positions in slots.values() {
            let mut txs: Vec<&PooledTx> = positions.iter().map(|slot| picked[*slot]).collect();
            txs.sort_by_key(|pooled| pooled.tx.nonce());
            for (slot, pooled) in positions.iter().zip(txs) {
                ordered[*slot] = pooled;
            }
        }
        ordered.into_iter().map(|pooled| pooled.tx.clone()).collect()
    }

    fn update(&self, height: u64, committed: &[Transaction], state: &WorldState) -> Result<usize, ConsensusError> {
        let ids: HashSet<TxId> = committed.iter().map(Transaction::id).collect();
        let spent: HashSet<KeyImage> = committed
            .iter()
            .filter_map(|tx| match tx {
                Transaction::Utxo(utxo) => Some(utxo.key_images()),
                _ => None,
            })
            .flatten()
            .collect();

        let mut inner = self.inner.write();
        let mut stale = Vec::new();
        for (seq, pooled) in &inner.by_seq {
            let nonce_used = match (pooled.sender, pooled.tx.nonce()) {
                (Some(sender), Some(nonce)) => state.get_nonce(&sender)? > nonce,
                _ => false,
            };
            let conflicts = pooled.key_images.iter().any(|image| spent.contains(image));
            if nonce_used || conflicts || ids.contains(&pooled.id) {
                stale.push(*seq);
            }
        }
        for seq in &stale {
            inner.remove(*seq);
        }
        debug!(height, removed = stale.len(), remaining = inner.by_seq.len(), "updated mempool");
        Ok(stale.len())
    }

    fn len(&self) -> usize {
        self.inner.read().by_seq.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use alloy_primitives::{Bytes, U256};
    use hyla_backend::MemoryStore;
    use hyla_domain::{AccountTx, PubKey, StealthKeys, TxKind, TxOutput, UtxoInput, UtxoTx};
    use hyla_executor::BlacklistUpdate;
    use hyla_primitives::{COIN, MIN_GAS_LIMIT};
    use k256::ecdsa::SigningKey;

    use super::*;

    const RECEIVER: Address = Address::repeat_byte(0xbb);

    fn key(byte: u8) -> SigningKey {
        SigningKey::from_bytes(&[byte; 32].into()).unwrap()
    }

    fn address(byte: u8) -> Address {
        PubKey::from_signing_key(&key(byte)).address().unwrap()
    }

    fn transfer(signer: u8, nonce: u64) -> Transaction {
        let mut tx = AccountTx::new(nonce, Some(RECEIVER), U256::from(1), MIN_GAS_LIMIT, Bytes::new());
        tx.sign(TxKind::Transfer, &key(signer)).unwrap();
        Transaction::Transfer(tx)
    }

    fn spend_twice() -> (Transaction, Transaction) {
        let owner = StealthKeys::new(key(11), key(12));
        let (stored, _) = owner.address().pay(&key(13), 0, U256::from(10) * COIN).unwrap();
        let owned = owner.scan(&stored, 0).unwrap();
        let build = |fee: u64| {
            let fee = U256::from(fee) * COIN;
            let (output, _) = owner.address().pay(&key(14), 1, U256::from(10) * COIN - fee).unwrap();
            let mut tx = UtxoTx::new(
                Address::ZERO,
                vec![UtxoInput::Utxo(owned.spend(0))],
                vec![TxOutput::Utxo { amount: U256::from(10) * COIN - fee, output }],
                fee,
            );
            let signature = owned.sign(&tx.signing_hash()).unwrap();
            tx.set_input_signature(0, signature);
            Transaction::Utxo(tx)
        };
        (build(1), build(2))
    }

    #[test]
    fn mempool_insert_and_reap() {
        let mempool = InMemoryMempool::default();
        let first = transfer(1, 0);
        let second = transfer(2, 0);

        let id = mempool.insert(first.clone()).unwrap();
        mempool.insert(second.clone()).unwrap();
        assert!(mempool.contains(&id));
        assert!(matches!(mempool.insert(first.clone()), Err(ConsensusError::Duplicate(dup)) if dup == id));
        assert_eq!(mempool.len(), 2);

        assert_eq!(mempool.reap(10), vec![first.clone(), second]);
        assert_eq!(mempool.reap(1), vec![first]);
    }

    #[test]
    fn mempool_reap_orders_sender_nonces() {
        let mempool = InMemoryMempool::default();
        let late = transfer(1, 1);
        let other = transfer(2, 0);
        let early = transfer(1, 0);
        for tx in [late.clone(), other.clone(), early.clone()] {
            mempool.insert(tx).unwrap();
        }
        assert_eq!(mempool.reap(10), vec![early, other, late]);
    }

    #[test]
    fn mempool_capacity() {
        let mempool = InMemoryMempool::new(MempoolConfig::default().with_capacity(1), Blacklist::default());
        mempool.insert(transfer(1, 0)).unwrap();
        assert!(matches!(mempool.insert(transfer(2, 0)), Err(ConsensusError::PoolFull(1))));
    }

    #[test]
    fn mempool_rejects_blacklisted_sender() {
        let blacklist = Blacklist::default();
        blacklist.apply(&BlacklistUpdate { add: vec![address(1)], del: vec![] });
        let mempool = InMemoryMempool::new(MempoolConfig::default(), blacklist);
        let err = mempool.insert(transfer(1, 0)).unwrap_err();
        assert!(matches!(err, ConsensusError::Blacklisted(addr) if addr == address(1)));
        assert!(mempool.is_empty());
    }

    #[test]
    fn mempool_rejects_key_image_conflict() {
        let mempool = InMemoryMempool::default();
        let (first, second) = spend_twice();
        mempool.insert(first).unwrap();
        assert!(matches!(mempool.insert(second), Err(ConsensusError::KeyImageInPool(_))));
        assert_eq!(mempool.len(), 1);
    }

    #[test]
    fn mempool_update_drops_committed_and_stale() {
        let mempool = InMemoryMempool::default();
        let (first, second) = spend_twice();
        let committed_elsewhere = transfer(1, 0);
        let pending = transfer(2, 0);
        mempool.insert(first).unwrap();
        mempool.insert(committed_elsewhere.clone()).unwrap();
        mempool.insert(pending.clone()).unwrap();

        let mut state = WorldState::new(Arc::new(MemoryStore::new()));
        state.set_nonce(address(1), 1).unwrap();
        let removed = mempool.update(7, &[second], &state).unwrap();

        assert_eq!(removed, 2);
        assert_eq!(mempool.reap(10), vec![pending]);
        assert!(!mempool.contains(&committed_elsewhere.id()));
    }
}
