//! Journaled world state.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use alloy_rlp::{Decodable, Encodable};
use hyla_domain::Log;
use hyla_primitives::{EMPTY_ROOT_HASH, KECCAK256_EMPTY, merkle_root};
use hyla_traits::{KvStore, WriteBatch};
use tracing::{debug, error};

use crate::{
    StateAccount, StateError,
    account::{
        ACCOUNT_PREFIX, ROOT_KEY, account_key, code_key, hashed_address, storage_key, storage_prefix,
        storage_root, token_key, token_prefix, token_root,
    },
    journal::JournalEntry,
    object::StateObject,
};

/// Identifier returned by [`WorldState::snapshot`].
pub type SnapshotId = usize;

/// Account state over a key-value store with LIFO snapshots.
///
/// Clones share the store but not the cached objects, so a clone can execute a block
/// without touching the original until it is committed.
#[derive(Clone, Debug)]
pub struct WorldState {
    db: Arc<dyn KvStore>,
    /// `None` marks an account known to be absent.
    objects: BTreeMap<Address, Option<StateObject>>,
    dirty: BTreeSet<Address>,
    journal: Vec<JournalEntry>,
    revisions: Vec<(SnapshotId, usize)>,
    next_revision: SnapshotId,
    refund: u64,
    logs: BTreeMap<B256, Vec<Log>>,
    log_size: u32,
    tx_hash: B256,
    block_hash: B256,
    tx_index: u32,
    root: B256,
    height: u64,
}

impl WorldState {
    /// Empty state over `db`, ignoring anything already committed to it.
    pub fn new(db: Arc<dyn KvStore>) -> Self {
        Self {
            db,
            objects: BTreeMap::new(),
            dirty: BTreeSet::new(),
            journal: Vec::new(),
            revisions: Vec::new(),
            next_revision: 0,
            refund: 0,
            logs: BTreeMap::new(),
            log_size: 0,
            tx_hash: B256::ZERO,
            block_hash: B256::ZERO,
            tx_index: 0,
            root: EMPTY_ROOT_HASH,
            height: 0,
        }
    }

    /// Reopen the state committed to `db`.
    ///
    /// When `expected` is set, the digest of the stored state must equal it.
    pub fn open(db: Arc<dyn KvStore>, expected: Option<B256>) -> Result<Self, StateError> {
        let mut state = Self::new(db);
        if let Some(bytes) = state.db.get(ROOT_KEY)? {
            if bytes.len() != 40 {
                return Err(StateError::CorruptState("bad root record".to_string()));
            }
            state.root = B256::from_slice(&bytes[..32]);
            let mut height = [0u8; 8];
            height.copy_from_slice(&bytes[32..]);
            state.height = u64::from_be_bytes(height);
        }
        if let Some(expected) = expected {
            let actual = state.intermediate_root(false)?;
            if actual != expected {
                return Err(StateError::CorruptState(format!(
                    "state root mismatch: stored {actual}, expected {expected}"
                )));
            }
            state.root = actual;
        }
        debug!(root = %state.root, height = state.height, "opened world state");
        Ok(state)
    }

    /// Root of the last commit.
    pub const fn root(&self) -> B256 {
        self.root
    }

    /// Height of the last commit.
    pub const fn height(&self) -> u64 {
        self.height
    }

    /// Independent copy sharing the store.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    fn load(&self, address: &Address) -> Result<Option<StateObject>, StateError> {
        let hashed = hashed_address(address);
        let Some(bytes) = self.db.get(&account_key(&hashed))? else {
            return Ok(None);
        };
        let account = StateAccount::decode(&mut bytes.as_slice())
            .map_err(|e| StateError::CorruptState(format!("account {address}: {e}")))?;

        let mut object = StateObject::new(address);
        object.fresh = false;
        object.nonce = account.nonce;
        object.balance = account.balance;
        object.code_hash = account.code_hash;
        object.storage_root = account.storage_root;

        let prefix = token_prefix(&hashed);
        for (key, value) in self.db.scan_prefix(&prefix)? {
            if key.len() != prefix.len() + 20 || value.len() != 32 {
                return Err(StateError::CorruptState(format!("token entry of {address}")));
            }
            object.tokens.insert(Address::from_slice(&key[prefix.len()..]), U256::from_be_slice(&value));
        }

        if account.code_hash != KECCAK256_EMPTY {
            let code = self.db.get(&code_key(&account.code_hash))?.ok_or_else(|| {
                StateError::CorruptState(format!("missing code {}", account.code_hash))
            })?;
            if keccak256(&code) != account.code_hash {
                return Err(StateError::CorruptState(format!("code hash mismatch {}", account.code_hash)));
            }
            object.code = code.into();
        }
        Ok(Some(object))
    }

    fn with_object<R>(
        &self,
        address: &Address,
        f: impl FnOnce(Option<&StateObject>) -> R,
    ) -> Result<R, StateError> {
        match self.objects.get(address) {
            Some(entry) => Ok(f(entry.as_ref())),
            None => {
                let loaded = self.load(address)?;
                Ok(f(loaded.as_ref()))
            }
        }
    }

    /// Cached object for `address`, created when absent.
    fn object_mut(&mut self, address: Address) -> Result<&mut StateObject, StateError> {
        if !self.objects.contains_key(&address) {
            let loaded = self.load(&address)?;
            self.objects.insert(address, loaded);
        }
        self.dirty.insert(address);
        let entry = self.objects.entry(address).or_default();
        if entry.is_none() {
            *entry = Some(StateObject::new(&address));
            self.journal.push(JournalEntry::Created { address, prev: None });
        }
        match entry {
            Some(object) => Ok(object),
            None => unreachable!("object inserted above"),
        }
    }

    /// Whether the account exists, including accounts suicided in this block.
    pub fn exist(&self, address: &Address) -> Result<bool, StateError> {
        self.with_object(address, |object| object.is_some())
    }

    /// Whether the account is absent or has no nonce, balance or code.
    pub fn empty(&self, address: &Address) -> Result<bool, StateError> {
        self.with_object(address, |object| object.is_none_or(StateObject::is_empty))
    }

    /// Whether the account has code.
    pub fn is_contract(&self, address: &Address) -> Result<bool, StateError> {
        self.with_object(address, |object| object.is_some_and(StateObject::has_code))
    }

    /// Create a fresh account, carrying over any existing balances.
    pub fn create_account(&mut self, address: Address) -> Result<(), StateError> {
        if !self.objects.contains_key(&address) {
            let loaded = self.load(&address)?;
            self.objects.insert(address, loaded);
        }
        self.dirty.insert(address);
        let prev = self.objects.get(&address).cloned().flatten();
        let mut object = StateObject::new(&address);
        if let Some(prev) = &prev {
            object.balance = prev.balance;
            object.tokens = prev.tokens.clone();
        }
        self.journal.push(JournalEntry::Created { address, prev: prev.map(Box::new) });
        self.objects.insert(address, Some(object));
        Ok(())
    }

    /// Account nonce.
    pub fn get_nonce(&self, address: &Address) -> Result<u64, StateError> {
        self.with_object(address, |object| object.map_or(0, |o| o.nonce))
    }

    /// Set the account nonce.
    pub fn set_nonce(&mut self, address: Address, nonce: u64) -> Result<(), StateError> {
        let object = self.object_mut(address)?;
        let prev = object.nonce;
        object.nonce = nonce;
        self.journal.push(JournalEntry::Nonce { address, prev });
        Ok(())
    }

    /// Balance of `address` in `token`; the zero token is the native coin.
    pub fn get_balance(&self, address: &Address, token: &Address) -> Result<U256, StateError> {
        self.with_object(address, |object| object.map_or(U256::ZERO, |o| o.balance(token)))
    }

    /// Every non-zero balance of the account, native coin first, then tokens by address.
    pub fn get_token_balances(&self, address: &Address) -> Result<Vec<(Address, U256)>, StateError> {
        self.with_object(address, |object| {
            let Some(object) = object else {
                return Vec::new();
            };
            let native = (!object.balance.is_zero()).then_some((Address::ZERO, object.balance));
            native
                .into_iter()
                .chain(object.tokens.iter().filter(|(_, v)| !v.is_zero()).map(|(t, v)| (*t, *v)))
                .collect()
        })
    }

    /// Credit `amount` of `token`.
    pub fn add_balance(&mut self, address: Address, token: Address, amount: U256) -> Result<(), StateError> {
        let object = self.object_mut(address)?;
        let prev = object.balance(&token);
        object.set_balance(&token, prev.saturating_add(amount));
        self.journal.push(JournalEntry::Balance { address, token, prev });
        Ok(())
    }

    /// Debit `amount` of `token`, failing when the balance is short.
    pub fn sub_balance(&mut self, address: Address, token: Address, amount: U256) -> Result<(), StateError> {
        let have = self.get_balance(&address, &token)?;
        if have < amount {
            return Err(StateError::InsufficientBalance { address, token, have, need: amount });
        }
        let object = self.object_mut(address)?;
        object.set_balance(&token, have - amount);
        self.journal.push(JournalEntry::Balance { address, token, prev: have });
        Ok(())
    }

    /// Account code.
    pub fn get_code(&self, address: &Address) -> Result<Bytes, StateError> {
        self.with_object(address, |object| object.map(|o| o.code.clone()).unwrap_or_default())
    }

    /// Keccak of the account code, or zero for an absent account.
    pub fn get_code_hash(&self, address: &Address) -> Result<B256, StateError> {
        self.with_object(address, |object| object.map_or(B256::ZERO, |o| o.code_hash))
    }

    /// Install code.
    pub fn set_code(&mut self, address: Address, code: Bytes) -> Result<(), StateError> {
        let object = self.object_mut(address)?;
        let prev_code = std::mem::replace(&mut object.code, code);
        let prev_hash = object.code_hash;
        object.code_hash = if object.code.is_empty() { KECCAK256_EMPTY } else { keccak256(&object.code) };
        self.journal.push(JournalEntry::Code { address, prev_code, prev_hash });
        Ok(())
    }

    /// Storage value, empty when unset.
    pub fn get_storage(&self, address: &Address, key: &B256) -> Result<Bytes, StateError> {
        let pending = self.objects.get(address).map(|entry| {
            entry.as_ref().map(|object| (object.storage.get(key).cloned(), object.fresh, object.hashed))
        });
        let hashed = match pending {
            Some(None) => return Ok(Bytes::new()),
            Some(Some((Some(value), _, _))) => return Ok(value),
            Some(Some((None, true, _))) => return Ok(Bytes::new()),
            Some(Some((None, false, hashed))) => hashed,
            None => hashed_address(address),
        };
        Ok(self.db.get(&storage_key(&hashed, key))?.map(Bytes::from).unwrap_or_default())
    }

    /// Write a storage value; empty bytes delete the entry.
    pub fn set_storage(&mut self, address: Address, key: B256, value: Bytes) -> Result<(), StateError> {
        let object = self.object_mut(address)?;
        let prev = object.storage.insert(key, value);
        self.journal.push(JournalEntry::Storage { address, key, prev });
        Ok(())
    }

    /// Root of the account storage including pending writes.
    pub fn storage_root(&self, address: &Address) -> Result<B256, StateError> {
        match self.objects.get(address) {
            Some(Some(object)) => self.object_storage_root(object),
            Some(None) => Ok(EMPTY_ROOT_HASH),
            None => Ok(self.load(address)?.map_or(EMPTY_ROOT_HASH, |o| o.storage_root)),
        }
    }

    fn object_storage_root(&self, object: &StateObject) -> Result<B256, StateError> {
        if !object.fresh && object.storage.is_empty() {
            return Ok(object.storage_root);
        }
        let mut entries = BTreeMap::new();
        if !object.fresh {
            let prefix = storage_prefix(&object.hashed);
            for (key, value) in self.db.scan_prefix(&prefix)? {
                entries.insert(B256::from_slice(&key[prefix.len()..]), Bytes::from(value));
            }
        }
        for (key, value) in &object.storage {
            if value.is_empty() {
                entries.remove(key);
            } else {
                entries.insert(*key, value.clone());
            }
        }
        Ok(storage_root(&entries))
    }

    /// Mark the account for removal at commit and clear its balances.
    ///
    /// Returns `false` when the account does not exist.
    pub fn suicide(&mut self, address: Address) -> Result<bool, StateError> {
        if !self.exist(&address)? {
            return Ok(false);
        }
        let object = self.object_mut(address)?;
        let entry = JournalEntry::Suicide {
            address,
            prev: object.suicided,
            prev_balance: object.balance,
            prev_tokens: std::mem::take(&mut object.tokens),
        };
        object.suicided = true;
        object.balance = U256::ZERO;
        self.journal.push(entry);
        Ok(true)
    }

    /// Whether the account suicided since the last commit.
    pub fn has_suicided(&self, address: &Address) -> Result<bool, StateError> {
        self.with_object(address, |object| object.is_some_and(|o| o.suicided))
    }

    /// Gas refund counter.
    pub const fn get_refund(&self) -> u64 {
        self.refund
    }

    /// Increase the refund counter.
    pub fn add_refund(&mut self, gas: u64) {
        self.journal.push(JournalEntry::Refund { prev: self.refund });
        self.refund = self.refund.saturating_add(gas);
    }

    /// Decrease the refund counter.
    pub fn sub_refund(&mut self, gas: u64) {
        self.journal.push(JournalEntry::Refund { prev: self.refund });
        self.refund = self.refund.saturating_sub(gas);
    }

    /// Key subsequent logs by transaction.
    pub fn prepare(&mut self, tx_hash: B256, block_hash: B256, tx_index: u32) {
        self.tx_hash = tx_hash;
        self.block_hash = block_hash;
        self.tx_index = tx_index;
        self.refund = 0;
    }

    /// Hash of the prepared transaction.
    pub const fn tx_hash(&self) -> B256 {
        self.tx_hash
    }

    /// Append a log to the prepared transaction.
    pub fn add_log(&mut self, mut log: Log) {
        log.tx_hash = self.tx_hash;
        log.tx_index = self.tx_index;
        log.index = self.log_size;
        self.journal.push(JournalEntry::Log { tx_hash: self.tx_hash });
        self.logs.entry(self.tx_hash).or_default().push(log);
        self.log_size += 1;
    }

    /// Logs of a transaction in emission order.
    pub fn get_logs(&self, tx_hash: &B256) -> Vec<Log> {
        self.logs.get(tx_hash).cloned().unwrap_or_default()
    }

    /// Every log since the last commit.
    pub fn logs(&self) -> Vec<Log> {
        let mut logs: Vec<Log> = self.logs.values().flatten().cloned().collect();
        logs.sort_by_key(|log| log.index);
        logs
    }

    /// Start a revertible window.
    pub fn snapshot(&mut self) -> SnapshotId {
        let id = self.next_revision;
        self.next_revision += 1;
        self.revisions.push((id, self.journal.len()));
        id
    }

    /// Undo every mutation since `id` was taken.
    pub fn revert_to(&mut self, id: SnapshotId) {
        let Ok(position) = self.revisions.binary_search_by_key(&id, |(rid, _)| *rid) else {
            error!(id, "revert to unknown snapshot");
            return;
        };
        let length = self.revisions[position].1;
        while self.journal.len() > length {
            if let Some(entry) = self.journal.pop() {
                self.undo(entry);
            }
        }
        self.revisions.truncate(position);
    }

    fn undo(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::Created { address, prev } => {
                self.objects.insert(address, prev.map(|p| *p));
            }
            JournalEntry::Nonce { address, prev } => {
                if let Some(Some(object)) = self.objects.get_mut(&address) {
                    object.nonce = prev;
                }
            }
            JournalEntry::Balance { address, token, prev } => {
                if let Some(Some(object)) = self.objects.get_mut(&address) {
                    object.set_balance(&token, prev);
                }
            }
            JournalEntry::Code { address, prev_code, prev_hash } => {
                if let Some(Some(object)) = self.objects.get_mut(&address) {
                    object.code = prev_code;
                    object.code_hash = prev_hash;
                }
            }
            JournalEntry::Storage { address, key, prev } => {
                if let Some(Some(object)) = self.objects.get_mut(&address) {
                    match prev {
                        Some(value) => object.storage.insert(key, value),
                        None => object.storage.remove(&key),
                    };
                }
            }
            JournalEntry::Suicide { address, prev, prev_balance, prev_tokens } => {
                if let Some(Some(object)) = self.objects.get_mut(&address) {
                    object.suicided = prev;
                    object.balance = prev_balance;
                    object.tokens = prev_tokens;
                }
            }
            JournalEntry::Log { tx_hash } => {
                if let Some(logs) = self.logs.get_mut(&tx_hash) {
                    logs.pop();
                    if logs.is_empty() {
                        self.logs.remove(&tx_hash);
                    }
                }
                self.log_size -= 1;
            }
            JournalEntry::Refund { prev } => self.refund = prev,
        }
    }

    /// Encoded account of a live object with its roots recomputed.
    fn encode_object(&self, object: &StateObject) -> Result<Vec<u8>, StateError> {
        let account = StateAccount {
            nonce: object.nonce,
            balance: object.balance,
            code_hash: object.code_hash,
            storage_root: self.object_storage_root(object)?,
            token_root: token_root(&object.tokens),
        };
        let mut buf = Vec::with_capacity(account.length());
        account.encode(&mut buf);
        Ok(buf)
    }

    fn is_removed(object: Option<&StateObject>, delete_empty: bool) -> bool {
        object.is_none_or(|o| o.suicided || (delete_empty && o.is_empty()))
    }

    /// Digest of the full state including pending changes, without persisting.
    pub fn intermediate_root(&self, delete_empty: bool) -> Result<B256, StateError> {
        let mut leaves: BTreeMap<B256, Vec<u8>> = BTreeMap::new();
        for (key, value) in self.db.scan_prefix(&[ACCOUNT_PREFIX])? {
            if key.len() != 33 {
                return Err(StateError::CorruptState("bad account key".to_string()));
            }
            leaves.insert(B256::from_slice(&key[1..]), value);
        }
        for address in &self.dirty {
            let object = self.objects.get(address).and_then(Option::as_ref);
            let hashed = hashed_address(address);
            if Self::is_removed(object, delete_empty) {
                leaves.remove(&hashed);
            } else if let Some(object) = object {
                leaves.insert(hashed, self.encode_object(object)?);
            }
        }
        Ok(merkle_root(leaves.into_iter().map(|(hashed, account)| {
            let mut leaf = hashed.to_vec();
            leaf.extend_from_slice(&account);
            leaf
        })))
    }

    /// Persist pending changes and return the new root.
    pub fn commit(&mut self, height: u64) -> Result<B256, StateError> {
        let root = self.intermediate_root(false)?;
        let mut batch = WriteBatch::new();
        let mut roots = BTreeMap::new();
        for address in &self.dirty {
            let hashed = hashed_address(address);
            let object = self.objects.get(address).and_then(Option::as_ref);
            let removed = Self::is_removed(object, false);
            let wipe_storage = removed || object.is_some_and(|o| o.fresh);
            if wipe_storage {
                for (key, _) in self.db.scan_prefix(&storage_prefix(&hashed))? {
                    batch.delete(key);
                }
            }
            for (key, _) in self.db.scan_prefix(&token_prefix(&hashed))? {
                batch.delete(key);
            }
            let Some(object) = object.filter(|_| !removed) else {
                batch.delete(account_key(&hashed));
                continue;
            };
            for (key, value) in &object.storage {
                let full = storage_key(&hashed, key);
                if value.is_empty() {
                    batch.delete(full);
                } else {
                    batch.put(full, value.to_vec());
                }
            }
            for (token, amount) in object.tokens.iter().filter(|(_, amount)| !amount.is_zero()) {
                batch.put(token_key(&hashed, token), amount.to_be_bytes::<32>().to_vec());
            }
            if object.has_code() {
                batch.put(code_key(&object.code_hash), object.code.to_vec());
            }
            roots.insert(*address, self.object_storage_root(object)?);
            batch.put(account_key(&hashed), self.encode_object(object)?);
        }
        let mut record = root.to_vec();
        record.extend_from_slice(&height.to_be_bytes());
        batch.put(ROOT_KEY, record);
        let writes = batch.len();
        self.db.write(batch)?;

        for address in std::mem::take(&mut self.dirty) {
            let Some(entry) = self.objects.get_mut(&address) else { continue };
            if entry.as_ref().is_some_and(|o| o.suicided) {
                *entry = None;
            }
            if let Some(object) = entry {
                object.storage.clear();
                object.fresh = false;
                object.storage_root = roots.get(&address).copied().unwrap_or(EMPTY_ROOT_HASH);
            }
        }
        self.journal.clear();
        self.revisions.clear();
        self.logs.clear();
        self.log_size = 0;
        self.refund = 0;
        self.root = root;
        self.height = height;
        debug!(height, %root, writes, "committed world state");
        Ok(root)
    }
}
