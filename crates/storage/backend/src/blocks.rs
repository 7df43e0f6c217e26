//! Block store.

use std::sync::Arc;

use alloy_primitives::B256;
use commonware_codec::{Decode, DecodeExt, Encode, RangeCfg};
use hyla_domain::{Block, BlockCfg, BlockId, Commit, Header, Receipt};
use hyla_traits::{KvStore, StoreError, WriteBatch};
use tracing::debug;

use crate::BackendError;

const HEADER_PREFIX: u8 = b'h';
const CANONICAL_SUFFIX: u8 = b'n';
const BODY_PREFIX: u8 = b'b';
const RECEIPTS_PREFIX: u8 = b'r';
const COMMIT_PREFIX: u8 = b'x';
const HEAD_KEY: &[u8] = b"LastBlock";

fn header_key(height: u64, hash: &BlockId) -> Vec<u8> {
    let mut key = Vec::with_capacity(41);
    key.push(HEADER_PREFIX);
    key.extend_from_slice(&height.to_be_bytes());
    key.extend_from_slice(hash.0.as_slice());
    key
}

fn canonical_key(height: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(10);
    key.push(HEADER_PREFIX);
    key.extend_from_slice(&height.to_be_bytes());
    key.push(CANONICAL_SUFFIX);
    key
}

fn height_key(prefix: u8, height: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(prefix);
    key.extend_from_slice(&height.to_be_bytes());
    key
}

/// Committed blocks, receipts and commits keyed by height.
///
/// Headers live under `h<height><hash>` and the canonical hash of a height under `h<height>n`.
#[derive(Clone, Debug)]
pub struct BlockStore {
    db: Arc<dyn KvStore>,
    cfg: BlockCfg,
}

impl BlockStore {
    /// Open a block store over `db`.
    pub fn new(db: Arc<dyn KvStore>) -> Self {
        Self { db, cfg: BlockCfg::default() }
    }

    /// Sets the decode limits used for stored blocks.
    #[must_use]
    pub const fn with_cfg(mut self, cfg: BlockCfg) -> Self {
        self.cfg = cfg;
        self
    }

    /// Persist a committed block with its receipts and the commit that finalized it.
    pub fn put_block(
        &self,
        block: &Block,
        receipts: &[Receipt],
        seen_commit: Option<&Commit>,
    ) -> Result<(), BackendError> {
        let height = block.height();
        let hash = block.id();
        let mut batch = WriteBatch::new();
        batch.put(header_key(height, &hash), block.header.encode().to_vec());
        batch.put(canonical_key(height), hash.0.to_vec());
        batch.put(height_key(BODY_PREFIX, height), block.encode().to_vec());
        batch.put(height_key(RECEIPTS_PREFIX, height), receipts.to_vec().encode().to_vec());
        if let Some(commit) = seen_commit {
            batch.put(height_key(COMMIT_PREFIX, height), commit.encode().to_vec());
        }
        batch.put(HEAD_KEY, height.to_be_bytes().to_vec());
        self.db.write(batch)?;
        debug!(height, hash = %hash.0, receipts = receipts.len(), "stored block");
        Ok(())
    }

    /// Height of the last stored block.
    pub fn head(&self) -> Result<Option<u64>, BackendError> {
        let Some(bytes) = self.db.get(HEAD_KEY)? else {
            return Ok(None);
        };
        let bytes: [u8; 8] =
            bytes.as_slice().try_into().map_err(|_| StoreError::corrupt(HEAD_KEY, "bad height"))?;
        Ok(Some(u64::from_be_bytes(bytes)))
    }

    /// Canonical hash at `height`.
    pub fn canonical_hash(&self, height: u64) -> Result<Option<BlockId>, BackendError> {
        let key = canonical_key(height);
        let Some(bytes) = self.db.get(&key)? else {
            return Ok(None);
        };
        if bytes.len() != 32 {
            return Err(StoreError::corrupt(&key, "bad hash length").into());
        }
        Ok(Some(BlockId(B256::from_slice(&bytes))))
    }

    /// Header stored for `(height, hash)`.
    pub fn header(&self, height: u64, hash: &BlockId) -> Result<Option<Header>, BackendError> {
        self.db
            .get(&header_key(height, hash))?
            .map(|bytes| Header::decode(bytes.as_slice()).map_err(BackendError::from))
            .transpose()
    }

    /// Canonical block at `height`.
    pub fn block(&self, height: u64) -> Result<Option<Block>, BackendError> {
        self.db
            .get(&height_key(BODY_PREFIX, height))?
            .map(|bytes| Block::decode_cfg(bytes.as_slice(), &self.cfg).map_err(BackendError::from))
            .transpose()
    }

    /// Receipts of the canonical block at `height`.
    pub fn receipts(&self, height: u64) -> Result<Option<Vec<Receipt>>, BackendError> {
        let cfg = (RangeCfg::new(0..=self.cfg.max_txs), ());
        self.db
            .get(&height_key(RECEIPTS_PREFIX, height))?
            .map(|bytes| Vec::<Receipt>::decode_cfg(bytes.as_slice(), &cfg).map_err(BackendError::from))
            .transpose()
    }

    /// Commit that finalized the block at `height`.
    pub fn seen_commit(&self, height: u64) -> Result<Option<Commit>, BackendError> {
        self.db
            .get(&height_key(COMMIT_PREFIX, height))?
            .map(|bytes| Commit::decode(bytes.as_slice()).map_err(BackendError::from))
            .transpose()
    }

    /// Drop bodies, receipts and commits older than the latest `keep` blocks.
    ///
    /// Headers and canonical hashes are kept. Returns the number of pruned heights.
    pub fn prune(&self, keep: u64) -> Result<u64, BackendError> {
        let Some(head) = self.head()? else {
            return Ok(0);
        };
        if keep == 0 || head < keep {
            return Ok(0);
        }
        let below = head + 1 - keep;
        let mut batch = WriteBatch::new();
        let mut pruned = 0;
        for prefix in [BODY_PREFIX, RECEIPTS_PREFIX, COMMIT_PREFIX] {
            for (key, _) in self.db.scan_prefix(&[prefix])? {
                if key.len() != 9 {
                    continue;
                }
                let mut height = [0u8; 8];
                height.copy_from_slice(&key[1..]);
                if u64::from_be_bytes(height) < below {
                    batch.delete(key);
                    if prefix == BODY_PREFIX {
                        pruned += 1;
                    }
                }
            }
        }
        self.db.write(batch)?;
        debug!(head, below, pruned, "pruned blocks");
        Ok(pruned)
    }
}
