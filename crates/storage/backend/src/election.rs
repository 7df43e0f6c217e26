//! Candidate order and validator set by height.

use std::sync::Arc;

use hyla_domain::{CandidateInOrder, Validator};
use hyla_traits::{KvStore, WriteBatch};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::BackendError;

const ELECTION_PREFIX: u8 = b'v';

fn election_key(height: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(ELECTION_PREFIX);
    key.extend_from_slice(&height.to_be_bytes());
    key
}

/// Election outcome of a committed block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSnapshot {
    /// Committed height.
    pub height: u64,
    /// Candidate order carried into the next block.
    pub candidates: Vec<CandidateInOrder>,
    /// Validators of the next height.
    pub validators: Vec<Validator>,
}

/// Election snapshots stored as JSON, one per committed height.
#[derive(Clone, Debug)]
pub struct ElectionStore {
    db: Arc<dyn KvStore>,
}

impl ElectionStore {
    /// Open an election store over `db`.
    pub fn new(db: Arc<dyn KvStore>) -> Self {
        Self { db }
    }

    /// Store the snapshot of a height, replacing any previous value.
    pub fn put(&self, snapshot: &ElectionSnapshot) -> Result<(), BackendError> {
        let bytes = serde_json::to_vec(snapshot)?;
        self.db.put(&election_key(snapshot.height), &bytes)?;
        debug!(
            height = snapshot.height,
            candidates = snapshot.candidates.len(),
            validators = snapshot.validators.len(),
            "stored election"
        );
        Ok(())
    }

    /// Snapshot of the block at `height`.
    pub fn get(&self, height: u64) -> Result<Option<ElectionSnapshot>, BackendError> {
        self.db
            .get(&election_key(height))?
            .map(|bytes| serde_json::from_slice(&bytes).map_err(BackendError::from))
            .transpose()
    }

    /// Drop snapshots below `height`. Returns the number removed.
    pub fn prune_below(&self, height: u64) -> Result<usize, BackendError> {
        let mut batch = WriteBatch::new();
        let mut pruned = 0;
        for (key, _) in self.db.scan_prefix(&[ELECTION_PREFIX])? {
            if key.len() != 9 {
                continue;
            }
            let mut at = [0u8; 8];
            at.copy_from_slice(&key[1..]);
            if u64::from_be_bytes(at) < height {
                batch.delete(key);
                pruned += 1;
            }
        }
        self.db.write(batch)?;
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use hyla_domain::PubKey;
    use k256::ecdsa::SigningKey;

    use super::*;
    use crate::MemoryStore;

    fn validator(byte: u8) -> Validator {
        let key = SigningKey::from_bytes(&[byte; 32].into()).unwrap();
        Validator::new(PubKey::from_signing_key(&key), u64::from(byte)).unwrap()
    }

    fn snapshot(height: u64) -> ElectionSnapshot {
        ElectionSnapshot { height, candidates: Vec::new(), validators: vec![validator(1), validator(2)] }
    }

    #[test]
    fn snapshots_by_height() {
        let store = ElectionStore::new(Arc::new(MemoryStore::new()));
        store.put(&snapshot(3)).unwrap();

        assert_eq!(store.get(3).unwrap(), Some(snapshot(3)));
        assert_eq!(store.get(4).unwrap(), None);
    }

    #[test]
    fn prune_keeps_recent_heights() {
        let store = ElectionStore::new(Arc::new(MemoryStore::new()));
        for height in 1..=4 {
            store.put(&snapshot(height)).unwrap();
        }

        assert_eq!(store.prune_below(3).unwrap(), 2);
        assert!(store.get(2).unwrap().is_none());
        assert!(store.get(3).unwrap().is_some());
    }
}
