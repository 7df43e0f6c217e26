//! Balance records by height.

use std::sync::Arc;

use hyla_domain::BlockBalanceRecords;
use hyla_traits::KvStore;

use crate::BackendError;

const RECORD_PREFIX: &[u8] = b"R";

fn record_key(height: u64) -> Vec<u8> {
    let mut key = RECORD_PREFIX.to_vec();
    key.extend_from_slice(&height.to_be_bytes());
    key
}

/// Per-block balance records stored as JSON.
#[derive(Clone, Debug)]
pub struct BalanceRecordStore {
    db: Arc<dyn KvStore>,
}

impl BalanceRecordStore {
    /// Open a record store over `db`.
    pub fn new(db: Arc<dyn KvStore>) -> Self {
        Self { db }
    }

    /// Store the records of a block, replacing any previous value.
    pub fn put(&self, records: &BlockBalanceRecords) -> Result<(), BackendError> {
        let bytes = serde_json::to_vec(records)?;
        self.db.put(&record_key(records.height), &bytes)?;
        Ok(())
    }

    /// Records of the block at `height`.
    pub fn get(&self, height: u64) -> Result<Option<BlockBalanceRecords>, BackendError> {
        self.db
            .get(&record_key(height))?
            .map(|bytes| serde_json::from_slice(&bytes).map_err(BackendError::from))
            .transpose()
    }
}
