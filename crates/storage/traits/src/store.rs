//! Key-value store trait.

use std::fmt::Debug;

use crate::{StoreError, WriteBatch};

/// Thread-safe key-value store.
///
/// Reads observe every batch written before them. A batch is applied atomically.
pub trait KvStore: Debug + Send + Sync {
    /// Read a value.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Apply a batch of writes.
    fn write(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// All entries whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    /// Whether a key is present.
    fn contains(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// Write a single value.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write(batch)
    }

    /// Remove a single key.
    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write(batch)
    }
}
