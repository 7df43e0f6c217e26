//! Cache of processed blocks keyed by block hash.

use std::{cmp::Reverse, collections::HashMap, sync::Arc};

use hyla_domain::BlockId;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::ProcessedBlock;

/// Default number of cached blocks.
pub const DEFAULT_CACHE_CAPACITY: usize = 16;

/// Default number of heights past the committed one an entry may be for.
pub const DEFAULT_CACHE_MAX_AGE: u64 = 64;

#[derive(Debug)]
struct Entry {
    seq: u64,
    block: ProcessedBlock,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<BlockId, Entry>,
    next_seq: u64,
}

impl CacheInner {
    fn insert(&mut self, hash: BlockId, block: ProcessedBlock, capacity: usize) {
        if !self.entries.contains_key(&hash) {
            while self.entries.len() >= capacity.max(1) {
                let Some(furthest) = self
                    .entries
                    .iter()
                    .max_by_key(|(_, entry)| (entry.block.height(), Reverse(entry.seq)))
                    .map(|(hash, _)| *hash)
                else {
                    break;
                };
                self.entries.remove(&furthest);
                trace!(hash = ?furthest.0, "evicted processed block");
            }
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(hash, Entry { seq, block });
    }
}

/// Processed blocks by hash, bounded by count and by height distance from the
/// committed height.
///
/// The cache is shared between clones. When full, the entry furthest ahead is evicted
/// first, the oldest among equal heights, so the next block to commit stays cached.
#[derive(Debug, Clone)]
pub struct ProcessCache {
    inner: Arc<Mutex<CacheInner>>,
    capacity: usize,
    max_age: u64,
}

impl Default for ProcessCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_MAX_AGE)
    }
}

impl ProcessCache {
    /// Create a cache holding up to `capacity` blocks at most `max_age` heights ahead.
    #[must_use]
    pub fn new(capacity: usize, max_age: u64) -> Self {
        Self { inner: Arc::default(), capacity, max_age }
    }

    /// A copy of the cached block.
    pub fn get(&self, hash: &BlockId) -> Option<ProcessedBlock> {
        self.inner.lock().entries.get(hash).map(|entry| entry.block.clone())
    }

    /// Whether `hash` is cached.
    pub fn contains(&self, hash: &BlockId) -> bool {
        self.inner.lock().entries.contains_key(hash)
    }

    /// Cache `block` under `hash`, replacing any previous entry.
    pub fn insert(&self, hash: BlockId, block: ProcessedBlock) {
        self.inner.lock().insert(hash, block, self.capacity);
    }

    /// The cached block, or the one `process` produces, which is then cached.
    ///
    /// The cache stays locked while `process` runs, so concurrent callers for any block
    /// are serialized and a block is processed at most once.
    pub fn get_or_process<E>(
        &self,
        hash: BlockId,
        process: impl FnOnce() -> Result<ProcessedBlock, E>,
    ) -> Result<ProcessedBlock, E> {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get(&hash) {
            trace!(hash = ?hash.0, "process cache hit");
            return Ok(entry.block.clone());
        }
        let block = process()?;
        inner.insert(hash, block.clone(), self.capacity);
        Ok(block)
    }

    /// Remove and return the cached block.
    pub fn take(&self, hash: &BlockId) -> Option<ProcessedBlock> {
        self.inner.lock().entries.remove(hash).map(|entry| entry.block)
    }

    /// Drop entries that can no longer be committed after `height` was.
    ///
    /// Entries at or below `height` are forks or already committed; entries more than
    /// `max_age` heights ahead are dropped as well.
    pub fn prune(&self, height: u64) {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        let horizon = height.saturating_add(self.max_age);
        inner.entries.retain(|_, entry| {
            let at = entry.block.height();
            at > height && at <= horizon
        });
        let removed = before - inner.entries.len();
        if removed > 0 {
            debug!(height, removed, remaining = inner.entries.len(), "pruned process cache");
        }
    }

    /// Number of cached blocks.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use alloy_primitives::B256;
    use hyla_backend::MemoryStore;
    use hyla_executor::ProcessResult;
    use hyla_state::WorldState;

    use super::*;

    fn processed(height: u64) -> ProcessedBlock {
        let state = WorldState::new(Arc::new(MemoryStore::new()));
        ProcessedBlock::new(state, ProcessResult { height, ..Default::default() })
    }

    fn hash(byte: u8) -> BlockId {
        BlockId(B256::repeat_byte(byte))
    }

    #[test]
    fn insert_and_get() {
        let cache = ProcessCache::default();
        assert!(cache.get(&hash(1)).is_none());
        cache.insert(hash(1), processed(5));
        assert_eq!(cache.get(&hash(1)).unwrap().height(), 5);
        assert!(cache.contains(&hash(1)));
    }

    #[test]
    fn capacity_evicts_furthest_height() {
        let cache = ProcessCache::new(2, 100);
        cache.insert(hash(1), processed(7));
        cache.insert(hash(2), processed(5));
        cache.insert(hash(3), processed(6));
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&hash(1)));
        assert!(cache.contains(&hash(2)));
        assert!(cache.contains(&hash(3)));
    }

    #[test]
    fn next_height_survives_competing_proposals() {
        let cache = ProcessCache::new(2, 100);
        cache.insert(hash(1), processed(5));
        cache.insert(hash(2), processed(5));
        cache.insert(hash(3), processed(5));
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&hash(1)));
        assert!(cache.contains(&hash(3)));
    }

    #[test]
    fn replacing_entry_does_not_evict() {
        let cache = ProcessCache::new(2, 100);
        cache.insert(hash(1), processed(1));
        cache.insert(hash(2), processed(2));
        cache.insert(hash(2), processed(2));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn prune_keeps_near_future_only() {
        let cache = ProcessCache::new(16, 3);
        for (byte, height) in [(1, 9), (2, 10), (3, 11), (4, 13), (5, 14)] {
            cache.insert(hash(byte), processed(height));
        }
        cache.prune(10);
        assert!(!cache.contains(&hash(1)));
        assert!(!cache.contains(&hash(2)));
        assert!(cache.contains(&hash(3)));
        assert!(cache.contains(&hash(4)));
        assert!(!cache.contains(&hash(5)));
    }

    #[test]
    fn get_or_process_runs_once() {
        let cache = ProcessCache::default();
        let mut runs = 0;
        for _ in 0..3 {
            let block = cache
                .get_or_process(hash(1), || {
                    runs += 1;
                    Ok::<_, ()>(processed(4))
                })
                .unwrap();
            assert_eq!(block.height(), 4);
        }
        assert_eq!(runs, 1);
    }

    #[test]
    fn failed_processing_is_not_cached() {
        let cache = ProcessCache::default();
        let err = cache.get_or_process(hash(1), || Err::<ProcessedBlock, _>("boom")).unwrap_err();
        assert_eq!(err, "boom");
        assert!(cache.is_empty());
    }

    #[test]
    fn take_removes_entry() {
        let cache = ProcessCache::default();
        cache.insert(hash(1), processed(1));
        assert!(cache.take(&hash(1)).is_some());
        assert!(cache.take(&hash(1)).is_none());
    }
}
