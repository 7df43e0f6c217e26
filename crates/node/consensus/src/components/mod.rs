//! In-memory implementations of the consensus components.

mod cache;
pub use cache::{DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_MAX_AGE, ProcessCache};

mod mempool;
pub use mempool::{InMemoryMempool, MempoolConfig};
