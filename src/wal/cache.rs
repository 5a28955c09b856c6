//! Read-through LRU cache over raw WAL blocks.
//!
//! Keyed by the global block id (`segment_id * segment_max_block_num +
//! block_within_segment`), value is the full 32 KiB of one block.  Only
//! fully-written blocks are ever inserted, so the block currently receiving
//! appends can never be served stale — the invalidation problem goes away
//! by construction.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

pub(crate) struct BlockCache {
    inner: Mutex<LruCache<u32, Arc<Vec<u8>>>>,
}

impl BlockCache {
    /// `capacity` is in blocks; 0 disables caching entirely.
    pub(crate) fn new(capacity: usize) -> Option<Arc<Self>> {
        let capacity = NonZeroUsize::new(capacity)?;
        Some(Arc::new(Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }))
    }

    pub(crate) fn get(&self, block_id: u32) -> Option<Arc<Vec<u8>>> {
        self.inner.lock().get(&block_id).cloned()
    }

    pub(crate) fn put(&self, block_id: u32, block: Arc<Vec<u8>>) {
        self.inner.lock().put(block_id, block);
    }
}
