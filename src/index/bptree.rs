//! Persistent B+ tree backend.
//!
//! Stores `key → encoded LogRecordPos` in a single bucket of a jammdb file
//! (`hint-index`) inside the engine directory.  Because the mapping itself
//! is durable, an engine opened with this backend skips the data-file
//! replay entirely.
//!
//! jammdb's transactional API is infallible for the access patterns used
//! here (the bucket always exists, keys are validated before mutation), so
//! failures surface as panics with context rather than as `Result`s —
//! matching the `Indexer` contract, which has no error channel.

use std::path::Path;

use jammdb::DB as JammDb;

use super::{IndexIterator, Indexer};
use crate::errors::{Error, Result};
use crate::options::IteratorOptions;
use crate::record::LogRecordPos;

/// File holding the persistent index, inside the engine directory.
pub const HINT_INDEX_FILE_NAME: &str = "hint-index";

const BUCKET_NAME: &str = "emberkv-index";

pub struct BPlusTree {
    tree: JammDb,
}

impl BPlusTree {
    /// Open (or create) the `hint-index` file under `dir_path` and make sure
    /// the index bucket exists.
    pub fn open(dir_path: &Path) -> Result<Self> {
        let tree = JammDb::open(dir_path.join(HINT_INDEX_FILE_NAME))
            .map_err(|_| Error::DataDirCorrupted)?;
        {
            let tx = tree.tx(true).map_err(|_| Error::DataDirCorrupted)?;
            tx.get_or_create_bucket(BUCKET_NAME)
                .map_err(|_| Error::DataDirCorrupted)?;
            tx.commit().map_err(|_| Error::DataDirCorrupted)?;
        }
        Ok(Self { tree })
    }
}

impl Indexer for BPlusTree {
    fn put(&self, key: Vec<u8>, pos: LogRecordPos) -> Option<LogRecordPos> {
        let tx = self.tree.tx(true).expect("hint index: begin rw tx");
        let bucket = tx.get_bucket(BUCKET_NAME).expect("hint index bucket exists");
        let prev = bucket
            .get_kv(&key)
            .and_then(|kv| LogRecordPos::decode(kv.value()));
        let _ = bucket.put(key, pos.encode()).expect("hint index: put");
        tx.commit().expect("hint index: commit");
        prev
    }

    fn get(&self, key: &[u8]) -> Option<LogRecordPos> {
        let tx = self.tree.tx(false).expect("hint index: begin ro tx");
        let bucket = tx.get_bucket(BUCKET_NAME).expect("hint index bucket exists");
        bucket
            .get_kv(key)
            .and_then(|kv| LogRecordPos::decode(kv.value()))
    }

    fn delete(&self, key: &[u8]) -> Option<LogRecordPos> {
        let tx = self.tree.tx(true).expect("hint index: begin rw tx");
        let bucket = tx.get_bucket(BUCKET_NAME).expect("hint index bucket exists");
        match bucket.delete(key) {
            Ok(kv) => {
                let prev = LogRecordPos::decode(kv.value());
                tx.commit().expect("hint index: commit");
                prev
            }
            // Key was not present; nothing to commit.
            Err(_) => None,
        }
    }

    fn len(&self) -> usize {
        let tx = self.tree.tx(false).expect("hint index: begin ro tx");
        let bucket = tx.get_bucket(BUCKET_NAME).expect("hint index bucket exists");
        bucket.kv_pairs().count()
    }

    fn iterator(&self, options: IteratorOptions) -> IndexIterator {
        let tx = self.tree.tx(false).expect("hint index: begin ro tx");
        let bucket = tx.get_bucket(BUCKET_NAME).expect("hint index bucket exists");
        // The cursor walks in ascending key order, which is exactly the
        // order IndexIterator expects to receive.
        let items = bucket
            .kv_pairs()
            .filter_map(|kv| LogRecordPos::decode(kv.value()).map(|pos| (kv.key().to_vec(), pos)))
            .collect();
        IndexIterator::new(items, options)
    }
}
