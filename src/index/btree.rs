//! Ordered-tree backend — the canonical index.
//!
//! A `BTreeMap` under a reader-writer lock.  Iteration order is the map's
//! own byte order, so this backend doubles as the reference the other two
//! are tested against.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::{IndexIterator, Indexer};
use crate::options::IteratorOptions;
use crate::record::LogRecordPos;

#[derive(Default)]
pub struct BTree {
    tree: RwLock<BTreeMap<Vec<u8>, LogRecordPos>>,
}

impl BTree {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Indexer for BTree {
    fn put(&self, key: Vec<u8>, pos: LogRecordPos) -> Option<LogRecordPos> {
        let mut guard = self.tree.write();
        guard.insert(key, pos)
    }

    fn get(&self, key: &[u8]) -> Option<LogRecordPos> {
        let guard = self.tree.read();
        guard.get(key).copied()
    }

    fn delete(&self, key: &[u8]) -> Option<LogRecordPos> {
        let mut guard = self.tree.write();
        guard.remove(key)
    }

    fn len(&self) -> usize {
        self.tree.read().len()
    }

    fn iterator(&self, options: IteratorOptions) -> IndexIterator {
        let guard = self.tree.read();
        let items = guard.iter().map(|(k, v)| (k.clone(), *v)).collect();
        IndexIterator::new(items, options)
    }
}
