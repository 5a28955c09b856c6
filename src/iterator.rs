//! Engine-level iterator: index cursor plus value resolution.
//!
//! The cursor walks a snapshot of the index taken at construction; values
//! are read from disk lazily, so a huge keyspace iterates without pulling
//! every value into memory.  `key`/`value` must only be called while
//! `valid()` is true, mirroring the index cursor it wraps.

use crate::db::Engine;
use crate::errors::Result;
use crate::index::IndexIterator;

pub struct Iterator<'a> {
    engine: &'a Engine,
    index_iter: IndexIterator,
}

impl<'a> Iterator<'a> {
    pub(crate) fn new(engine: &'a Engine, index_iter: IndexIterator) -> Self {
        Self { engine, index_iter }
    }

    /// Back to the first matching key.
    pub fn rewind(&mut self) {
        self.index_iter.rewind();
    }

    /// Position at the first key `>= key` (`<= key` when reversed).
    pub fn seek(&mut self, key: &[u8]) {
        self.index_iter.seek(key);
    }

    /// Advance to the next matching key.
    pub fn next(&mut self) {
        self.index_iter.next();
    }

    pub fn valid(&self) -> bool {
        self.index_iter.valid()
    }

    pub fn key(&self) -> &[u8] {
        self.index_iter.key()
    }

    /// Read the current key's value from its data file.
    pub fn value(&self) -> Result<Vec<u8>> {
        self.engine.get_value_by_position(self.index_iter.value())
    }

    /// Drop the index snapshot.
    pub fn close(&mut self) {
        self.index_iter.close();
    }
}
