//! Engine, WAL, and iterator configuration.
//!
//! All options are plain values validated eagerly at `open`; nothing is read
//! from the environment.  Defaults are chosen so that a test can call
//! `Options::default()` with only `dir_path` overridden.

use std::path::PathBuf;

use crate::errors::{Error, Result};

// ── Engine options ───────────────────────────────────────────────────────────

/// Which in-memory index backend the engine uses.
///
/// All three honor the same `Indexer` contract; `BPlusTree` additionally
/// persists the key → position mapping on disk, which lets `Engine::open`
/// skip the data-file replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    /// In-memory ordered tree.  The canonical backend.
    BTree,
    /// Adaptive radix tree; cheaper for long shared-prefix key sets.
    Art,
    /// Disk-backed B+ tree (`hint-index` file).
    BPlusTree,
}

#[derive(Debug, Clone)]
pub struct Options {
    /// Storage directory.  Created if missing.
    pub dir_path: PathBuf,
    /// Size cap of the active data file; crossing it rotates to `fid + 1`.
    pub file_size: u64,
    /// Fsync after every write.
    pub sync_writes: bool,
    /// When `sync_writes` is false, fsync after this many accumulated bytes.
    /// 0 disables the cadence.
    pub bytes_per_sync: u64,
    pub index_type: IndexType,
    /// Replay data files through a read-only memory map at open.
    pub mmap_at_startup: bool,
    /// Reclaimable-to-total ratio at which the external merge tool kicks in.
    pub merge_ratio: f32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dir_path: std::env::temp_dir().join("emberkv"),
            file_size: 256 * 1024 * 1024,
            sync_writes: false,
            bytes_per_sync: 0,
            index_type: IndexType::BTree,
            mmap_at_startup: false,
            merge_ratio: 0.5,
        }
    }
}

pub(crate) fn check_options(options: &Options) -> Result<()> {
    if options.dir_path.as_os_str().is_empty() {
        return Err(Error::DirPathInvalid);
    }
    if options.file_size == 0 {
        return Err(Error::FileSizeInvalid);
    }
    if !(0.0..=1.0).contains(&options.merge_ratio) {
        return Err(Error::InvalidMergeRatio);
    }
    Ok(())
}

// ── WAL options ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WalOptions {
    /// Directory holding the segment files.  Created if missing.
    pub dir_path: PathBuf,
    /// Fixed block size.  32 KiB is the format constant; changing it makes a
    /// WAL unreadable to writers using another value.
    pub block_size: u32,
    /// How many blocks one segment file may hold.
    pub segment_max_block_num: u32,
    /// Size cap of one segment file in bytes.
    pub segment_size: u32,
    /// LRU capacity of the block read cache, in blocks.  0 disables caching.
    pub block_cache_num: usize,
    /// Segment file suffix, e.g. `.seg`.
    pub file_suffix: String,
}

impl Default for WalOptions {
    fn default() -> Self {
        Self {
            dir_path: std::env::temp_dir().join("emberkv-wal"),
            block_size: 32 * 1024,
            segment_max_block_num: 1024,
            segment_size: 32 * 1024 * 1024,
            block_cache_num: 20,
            file_suffix: String::from(".seg"),
        }
    }
}

pub(crate) fn check_wal_options(options: &WalOptions) -> Result<()> {
    if options.dir_path.as_os_str().is_empty() {
        return Err(Error::DirPathInvalid);
    }
    if options.block_size == 0
        || options.segment_max_block_num == 0
        || options.segment_size < options.block_size
    {
        return Err(Error::FileSizeInvalid);
    }
    Ok(())
}

// ── Iterator options ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct IteratorOptions {
    /// Only keys sharing this prefix are yielded.  Empty matches everything.
    pub prefix: Vec<u8>,
    /// Iterate in descending key order.
    pub reverse: bool,
}
