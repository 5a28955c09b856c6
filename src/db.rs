//! Engine — the coordinator tying data files, codec, and index together.
//!
//! One writer, many readers: `put`/`delete` funnel through
//! `append_log_record` under the writer half of a single RwLock; `get` and
//! iteration take the reader half.  A directory-level advisory lock (the
//! `flock` sentinel file) guarantees at most one live engine per directory
//! across processes.
//!
//! Opening replays every data file in id order to rebuild the in-memory
//! index — except with the persistent B+ tree backend, whose mapping
//! survives restarts on its own.  A torn record at the tail of the active
//! file is discarded and the write offset rewound to just before it; the
//! last successful fsync is the durability boundary.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use fs2::FileExt;
use log::{debug, warn};
use parking_lot::RwLock;

use crate::data_file::{data_file_name, DataFile, DATA_FILE_SUFFIX};
use crate::errors::{Error, Result};
use crate::fio::IoType;
use crate::index::{new_indexer, Indexer};
use crate::iterator::Iterator;
use crate::options::{check_options, IndexType, IteratorOptions, Options};
use crate::record::{encode_log_record, LogRecord, LogRecordPos, LogRecordType};

/// Advisory-lock sentinel inside the storage directory.
pub const FILE_LOCK_NAME: &str = "flock";

// ── Stat ─────────────────────────────────────────────────────────────────────

/// Point-in-time engine statistics.
#[derive(Debug, Clone)]
pub struct Stat {
    /// Live keys in the index.
    pub key_num: usize,
    /// Data files on disk, the active one included.
    pub data_file_num: usize,
    /// Bytes occupied by overwritten and deleted records; what an external
    /// merge would reclaim.
    pub reclaimable_size: u64,
    /// Total bytes of the storage directory.
    pub disk_size: u64,
}

// ── Engine ───────────────────────────────────────────────────────────────────

pub(crate) struct FileState {
    pub(crate) active: DataFile,
    pub(crate) older: HashMap<u32, DataFile>,
    bytes_since_sync: u64,
}

pub struct Engine {
    pub(crate) options: Options,
    files: RwLock<FileState>,
    pub(crate) index: Box<dyn Indexer>,
    lock_file: File,
    reclaim_size: AtomicU64,
}

impl Engine {
    /// Open (or create) an engine over `options.dir_path`.
    pub fn open(options: Options) -> Result<Self> {
        check_options(&options)?;
        fs::create_dir_all(&options.dir_path)?;

        // Single-process guarantee, before anything touches the files.
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(options.dir_path.join(FILE_LOCK_NAME))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(Error::DatabaseIsUsing);
        }

        let mut file_ids = load_data_file_ids(&options.dir_path)?;
        file_ids.sort_unstable();

        // Older files may be replayed through mmap; the largest id becomes
        // the active file and must stay writable.
        let older_io = if options.mmap_at_startup {
            IoType::MemoryMap
        } else {
            IoType::Standard
        };
        let mut older = HashMap::new();
        let mut active = None;
        for (i, &fid) in file_ids.iter().enumerate() {
            if i == file_ids.len() - 1 {
                active = Some(DataFile::open(&options.dir_path, fid, IoType::Standard)?);
            } else {
                older.insert(fid, DataFile::open(&options.dir_path, fid, older_io)?);
            }
        }
        let active = match active {
            Some(df) => df,
            None => DataFile::open(&options.dir_path, 0, IoType::Standard)?,
        };

        let index = new_indexer(options.index_type, &options.dir_path)?;

        let engine = Self {
            files: RwLock::new(FileState { active, older, bytes_since_sync: 0 }),
            index,
            lock_file,
            reclaim_size: AtomicU64::new(0),
            options,
        };

        // The persistent B+ tree already holds the mapping; everything else
        // rebuilds it from the log.
        if engine.options.index_type != IndexType::BPlusTree {
            engine.load_index_from_data_files(&file_ids)?;
            if engine.options.mmap_at_startup {
                engine.reset_io_type()?;
            }
        }

        Ok(engine)
    }

    // ── Write path ───────────────────────────────────────────────────────────

    /// Store `value` under `key`, overwriting any previous value.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }
        let record = LogRecord {
            key: key.to_vec(),
            value: value.to_vec(),
            rec_type: LogRecordType::Normal,
        };
        let pos = self.append_log_record(&record)?;
        if let Some(old) = self.index.put(key.to_vec(), pos) {
            self.reclaim_size.fetch_add(u64::from(old.size), Ordering::SeqCst);
        }
        Ok(())
    }

    /// Remove `key`, appending a tombstone.  Returns the position the key
    /// previously occupied.
    pub fn delete(&self, key: &[u8]) -> Result<LogRecordPos> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }
        if self.index.get(key).is_none() {
            return Err(Error::KeyNotFound);
        }

        let record = LogRecord {
            key: key.to_vec(),
            value: Vec::new(),
            rec_type: LogRecordType::Deleted,
        };
        let pos = self.append_log_record(&record)?;
        // The tombstone is dead weight the moment it is written.
        self.reclaim_size.fetch_add(u64::from(pos.size), Ordering::SeqCst);

        let old = self.index.delete(key).ok_or(Error::KeyNotFound)?;
        self.reclaim_size.fetch_add(u64::from(old.size), Ordering::SeqCst);
        Ok(old)
    }

    /// Append one record to the active file, rotating it first when the
    /// encoded record would push it past the size cap.
    fn append_log_record(&self, record: &LogRecord) -> Result<LogRecordPos> {
        let mut files = self.files.write();

        let (enc, size) = encode_log_record(record);
        if files.active.write_off() + size > self.options.file_size {
            files.active.sync()?;
            let retired_fid = files.active.fid();
            let next = DataFile::open(&self.options.dir_path, retired_fid + 1, IoType::Standard)?;
            let retired = std::mem::replace(&mut files.active, next);
            files.older.insert(retired_fid, retired);
            debug!("rotated to data file {}", retired_fid + 1);
        }

        let write_off = files.active.write_off();
        files.active.append(&enc)?;

        let mut need_sync = self.options.sync_writes;
        if !need_sync && self.options.bytes_per_sync > 0 {
            files.bytes_since_sync += size;
            if files.bytes_since_sync >= self.options.bytes_per_sync {
                need_sync = true;
            }
        }
        if need_sync {
            files.active.sync()?;
            files.bytes_since_sync = 0;
        }

        Ok(LogRecordPos {
            fid: files.active.fid(),
            offset: write_off,
            size: size as u32,
        })
    }

    // ── Read path ────────────────────────────────────────────────────────────

    /// Fetch the newest value of `key`.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }
        let files = self.files.read();
        let pos = self.index.get(key).ok_or(Error::KeyNotFound)?;
        read_value(&files, &pos)
    }

    /// Resolve an index position to its value.  Drives the iterator.
    pub(crate) fn get_value_by_position(&self, pos: &LogRecordPos) -> Result<Vec<u8>> {
        let files = self.files.read();
        read_value(&files, pos)
    }

    // ── Iteration ────────────────────────────────────────────────────────────

    /// Cursor over the live keys; see [`Iterator`].
    pub fn iter(&self, options: IteratorOptions) -> Iterator<'_> {
        Iterator::new(self, self.index.iterator(options))
    }

    /// All live keys matching the iterator options, in iteration order.
    pub fn list_keys(&self, options: IteratorOptions) -> Vec<Vec<u8>> {
        let mut index_iter = self.index.iterator(options);
        let mut keys = Vec::new();
        while index_iter.valid() {
            keys.push(index_iter.key().to_vec());
            index_iter.next();
        }
        keys
    }

    /// Call `f` for every live pair until it returns false.
    pub fn fold<F>(&self, options: IteratorOptions, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], Vec<u8>) -> bool,
    {
        let mut iter = self.iter(options);
        while iter.valid() {
            let value = iter.value()?;
            if !f(iter.key(), value) {
                break;
            }
            iter.next();
        }
        Ok(())
    }

    // ── Maintenance ──────────────────────────────────────────────────────────

    /// Fsync the active data file.
    pub fn sync(&self) -> Result<()> {
        let files = self.files.read();
        files.active.sync()
    }

    /// Flush and release the directory lock.  File handles close on drop;
    /// the persistent index flushes through its own transactions.
    pub fn close(&self) -> Result<()> {
        {
            let files = self.files.read();
            files.active.sync()?;
        }
        FileExt::unlock(&self.lock_file)?;
        Ok(())
    }

    pub fn stat(&self) -> Result<Stat> {
        let files = self.files.read();
        Ok(Stat {
            key_num: self.index.len(),
            data_file_num: files.older.len() + 1,
            reclaimable_size: self.reclaim_size.load(Ordering::SeqCst),
            disk_size: dir_disk_size(&self.options.dir_path)?,
        })
    }

    // ── Startup internals ────────────────────────────────────────────────────

    /// Replay every data file in id order, rebuilding the index and the
    /// reclaimable-bytes counter, and rewinding the active file's write
    /// offset past the last valid record.
    fn load_index_from_data_files(&self, file_ids: &[u32]) -> Result<()> {
        if file_ids.is_empty() {
            return Ok(());
        }
        let mut files = self.files.write();
        let active_fid = files.active.fid();

        for &fid in file_ids {
            let mut offset = 0u64;
            loop {
                let read = if fid == active_fid {
                    files.active.read_log_record(offset)
                } else {
                    match files.older.get(&fid) {
                        Some(df) => df.read_log_record(offset),
                        None => break,
                    }
                };
                let (record, size) = match read {
                    Ok(ok) => ok,
                    Err(Error::Eof) => {
                        // A retired file must replay flush to its end; bytes
                        // left over mean it was damaged after retirement.
                        if fid != active_fid {
                            let file_size =
                                files.older.get(&fid).map(|df| df.size()).unwrap_or(offset);
                            if offset < file_size {
                                return Err(Error::DataDirCorrupted);
                            }
                        }
                        break;
                    }
                    Err(Error::InvalidRecordCrc) if fid == active_fid => {
                        // Torn tail from a crash mid-append: everything before
                        // it already replayed; drop the fragment.
                        warn!("discarding torn record at {fid:09}:{offset} during replay");
                        break;
                    }
                    Err(Error::InvalidRecordCrc) => return Err(Error::DataDirCorrupted),
                    Err(e) => return Err(e),
                };

                let pos = LogRecordPos { fid, offset, size: size as u32 };
                match record.rec_type {
                    LogRecordType::Normal => {
                        if let Some(old) = self.index.put(record.key, pos) {
                            self.reclaim_size.fetch_add(u64::from(old.size), Ordering::SeqCst);
                        }
                    }
                    LogRecordType::Deleted => {
                        if let Some(old) = self.index.delete(&record.key) {
                            self.reclaim_size.fetch_add(u64::from(old.size), Ordering::SeqCst);
                        }
                        self.reclaim_size.fetch_add(size, Ordering::SeqCst);
                    }
                }
                offset += size;
            }

            if fid == active_fid {
                // Discarded tail bytes must come off the disk too: the file
                // is opened O_APPEND, so a stale tail would push the next
                // record past where write_off says it landed.
                if offset < files.active.size() {
                    warn!(
                        "active file {fid:09} truncated from {} to {offset}",
                        files.active.size()
                    );
                    let path = data_file_name(&self.options.dir_path, fid);
                    OpenOptions::new().write(true).open(&path)?.set_len(offset)?;
                    files.active.set_io_manager(&self.options.dir_path, IoType::Standard)?;
                }
                files.active.set_write_off(offset);
            }
        }
        Ok(())
    }

    /// After a mmap replay, move the retired files back to standard I/O so
    /// the engine holds no long-lived maps.
    fn reset_io_type(&self) -> Result<()> {
        let mut files = self.files.write();
        let fids: Vec<u32> = files.older.keys().copied().collect();
        for fid in fids {
            if let Some(df) = files.older.get_mut(&fid) {
                df.set_io_manager(&self.options.dir_path, IoType::Standard)?;
            }
        }
        Ok(())
    }
}

// ── Free helpers ─────────────────────────────────────────────────────────────

fn read_value(files: &FileState, pos: &LogRecordPos) -> Result<Vec<u8>> {
    let (record, _) = if files.active.fid() == pos.fid {
        files.active.read_log_record(pos.offset)?
    } else {
        files
            .older
            .get(&pos.fid)
            .ok_or(Error::DataFileNotFound)?
            .read_log_record(pos.offset)?
    };
    // The index can momentarily trail a concurrent delete; a tombstone here
    // reads as absence, never as a value.
    if record.rec_type == LogRecordType::Deleted {
        return Err(Error::KeyNotFound);
    }
    Ok(record.value)
}

/// Numeric ids of every `*.data` file in the directory, unsorted.
fn load_data_file_ids(dir_path: &Path) -> Result<Vec<u32>> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(dir_path)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(stem) = name.strip_suffix(DATA_FILE_SUFFIX) {
            let fid = stem.parse::<u32>().map_err(|_| Error::DataDirCorrupted)?;
            ids.push(fid);
        }
    }
    Ok(ids)
}

/// Bytes used by the storage directory (flat; the engine never nests).
fn dir_disk_size(dir_path: &Path) -> Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(dir_path)? {
        total += entry?.metadata()?.len();
    }
    Ok(total)
}
