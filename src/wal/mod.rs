//! Segmented write-ahead log.
//!
//! Payloads are opaque byte strings written into fixed 32 KiB blocks.  A
//! payload that does not fit in the free space of the current block is split
//! into First/Middle/Last chunks across consecutive blocks — and across
//! segment files when the active segment fills up.  `write` returns a
//! [`ChunkPos`] handle; `read` resolves one back into the payload plus the
//! position of the next record, which is what `read_all` uses to replay the
//! log front to back.
//!
//! One writer at a time (the internal RwLock), any number of concurrent
//! readers.  Retired segments are remapped read-only; block reads go through
//! a shared LRU cache keyed on the global block id.

mod cache;
mod segment;

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::errors::{Error, Result};
use crate::fio::IoType;
use crate::options::{check_wal_options, WalOptions};
use cache::BlockCache;
use segment::{encode_chunk, ChunkType, Segment};

pub use segment::CHUNK_HEADER_SIZE;

// ── ChunkPos ─────────────────────────────────────────────────────────────────

/// Where a payload starts in the log, and how many encoded bytes it spans.
///
/// `block_id` is global across segments:
/// `segment_id * segment_max_block_num + block_within_segment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkPos {
    pub segment_id: u32,
    pub block_id: u32,
    /// Offset of the first chunk header inside its block.
    pub chunk_offset: u32,
    /// Total encoded size: `Σ (7 + payload_len)` over the record's chunks.
    pub chunk_size: u32,
}

// ── Wal ──────────────────────────────────────────────────────────────────────

pub struct Wal {
    inner: RwLock<WalInner>,
    options: WalOptions,
}

struct WalInner {
    active: Segment,
    older: HashMap<u32, Segment>,
    /// Id of the active segment.
    segment_id: u32,
    /// Global id of the block currently receiving appends.
    block_id: u32,
    /// Write offset inside the current block.
    block_offset: u32,
    /// Write offset inside the active segment file.
    segment_offset: u32,
    /// No payload has ever been written; reads are refused.
    is_empty: bool,
    dir_path: PathBuf,
    cache: Option<Arc<BlockCache>>,
}

impl Wal {
    /// Open a log directory: load every `*.seg` file, make the largest id the
    /// active (writable) segment, and rebuild the write cursor from its size.
    pub fn open(options: WalOptions) -> Result<Self> {
        check_wal_options(&options)?;
        fs::create_dir_all(&options.dir_path)?;

        let cache = BlockCache::new(options.block_cache_num);

        let mut ids = load_segment_ids(&options)?;
        ids.sort_unstable();

        let mut older = HashMap::new();
        let mut active = None;
        for (i, &id) in ids.iter().enumerate() {
            if i == ids.len() - 1 {
                active = Some(Segment::open(
                    &options.dir_path,
                    id,
                    &options,
                    IoType::Standard,
                    cache.clone(),
                )?);
            } else {
                let seg = Segment::open(
                    &options.dir_path,
                    id,
                    &options,
                    IoType::MemoryMap,
                    cache.clone(),
                )?;
                older.insert(id, seg);
            }
        }
        let active = match active {
            Some(seg) => seg,
            None => Segment::open(&options.dir_path, 0, &options, IoType::Standard, cache.clone())?,
        };

        let segment_id = active.id();
        let active_size = active.size() as u32;
        let inner = WalInner {
            segment_id,
            block_id: segment_id * options.segment_max_block_num
                + active_size / options.block_size,
            block_offset: active_size % options.block_size,
            segment_offset: active_size,
            is_empty: older.is_empty() && active_size == 0,
            active,
            older,
            dir_path: options.dir_path.clone(),
            cache,
        };

        Ok(Self { inner: RwLock::new(inner), options })
    }

    /// Append one payload; returns where it landed.
    ///
    /// A payload of `segment_size` bytes or more is refused — a record must
    /// fit within one segment's worth of chunks.
    pub fn write(&self, data: &[u8]) -> Result<ChunkPos> {
        let mut inner = self.inner.write();
        let opts = &self.options;

        if data.len() as u64 >= u64::from(opts.segment_size) {
            return Err(Error::PayloadExceedsSegment);
        }

        // A chunk header must fit in the current block; otherwise close the
        // block with zero padding.
        if inner.block_offset + CHUNK_HEADER_SIZE >= opts.block_size {
            inner.write_padding(opts)?;
        }
        // If that filled the segment (or it was already full), rotate before
        // capturing the start position, so the position always names bytes in
        // the segment they were actually written to.
        if inner.segment_offset + CHUNK_HEADER_SIZE >= opts.segment_size {
            inner.rotate_segment(opts)?;
        }

        let mut pos = ChunkPos {
            segment_id: inner.segment_id,
            block_id: inner.block_id,
            chunk_offset: inner.block_offset,
            chunk_size: 0,
        };

        let len = data.len() as u32;
        if len + CHUNK_HEADER_SIZE + inner.block_offset <= opts.block_size {
            pos.chunk_size = inner.write_chunk(data, ChunkType::Full, opts)?;
            inner.is_empty = false;
            return Ok(pos);
        }

        // Spanning write: First fills the current block, Middles fill whole
        // blocks, Last takes the remainder.
        let mut begin = 0u32;
        let end = len;
        while begin < end {
            if inner.segment_offset + CHUNK_HEADER_SIZE >= opts.segment_size {
                inner.rotate_segment(opts)?;
            }
            let (chunk_type, n) = if begin == 0 {
                (ChunkType::First, opts.block_size - inner.block_offset - CHUNK_HEADER_SIZE)
            } else if end - begin + CHUNK_HEADER_SIZE > opts.block_size {
                (ChunkType::Middle, opts.block_size - CHUNK_HEADER_SIZE)
            } else {
                (ChunkType::Last, end - begin)
            };
            let written =
                inner.write_chunk(&data[begin as usize..(begin + n) as usize], chunk_type, opts)?;
            pos.chunk_size += written;
            begin += n;
        }

        inner.is_empty = false;
        Ok(pos)
    }

    /// Resolve a position into its payload and the position of the record
    /// written after it.
    pub fn read(&self, pos: &ChunkPos) -> Result<(Vec<u8>, ChunkPos)> {
        let inner = self.inner.read();
        inner.read_at(pos, &self.options)
    }

    /// Replay the whole log in write order.
    pub fn read_all(&self) -> Result<Vec<(Vec<u8>, ChunkPos)>> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        let mut pos = ChunkPos::default();
        loop {
            match inner.read_at(&pos, &self.options) {
                Ok((payload, next)) => {
                    out.push((payload, pos));
                    pos = next;
                }
                Err(Error::Eof) | Err(Error::InvalidChunkPos) | Err(Error::WalEmpty) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Fsync the active segment.
    pub fn sync(&self) -> Result<()> {
        let inner = self.inner.read();
        inner.active.sync()
    }

    /// Flush outstanding writes.  File handles close on drop.
    pub fn close(&self) -> Result<()> {
        let inner = self.inner.read();
        inner.active.sync()
    }
}

// ── Write-side internals ─────────────────────────────────────────────────────

impl WalInner {
    /// Frame and append one chunk, advancing the block/segment cursors.
    fn write_chunk(&mut self, data: &[u8], chunk_type: ChunkType, opts: &WalOptions) -> Result<u32> {
        let buf = encode_chunk(data, chunk_type);
        let enc_len = buf.len() as u32;
        self.active.append(&buf)?;
        self.block_id += (self.block_offset + enc_len) / opts.block_size;
        self.block_offset = (self.block_offset + enc_len) % opts.block_size;
        self.segment_offset += enc_len;
        Ok(enc_len)
    }

    /// Zero-fill the rest of the current block.  Not a framed chunk.
    fn write_padding(&mut self, opts: &WalOptions) -> Result<()> {
        let pad = opts.block_size - self.block_offset;
        self.active.append(&vec![0u8; pad as usize])?;
        self.block_id += 1;
        self.segment_offset += pad;
        self.block_offset = 0;
        Ok(())
    }

    /// Retire the active segment (fsync, remap read-only) and open `id + 1`.
    fn rotate_segment(&mut self, opts: &WalOptions) -> Result<()> {
        self.active.sync()?;
        self.active.set_io_manager(IoType::MemoryMap)?;

        let next = Segment::open(
            &self.dir_path,
            self.segment_id + 1,
            opts,
            IoType::Standard,
            self.cache.clone(),
        )?;
        let retired = std::mem::replace(&mut self.active, next);
        self.older.insert(retired.id(), retired);

        self.segment_id += 1;
        self.segment_offset = 0;
        self.block_offset = 0;
        self.block_id = self.segment_id * opts.segment_max_block_num;
        debug!("wal: rotated to segment {}", self.segment_id);
        Ok(())
    }

    // ── Read side ───────────────────────────────────────────────────────────

    fn read_at(&self, pos: &ChunkPos, opts: &WalOptions) -> Result<(Vec<u8>, ChunkPos)> {
        if self.is_empty {
            return Err(Error::WalEmpty);
        }
        if pos.segment_id > self.segment_id || pos.block_id > self.block_id {
            return Err(Error::InvalidChunkPos);
        }

        let mut segment_id = pos.segment_id;
        let mut block_id = pos.block_id;
        let mut chunk_offset = pos.chunk_offset;
        let mut payload = Vec::new();
        let mut chunks_total = 0u32;

        loop {
            let seg = self.segment(segment_id).ok_or(Error::InvalidChunkPos)?;
            let block_in_seg = block_id % opts.segment_max_block_num;
            let mut out = seg.read_chunks(block_in_seg, chunk_offset)?;
            payload.append(&mut out.payload);
            chunks_total += out.chunks_read;
            if out.complete {
                break;
            }
            // Record continues in the next segment.
            segment_id += 1;
            block_id += out.chunks_read;
            chunk_offset = 0;
        }

        // The next record starts right after every header+payload byte this
        // one consumed, skipping block-tail padding (and stepping into the
        // next segment when that skip crosses the segment's last block).
        let consumed = payload.len() as u32 + CHUNK_HEADER_SIZE * chunks_total;
        let mut next = ChunkPos {
            segment_id,
            block_id: pos.block_id + (pos.chunk_offset + consumed) / opts.block_size,
            chunk_offset: (pos.chunk_offset + consumed) % opts.block_size,
            chunk_size: 0,
        };
        if next.chunk_offset + CHUNK_HEADER_SIZE >= opts.block_size {
            next.chunk_offset = 0;
            next.block_id += 1;
            if (next.segment_id + 1) * opts.segment_max_block_num == next.block_id {
                next.segment_id += 1;
            }
        }

        Ok((payload, next))
    }

    fn segment(&self, id: u32) -> Option<&Segment> {
        if id == self.segment_id {
            Some(&self.active)
        } else {
            self.older.get(&id)
        }
    }
}

// ── Directory loading ────────────────────────────────────────────────────────

/// Collect the numeric ids of every `*{suffix}` file in the directory.
fn load_segment_ids(options: &WalOptions) -> Result<Vec<u32>> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(&options.dir_path)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(stem) = name.strip_suffix(options.file_suffix.as_str()) {
            let id = stem.parse::<u32>().map_err(|_| Error::DataDirCorrupted)?;
            ids.push(id);
        }
    }
    Ok(ids)
}
