//! One WAL segment file: chunk codec and block-level reads.
//!
//! # Chunk layout (all fields little-endian)
//!
//! ```text
//! Offset  Size  Field
//!    0      4   crc32     CRC32-IEEE over bytes [4 .. 7+length)
//!    4      2   length    payload bytes in this chunk
//!    6      1   type      0=Padding 1=Full 2=First 3=Middle 4=Last
//!    7      n   payload
//! ```
//!
//! A block is 32 KiB of concatenated chunks.  When fewer than 7 bytes remain
//! in a block, the writer zero-fills the remainder; those padding bytes carry
//! no valid header and are skipped by position arithmetic, never surfaced to
//! readers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher;

use super::cache::BlockCache;
use crate::errors::{Error, Result};
use crate::fio::{new_io_manager, IoManager, IoType};
use crate::options::WalOptions;

/// CRC (4) + length (2) + type (1).
pub const CHUNK_HEADER_SIZE: u32 = 7;

// ── Chunk type ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkType {
    /// Zero filler at a block tail.  Never framed with a valid header.
    Padding = 0,
    /// The payload fits entirely in one chunk.
    Full = 1,
    /// Opening chunk of a payload spanning blocks.
    First = 2,
    /// Interior chunk; always fills its block.
    Middle = 3,
    /// Closing chunk of a spanning payload.
    Last = 4,
}

impl ChunkType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(ChunkType::Padding),
            1 => Some(ChunkType::Full),
            2 => Some(ChunkType::First),
            3 => Some(ChunkType::Middle),
            4 => Some(ChunkType::Last),
            _ => None,
        }
    }
}

/// Frame `data` as one chunk.
pub(crate) fn encode_chunk(data: &[u8], chunk_type: ChunkType) -> Vec<u8> {
    let mut buf = vec![0u8; CHUNK_HEADER_SIZE as usize + data.len()];
    LittleEndian::write_u16(&mut buf[4..6], data.len() as u16);
    buf[6] = chunk_type as u8;
    buf[7..].copy_from_slice(data);
    let mut hasher = Hasher::new();
    hasher.update(&buf[4..]);
    LittleEndian::write_u32(&mut buf[0..4], hasher.finalize());
    buf
}

// ── Segment ──────────────────────────────────────────────────────────────────

/// Outcome of walking chunks inside a single segment.
pub(crate) struct SegmentRead {
    /// A Full or Last chunk was reached.
    pub complete: bool,
    /// Chunk headers consumed; each continuation chunk starts a new block, so
    /// this is also how many blocks the walk advanced.
    pub chunks_read: u32,
    pub payload: Vec<u8>,
}

pub(crate) struct Segment {
    id: u32,
    path: PathBuf,
    io: Box<dyn IoManager>,
    block_size: u32,
    max_block_num: u32,
    cache: Option<Arc<BlockCache>>,
}

impl Segment {
    pub(crate) fn open(
        dir_path: &Path,
        id: u32,
        options: &WalOptions,
        io_type: IoType,
        cache: Option<Arc<BlockCache>>,
    ) -> Result<Self> {
        let path = segment_file_name(dir_path, id, &options.file_suffix);
        let io = new_io_manager(&path, io_type)?;
        Ok(Self {
            id,
            path,
            io,
            block_size: options.block_size,
            max_block_num: options.segment_max_block_num,
            cache,
        })
    }

    #[inline]
    pub(crate) fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn size(&self) -> u64 {
        self.io.size()
    }

    pub(crate) fn append(&mut self, buf: &[u8]) -> Result<()> {
        self.io.write(buf)?;
        Ok(())
    }

    pub(crate) fn sync(&self) -> Result<()> {
        self.io.sync()
    }

    /// Swap the backing manager; used when the segment retires to mmap.
    pub(crate) fn set_io_manager(&mut self, io_type: IoType) -> Result<()> {
        self.io = new_io_manager(&self.path, io_type)?;
        Ok(())
    }

    /// Walk chunks starting at `(block_in_seg, chunk_offset)`, concatenating
    /// payload until a Full/Last chunk completes the record or the walk runs
    /// off this segment (block capacity exhausted or nothing more written) —
    /// the caller then continues in segment `id + 1`.
    ///
    /// An initial position past the written bytes is `Error::Eof`; a chunk
    /// whose checksum does not cover its bytes is `Error::InvalidRecordCrc`.
    pub(crate) fn read_chunks(&self, block_in_seg: u32, chunk_offset: u32) -> Result<SegmentRead> {
        let seg_size = self.io.size();
        let mut block = block_in_seg;
        let mut chunk_offset = chunk_offset;
        let mut payload = Vec::new();
        let mut chunks_read = 0u32;

        loop {
            let block_file_off = u64::from(block) * u64::from(self.block_size);
            if block_file_off >= seg_size {
                return not_complete_or_eof(chunks_read, payload);
            }
            let readable = (seg_size - block_file_off).min(u64::from(self.block_size)) as u32;
            if chunk_offset + CHUNK_HEADER_SIZE > readable {
                return not_complete_or_eof(chunks_read, payload);
            }

            let block_buf = self.load_block(block, block_file_off, readable)?;
            let co = chunk_offset as usize;
            let stored_crc = LittleEndian::read_u32(&block_buf[co..co + 4]);
            let length = u32::from(LittleEndian::read_u16(&block_buf[co + 4..co + 6]));
            let type_raw = block_buf[co + 6];

            let payload_end = chunk_offset + CHUNK_HEADER_SIZE + length;
            if payload_end > readable {
                return Err(Error::InvalidRecordCrc);
            }
            let mut hasher = Hasher::new();
            hasher.update(&block_buf[co + 4..payload_end as usize]);
            if hasher.finalize() != stored_crc {
                return Err(Error::InvalidRecordCrc);
            }

            payload.extend_from_slice(
                &block_buf[co + CHUNK_HEADER_SIZE as usize..payload_end as usize],
            );
            chunks_read += 1;

            match ChunkType::from_u8(type_raw) {
                Some(ChunkType::Full) | Some(ChunkType::Last) => {
                    return Ok(SegmentRead { complete: true, chunks_read, payload });
                }
                Some(ChunkType::First) | Some(ChunkType::Middle) => {
                    block += 1;
                    chunk_offset = 0;
                    if block >= self.max_block_num {
                        return Ok(SegmentRead { complete: false, chunks_read, payload });
                    }
                }
                // Padding never carries a valid CRC, so reaching here means
                // the type byte itself is damaged.
                Some(ChunkType::Padding) | None => return Err(Error::InvalidRecordCrc),
            }
        }
    }

    /// Fetch one block, through the cache for fully-written blocks.
    fn load_block(&self, block_in_seg: u32, file_off: u64, readable: u32) -> Result<Arc<Vec<u8>>> {
        let global_id = self.id * self.max_block_num + block_in_seg;
        if let Some(cache) = &self.cache {
            if let Some(block) = cache.get(global_id) {
                return Ok(block);
            }
        }
        let mut buf = vec![0u8; readable as usize];
        self.io.read(&mut buf, file_off)?;
        let block = Arc::new(buf);
        // Partially-written blocks (the active tail) stay out of the cache.
        if readable == self.block_size {
            if let Some(cache) = &self.cache {
                cache.put(global_id, Arc::clone(&block));
            }
        }
        Ok(block)
    }
}

/// A walk that consumed nothing hit the end of the written log; one that was
/// mid-record continues in the next segment.
fn not_complete_or_eof(chunks_read: u32, payload: Vec<u8>) -> Result<SegmentRead> {
    if chunks_read == 0 {
        Err(Error::Eof)
    } else {
        Ok(SegmentRead { complete: false, chunks_read, payload })
    }
}

/// `{dir}/{id:09}{suffix}`
pub(crate) fn segment_file_name(dir_path: &Path, id: u32, suffix: &str) -> PathBuf {
    dir_path.join(format!("{id:09}{suffix}"))
}
