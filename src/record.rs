//! Log record format — the unit every data file is made of.
//!
//! # On-disk layout (all fields little-endian)
//!
//! ```text
//! Offset  Size   Field
//!    0      4    crc32        CRC32-IEEE over everything after this field
//!    4      1    rec_type     1=Normal 2=Deleted
//!    5    1..5   key_size     signed varint (zig-zag base-128)
//!    ?    1..5   value_size   signed varint (zig-zag base-128)
//!    ?      n    key
//!    ?      n    value
//! ```
//!
//! The longest possible header is `4 + 1 + 5 + 5 = 15` bytes.  The CRC is
//! computed over the header bytes after the CRC field concatenated with the
//! key and the value, so flipping any single byte of a record is detected at
//! read time.
//!
//! # Varints
//! Lengths use the signed zig-zag scheme (`(n << 1) ^ (n >> 63)` before
//! base-128 grouping).  Existing data files were written with exactly this
//! encoding; it is part of the frozen format.

use bytes::{BufMut, BytesMut};
use crc32fast::Hasher;

/// Longest encodable record header: CRC + type + two maximal varints.
pub const MAX_LOG_RECORD_HEADER_SIZE: usize = 4 + 1 + 5 + 5;

// ── Record type ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordType {
    /// Live key/value pair.
    Normal = 1,
    /// Tombstone; the key is gone once this record is the newest.
    Deleted = 2,
}

impl LogRecordType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(LogRecordType::Normal),
            2 => Some(LogRecordType::Deleted),
            _ => None,
        }
    }
}

// ── Record and position ──────────────────────────────────────────────────────

/// One append-only log entry.  Immutable once encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub rec_type: LogRecordType,
}

/// Where the newest version of a key lives on disk.  Value type of the
/// in-memory index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecordPos {
    pub fid: u32,
    pub offset: u64,
    /// Total encoded size of the record; feeds reclaimable-space accounting.
    pub size: u32,
}

impl LogRecordPos {
    /// Fixed 16-byte little-endian form stored by the persistent index.
    pub fn encode(&self) -> Vec<u8> {
        use byteorder::{ByteOrder, LittleEndian};
        let mut buf = [0u8; 16];
        LittleEndian::write_u32(&mut buf[0..4], self.fid);
        LittleEndian::write_u64(&mut buf[4..12], self.offset);
        LittleEndian::write_u32(&mut buf[12..16], self.size);
        buf.to_vec()
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        use byteorder::{ByteOrder, LittleEndian};
        if buf.len() < 16 {
            return None;
        }
        Some(Self {
            fid: LittleEndian::read_u32(&buf[0..4]),
            offset: LittleEndian::read_u64(&buf[4..12]),
            size: LittleEndian::read_u32(&buf[12..16]),
        })
    }
}

/// Parsed record header, before the key/value bytes are fetched.
#[derive(Debug, Clone, Copy)]
pub struct LogRecordHeader {
    pub crc: u32,
    /// Raw type byte; validated against [`LogRecordType`] only after the CRC
    /// check passes.
    pub rec_type: u8,
    pub key_size: u32,
    pub value_size: u32,
}

// ── Encode ───────────────────────────────────────────────────────────────────

/// Encode a record into its on-disk form.  Returns the buffer and its length.
pub fn encode_log_record(record: &LogRecord) -> (Vec<u8>, u64) {
    let mut buf = BytesMut::with_capacity(
        MAX_LOG_RECORD_HEADER_SIZE + record.key.len() + record.value.len(),
    );

    // CRC slot, backfilled once the rest of the record is in place.
    buf.put_u32_le(0);
    buf.put_u8(record.rec_type as u8);
    encode_varint(record.key.len() as i64, &mut buf);
    encode_varint(record.value.len() as i64, &mut buf);
    buf.extend_from_slice(&record.key);
    buf.extend_from_slice(&record.value);

    let mut hasher = Hasher::new();
    hasher.update(&buf[4..]);
    let crc = hasher.finalize();
    buf[0..4].copy_from_slice(&crc.to_le_bytes());

    let size = buf.len() as u64;
    (buf.to_vec(), size)
}

/// Parse a record header from `buf`.
///
/// Returns `None` when fewer than 5 bytes are available or a length varint is
/// truncated — both mean the caller is looking at a torn tail, not at a
/// decodable record.  The header CRC is NOT verified here; that needs the
/// key/value bytes.
pub fn decode_log_record_header(buf: &[u8]) -> Option<(LogRecordHeader, usize)> {
    if buf.len() <= 4 {
        return None;
    }
    let crc = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    let rec_type = buf[4];

    let mut index = 5;
    let (key_size, n) = decode_varint(&buf[index..])?;
    index += n;
    let (value_size, n) = decode_varint(&buf[index..])?;
    index += n;

    let header = LogRecordHeader {
        crc,
        rec_type,
        key_size: key_size as u32,
        value_size: value_size as u32,
    };
    Some((header, index))
}

/// Recompute the CRC a record on disk should carry.
///
/// `header_tail` is the header bytes after the CRC field (type + varints).
pub fn log_record_crc(header_tail: &[u8], key: &[u8], value: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(header_tail);
    hasher.update(key);
    hasher.update(value);
    hasher.finalize()
}

// ── Signed varints ───────────────────────────────────────────────────────────

/// Append `v` in signed zig-zag base-128 form; returns the bytes written.
pub(crate) fn encode_varint(v: i64, buf: &mut BytesMut) -> usize {
    let mut ux = (v as u64) << 1;
    if v < 0 {
        ux = !ux;
    }
    let mut n = 0;
    while ux >= 0x80 {
        buf.put_u8((ux as u8) | 0x80);
        ux >>= 7;
        n += 1;
    }
    buf.put_u8(ux as u8);
    n + 1
}

/// Decode a signed zig-zag varint from the front of `buf`.
///
/// Returns the value and the bytes consumed, or `None` when `buf` ends in
/// the middle of the varint.
pub(crate) fn decode_varint(buf: &[u8]) -> Option<(i64, usize)> {
    let mut ux: u64 = 0;
    let mut shift = 0u32;
    for (i, &b) in buf.iter().enumerate() {
        if shift >= 64 {
            return None;
        }
        ux |= u64::from(b & 0x7f) << shift;
        if b & 0x80 == 0 {
            let mut x = (ux >> 1) as i64;
            if ux & 1 != 0 {
                x = !x;
            }
            return Some((x, i + 1));
        }
        shift += 7;
    }
    None
}
