//! A single append-only data file.
//!
//! File name is the nine-digit zero-padded file id plus `.data`
//! (`000000001.data`).  The write offset starts at the on-disk size and is
//! authoritative: appends are the only mutation and only ever advance it.
//! Every byte range below `write_off` decodes to a valid [`LogRecord`] —
//! anything else is corruption or a torn tail, and `read_log_record` says
//! which.

use std::path::{Path, PathBuf};

use bytes::BytesMut;

use crate::errors::{Error, Result};
use crate::fio::{new_io_manager, IoManager, IoType};
use crate::record::{
    decode_log_record_header, log_record_crc, LogRecord, LogRecordType,
    MAX_LOG_RECORD_HEADER_SIZE,
};

pub const DATA_FILE_SUFFIX: &str = ".data";

pub struct DataFile {
    fid: u32,
    write_off: u64,
    io: Box<dyn IoManager>,
}

impl DataFile {
    /// Create or open `{dir}/{fid:09}.data`.  `write_off` starts at the
    /// current on-disk size.
    pub fn open(dir_path: &Path, fid: u32, io_type: IoType) -> Result<Self> {
        let path = data_file_name(dir_path, fid);
        let io = new_io_manager(&path, io_type)?;
        let write_off = io.size();
        Ok(Self { fid, write_off, io })
    }

    #[inline]
    pub fn fid(&self) -> u32 {
        self.fid
    }

    #[inline]
    pub fn write_off(&self) -> u64 {
        self.write_off
    }

    /// Rewind the logical end of the file.  Used by replay after a torn tail
    /// record is discarded.
    pub fn set_write_off(&mut self, offset: u64) {
        self.write_off = offset;
    }

    pub fn size(&self) -> u64 {
        self.io.size()
    }

    /// Append pre-encoded record bytes and advance the write offset.
    pub fn append(&mut self, buf: &[u8]) -> Result<()> {
        let n = self.io.write(buf)?;
        self.write_off += n as u64;
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.io.sync()
    }

    /// Swap the backing IO manager, keeping the write offset.  Used to move a
    /// file between mmap (replay, retired) and standard I/O (writable).
    pub fn set_io_manager(&mut self, dir_path: &Path, io_type: IoType) -> Result<()> {
        self.io = new_io_manager(&data_file_name(dir_path, self.fid), io_type)?;
        Ok(())
    }

    /// Decode the record starting at `offset`.
    ///
    /// Returns the record and its total encoded size.  `Error::Eof` marks the
    /// end of the written log (including a torn header or torn body at the
    /// tail); `Error::InvalidRecordCrc` marks a record whose checksum does
    /// not match its bytes.
    pub fn read_log_record(&self, offset: u64) -> Result<(LogRecord, u64)> {
        let file_size = self.io.size();
        if offset >= file_size {
            return Err(Error::Eof);
        }

        // Header reads are capped at the remaining bytes so a record that
        // ends flush against the file end still decodes.
        let header_cap = MAX_LOG_RECORD_HEADER_SIZE.min((file_size - offset) as usize);
        let mut header_buf = BytesMut::zeroed(header_cap);
        self.io.read(&mut header_buf, offset)?;

        let (header, header_len) =
            decode_log_record_header(&header_buf).ok_or(Error::Eof)?;
        if header.key_size == 0 && header.value_size == 0 {
            return Err(Error::Eof);
        }

        let key_size = header.key_size as usize;
        let value_size = header.value_size as usize;
        let total_size = (header_len + key_size + value_size) as u64;
        if offset + total_size > file_size {
            // Body truncated mid-record: torn tail.
            return Err(Error::Eof);
        }

        let mut kv_buf = BytesMut::zeroed(key_size + value_size);
        self.io.read(&mut kv_buf, offset + header_len as u64)?;

        let crc = log_record_crc(
            &header_buf[4..header_len],
            &kv_buf[..key_size],
            &kv_buf[key_size..],
        );
        if crc != header.crc {
            return Err(Error::InvalidRecordCrc);
        }

        // The type byte is covered by the CRC, so an unknown value here means
        // the file was written by something else entirely.
        let rec_type =
            LogRecordType::from_u8(header.rec_type).ok_or(Error::DataDirCorrupted)?;

        let record = LogRecord {
            key: kv_buf[..key_size].to_vec(),
            value: kv_buf[key_size..].to_vec(),
            rec_type,
        };
        Ok((record, total_size))
    }
}

/// `{dir}/{fid:09}.data`
pub fn data_file_name(dir_path: &Path, fid: u32) -> PathBuf {
    dir_path.join(format!("{fid:09}{DATA_FILE_SUFFIX}"))
}
