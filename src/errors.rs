//! Error taxonomy for the whole engine.
//!
//! Semantic errors (`KeyIsEmpty`, `InvalidMergeRatio`, …) are raised at the
//! API boundary before any side effect.  I/O and corruption errors bubble up
//! from the file layer unmodified.  `InvalidRecordCrc` always means the bytes
//! on disk do not match their checksum; callers decide whether that is a torn
//! tail (recoverable) or mid-file corruption (fatal).

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("the key is empty")]
    KeyIsEmpty,

    #[error("the key is not found in database")]
    KeyNotFound,

    #[error("data file is not found in database")]
    DataFileNotFound,

    #[error("failed to update index")]
    IndexUpdateFailed,

    #[error("database directory path is invalid")]
    DirPathInvalid,

    #[error("data file size must be greater than zero")]
    FileSizeInvalid,

    #[error("the database directory may be corrupted")]
    DataDirCorrupted,

    #[error("exceed the max batch num")]
    ExceedMaxBatchNum,

    #[error("merge is in progress, try again later")]
    MergeInProgress,

    #[error("the database directory is used by another process")]
    DatabaseIsUsing,

    #[error("invalid merge ratio, must be between 0 and 1")]
    InvalidMergeRatio,

    #[error("the merge ratio has not been reached")]
    MergeRatioUnreached,

    #[error("not enough disk space for merge")]
    NoEnoughSpaceForMerge,

    #[error("payload size exceeds the segment size")]
    PayloadExceedsSegment,

    #[error("the write-ahead log is empty")]
    WalEmpty,

    #[error("chunk position is beyond the written log")]
    InvalidChunkPos,

    #[error("invalid CRC value, the record may be corrupted")]
    InvalidRecordCrc,

    /// Read reached the end of the written bytes.  Replay and scans use this
    /// as their loop terminator; it never escapes the public API.
    #[error("read past the end of the file")]
    Eof,

    #[error("operation is not supported by this IO manager")]
    Unsupported,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
