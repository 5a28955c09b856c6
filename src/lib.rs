//! # emberkv — embedded append-only key/value engine
//!
//! Engine guarantees (frozen on-disk format):
//! - All numeric fields are little-endian; never negotiated
//! - Every log record carries a mandatory CRC32-IEEE; corrupt records abort
//!   reads, a torn tail record is discarded at the next open
//! - Record headers use signed zig-zag varints for the key/value lengths;
//!   the longest header is 15 bytes
//! - WAL payloads are chunked over fixed 32 KiB blocks (Full/First/Middle/
//!   Last); block tails too small for a 7-byte chunk header are zero-padded
//! - The in-memory index is rebuilt by replaying data files in id order;
//!   the persistent B+ tree backend skips the replay
//! - One writer per directory, enforced by an advisory file lock; reads are
//!   concurrent
//!
//! ```no_run
//! use emberkv::{Engine, Options};
//!
//! let mut options = Options::default();
//! options.dir_path = "/tmp/emberkv-demo".into();
//! let engine = Engine::open(options)?;
//! engine.put(b"name", b"lily")?;
//! assert_eq!(engine.get(b"name")?, b"lily");
//! engine.close()?;
//! # Ok::<(), emberkv::Error>(())
//! ```

pub mod data_file;
pub mod db;
pub mod errors;
pub mod fio;
pub mod index;
pub mod iterator;
pub mod options;
pub mod record;
pub mod wal;

// Flat re-exports for the most common types.
pub use data_file::DataFile;
pub use db::{Engine, Stat, FILE_LOCK_NAME};
pub use errors::{Error, Result};
pub use index::{IndexIterator, Indexer};
pub use iterator::Iterator;
pub use options::{IndexType, IteratorOptions, Options, WalOptions};
pub use record::{LogRecord, LogRecordPos, LogRecordType};
pub use wal::{ChunkPos, Wal, CHUNK_HEADER_SIZE};
