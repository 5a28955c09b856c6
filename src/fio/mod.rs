//! File handle abstraction — positional reads, append-only writes.
//!
//! Two implementations share the [`IoManager`] contract:
//!
//! - [`FileIo`]: standard file I/O.  Opened create+read+append with 0644
//!   permissions; `write` relies on the append mode so the OS file pointer
//!   only ever moves forward.
//! - [`MmapIo`]: read-only memory map, used for hot re-reads during startup
//!   replay and for retired segments.  `write` and `sync` report
//!   `Error::Unsupported`.
//!
//! A file can be switched between the two by replacing the manager behind
//! the owning lock; outstanding readers always observe a consistent `size()`.
//! Handles are closed on drop.

pub mod mmap;

use std::fs::{File, OpenOptions};
use std::os::unix::fs::{FileExt, PermissionsExt};
use std::path::Path;

use parking_lot::RwLock;

use crate::errors::Result;
pub use mmap::MmapIo;

/// Permission bits for every file the engine creates.
pub const DATA_FILE_PERM: u32 = 0o644;

/// Which [`IoManager`] implementation backs a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoType {
    Standard,
    MemoryMap,
}

pub trait IoManager: Send + Sync {
    /// Read into `buf` starting at `offset`; returns the bytes copied.
    fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Append `buf` at the logical end of the file; returns the bytes written.
    fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Flush written bytes to stable storage.
    fn sync(&self) -> Result<()>;

    /// Current logical size of the file in bytes.
    fn size(&self) -> u64;
}

/// Construct the manager named by `io_type` for the file at `path`.
pub fn new_io_manager(path: &Path, io_type: IoType) -> Result<Box<dyn IoManager>> {
    match io_type {
        IoType::Standard => Ok(Box::new(FileIo::new(path)?)),
        IoType::MemoryMap => Ok(Box::new(MmapIo::new(path)?)),
    }
}

// ── Standard file I/O ────────────────────────────────────────────────────────

pub struct FileIo {
    fd: RwLock<File>,
}

impl FileIo {
    pub fn new(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let mut perm = file.metadata()?.permissions();
        perm.set_mode(DATA_FILE_PERM);
        file.set_permissions(perm)?;
        Ok(Self { fd: RwLock::new(file) })
    }
}

impl IoManager for FileIo {
    fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let guard = self.fd.read();
        let n = guard.read_at(buf, offset)?;
        Ok(n)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        use std::io::Write;
        let mut guard = self.fd.write();
        guard.write_all(buf)?;
        Ok(buf.len())
    }

    fn sync(&self) -> Result<()> {
        let guard = self.fd.read();
        guard.sync_all()?;
        Ok(())
    }

    fn size(&self) -> u64 {
        let guard = self.fd.read();
        guard.metadata().map(|m| m.len()).unwrap_or(0)
    }
}
